//! The program tree handed to the mid-end. Nodes are immutable once built and
//! shared through `Rc`; passes produce new nodes (with fresh ids) instead of
//! mutating existing ones. Child nodes that can introduce names are stored in
//! [`IndexedVec`] containers so declarations resolve by name in O(1).

use std::{
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use strum::Display;

use crate::{index::simple_index, intern::InternedSymbol};

pub mod build;
pub mod fold;
pub mod indexed_vec;
pub mod pretty_print;
pub mod visit;

pub use indexed_vec::IndexedVec;

simple_index! {
    /// Identifies a node. Assigned once at construction and never reused
    /// within a process.
    pub struct NodeId;
}

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(0);

impl NodeId {
    pub fn fresh() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Program,
    Constant,
    Variable,
    Parameter,
    Action,
    Function,
    Table,
    Control,
    Package,
    Instance,
    Block,
    Assignment,
    Call,
    If,
    Return,
    Exit,
    Literal,
    Path,
    Unary,
    Binary,
    CallExpression,
    ConstructorCall,
}

/// Implemented by exactly the node kinds that introduce a name
pub trait Declaration {
    fn name(&self) -> InternedSymbol;

    fn declaration_id(&self) -> NodeId;
}

/// A node that can be stored in an [`IndexedVec`]
pub trait IrNode: Clone + core::fmt::Debug {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    fn as_declaration(&self) -> Option<&dyn Declaration>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Bits(u16),
    Void,
    /// A control or package type, only valid for constructor parameters
    Named(InternedSymbol),
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::Bits(width) => write!(f, "bit<{width}>"),
            Type::Void => f.write_str("void"),
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub id: NodeId,
    pub declarations: IndexedVec<Item>,
}

impl Program {
    pub const MAIN: &'static str = "main";

    pub fn new(declarations: IndexedVec<Item>) -> Self {
        Self {
            id: NodeId::fresh(),
            declarations,
        }
    }

    /// The top level instance designated as the entry point
    pub fn main(&self) -> Option<&Rc<Instance>> {
        self.declarations
            .get_declaration(InternedSymbol::new(Self::MAIN))
            .and_then(Item::as_instance)
    }

    /// Number of nodes in the whole tree
    pub fn node_count(&self) -> usize {
        visit::count_nodes(self)
    }
}

pub type ParameterList = IndexedVec<Rc<Parameter>>;

#[derive(Debug)]
pub struct Constant {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub ty: Type,
    pub value: Expression,
}

#[derive(Debug)]
pub struct Variable {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub ty: Type,
    pub initializer: Option<Expression>,
}

#[derive(Debug)]
pub struct Parameter {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug)]
pub struct Action {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub parameters: ParameterList,
    pub body: Rc<Block>,
}

#[derive(Debug)]
pub struct Function {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub return_type: Type,
    pub parameters: ParameterList,
    pub body: Rc<Block>,
}

/// A match-action table. Only the action list matters to the mid-end; keys
/// and entries are owned by the backend.
#[derive(Debug)]
pub struct Table {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub actions: Vec<Rc<PathExpression>>,
    pub default_action: Option<Rc<PathExpression>>,
}

#[derive(Debug)]
pub struct Control {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub parameters: ParameterList,
    pub locals: IndexedVec<Item>,
    /// The `apply` block
    pub body: Rc<Block>,
}

/// A package type: a named list of constructor parameters wired together by
/// the target architecture
#[derive(Debug)]
pub struct Package {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub parameters: ParameterList,
}

/// An instantiation like `Pipeline(Ingress(), Egress()) main;`
#[derive(Debug)]
pub struct Instance {
    pub id: NodeId,
    pub name: InternedSymbol,
    pub type_name: Rc<PathExpression>,
    pub arguments: Vec<Expression>,
}

impl Variable {
    pub fn new(name: InternedSymbol, ty: Type, initializer: Option<Expression>) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            ty,
            initializer,
        }
    }
}

impl Constant {
    pub fn new(name: InternedSymbol, ty: Type, value: Expression) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            ty,
            value,
        }
    }
}

impl Parameter {
    pub fn new(name: InternedSymbol, ty: Type) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            ty,
        }
    }
}

impl Action {
    pub fn new(name: InternedSymbol, parameters: ParameterList, body: Rc<Block>) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            parameters,
            body,
        }
    }
}

impl Function {
    pub fn new(
        name: InternedSymbol,
        return_type: Type,
        parameters: ParameterList,
        body: Rc<Block>,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            return_type,
            parameters,
            body,
        }
    }
}

impl Table {
    pub fn new(
        name: InternedSymbol,
        actions: Vec<Rc<PathExpression>>,
        default_action: Option<Rc<PathExpression>>,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            actions,
            default_action,
        }
    }
}

impl Control {
    pub fn new(
        name: InternedSymbol,
        parameters: ParameterList,
        locals: IndexedVec<Item>,
        body: Rc<Block>,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            parameters,
            locals,
            body,
        }
    }
}

impl Package {
    pub fn new(name: InternedSymbol, parameters: ParameterList) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            parameters,
        }
    }
}

impl Instance {
    pub fn new(
        name: InternedSymbol,
        type_name: Rc<PathExpression>,
        arguments: Vec<Expression>,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
            type_name,
            arguments,
        }
    }
}

macro_rules! impl_declaration {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Declaration for $ty {
                fn name(&self) -> InternedSymbol {
                    self.name
                }

                fn declaration_id(&self) -> NodeId {
                    self.id
                }
            }
        )*
    };
}

impl_declaration!(
    Constant, Variable, Parameter, Action, Function, Table, Control, Package, Instance
);

/// Generates `as_<variant>` accessors returning the shared payload
macro_rules! variant_accessors {
    ($enum:ident { $($variant:ident($payload:ty)),* $(,)? }) => {
        paste::paste! {
            impl $enum {
                $(
                    pub fn [<as_ $variant:snake>](&self) -> Option<&Rc<$payload>> {
                        match self {
                            $enum::$variant(inner) => Some(inner),
                            #[allow(unreachable_patterns)]
                            _ => None,
                        }
                    }
                )*
            }
        }
    };
}

/// A declaration that can appear at the top level or among control locals
#[derive(Debug, Clone)]
pub enum Item {
    Constant(Rc<Constant>),
    Variable(Rc<Variable>),
    Action(Rc<Action>),
    Function(Rc<Function>),
    Table(Rc<Table>),
    Control(Rc<Control>),
    Package(Rc<Package>),
    Instance(Rc<Instance>),
}

variant_accessors!(Item {
    Constant(Constant),
    Variable(Variable),
    Action(Action),
    Function(Function),
    Table(Table),
    Control(Control),
    Package(Package),
    Instance(Instance),
});

impl Item {
    fn declaration(&self) -> &dyn Declaration {
        match self {
            Item::Constant(c) => &**c,
            Item::Variable(v) => &**v,
            Item::Action(a) => &**a,
            Item::Function(f) => &**f,
            Item::Table(t) => &**t,
            Item::Control(c) => &**c,
            Item::Package(p) => &**p,
            Item::Instance(i) => &**i,
        }
    }

    pub fn name(&self) -> InternedSymbol {
        self.declaration().name()
    }

    /// The body of actions, functions and controls
    pub fn body(&self) -> Option<&Rc<Block>> {
        match self {
            Item::Action(a) => Some(&a.body),
            Item::Function(f) => Some(&f.body),
            Item::Control(c) => Some(&c.body),
            _ => None,
        }
    }

    /// A copy of an action, function or control with `body` in place of its
    /// own. Other items have no body and are returned unchanged.
    pub fn with_body(&self, body: Rc<Block>) -> Item {
        match self {
            Item::Action(a) => Item::Action(Rc::new(Action::new(a.name, a.parameters.clone(), body))),
            Item::Function(f) => Item::Function(Rc::new(Function::new(
                f.name,
                f.return_type.clone(),
                f.parameters.clone(),
                body,
            ))),
            Item::Control(c) => Item::Control(Rc::new(Control::new(
                c.name,
                c.parameters.clone(),
                c.locals.clone(),
                body,
            ))),
            other => other.clone(),
        }
    }

    pub fn parameters(&self) -> Option<&ParameterList> {
        match self {
            Item::Action(a) => Some(&a.parameters),
            Item::Function(f) => Some(&f.parameters),
            Item::Control(c) => Some(&c.parameters),
            Item::Package(p) => Some(&p.parameters),
            _ => None,
        }
    }
}

impl IrNode for Item {
    fn id(&self) -> NodeId {
        self.declaration().declaration_id()
    }

    fn kind(&self) -> NodeKind {
        match self {
            Item::Constant(_) => NodeKind::Constant,
            Item::Variable(_) => NodeKind::Variable,
            Item::Action(_) => NodeKind::Action,
            Item::Function(_) => NodeKind::Function,
            Item::Table(_) => NodeKind::Table,
            Item::Control(_) => NodeKind::Control,
            Item::Package(_) => NodeKind::Package,
            Item::Instance(_) => NodeKind::Instance,
        }
    }

    fn as_declaration(&self) -> Option<&dyn Declaration> {
        Some(self.declaration())
    }
}

impl IrNode for Rc<Parameter> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Parameter
    }

    fn as_declaration(&self) -> Option<&dyn Declaration> {
        Some(&**self as &dyn Declaration)
    }
}

#[derive(Debug)]
pub struct Block {
    pub id: NodeId,
    pub components: IndexedVec<Statement>,
}

impl Block {
    pub fn new(components: IndexedVec<Statement>) -> Self {
        Self {
            id: NodeId::fresh(),
            components,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn has_declarations(&self) -> bool {
        self.components.declarations().next().is_some()
    }
}

#[derive(Debug)]
pub struct Assignment {
    pub id: NodeId,
    pub target: Rc<PathExpression>,
    pub value: Expression,
}

/// A call used as a statement: an action or function invocation, or the
/// `apply` of a table or control instance
#[derive(Debug)]
pub struct CallStatement {
    pub id: NodeId,
    pub callee: Rc<PathExpression>,
    pub arguments: Vec<Expression>,
}

#[derive(Debug)]
pub struct IfStatement {
    pub id: NodeId,
    pub condition: Expression,
    pub then_branch: Statement,
    pub else_branch: Option<Statement>,
}

#[derive(Debug)]
pub struct ReturnStatement {
    pub id: NodeId,
    pub value: Option<Expression>,
}

#[derive(Debug)]
pub struct ExitStatement {
    pub id: NodeId,
}

impl Assignment {
    pub fn new(target: Rc<PathExpression>, value: Expression) -> Self {
        Self {
            id: NodeId::fresh(),
            target,
            value,
        }
    }
}

impl CallStatement {
    pub fn new(callee: Rc<PathExpression>, arguments: Vec<Expression>) -> Self {
        Self {
            id: NodeId::fresh(),
            callee,
            arguments,
        }
    }
}

impl IfStatement {
    pub fn new(condition: Expression, then_branch: Statement, else_branch: Option<Statement>) -> Self {
        Self {
            id: NodeId::fresh(),
            condition,
            then_branch,
            else_branch,
        }
    }
}

impl ReturnStatement {
    pub fn new(value: Option<Expression>) -> Self {
        Self {
            id: NodeId::fresh(),
            value,
        }
    }
}

impl ExitStatement {
    pub fn new() -> Self {
        Self {
            id: NodeId::fresh(),
        }
    }
}

/// A component of a block. Local variables and constants are declarations;
/// everything else is not.
#[derive(Debug, Clone)]
pub enum Statement {
    Constant(Rc<Constant>),
    Variable(Rc<Variable>),
    Assignment(Rc<Assignment>),
    Call(Rc<CallStatement>),
    If(Rc<IfStatement>),
    Block(Rc<Block>),
    Return(Rc<ReturnStatement>),
    Exit(Rc<ExitStatement>),
}

variant_accessors!(Statement {
    Constant(Constant),
    Variable(Variable),
    Assignment(Assignment),
    Call(CallStatement),
    If(IfStatement),
    Block(Block),
    Return(ReturnStatement),
    Exit(ExitStatement),
});

impl IrNode for Statement {
    fn id(&self) -> NodeId {
        match self {
            Statement::Constant(s) => s.id,
            Statement::Variable(s) => s.id,
            Statement::Assignment(s) => s.id,
            Statement::Call(s) => s.id,
            Statement::If(s) => s.id,
            Statement::Block(s) => s.id,
            Statement::Return(s) => s.id,
            Statement::Exit(s) => s.id,
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Statement::Constant(_) => NodeKind::Constant,
            Statement::Variable(_) => NodeKind::Variable,
            Statement::Assignment(_) => NodeKind::Assignment,
            Statement::Call(_) => NodeKind::Call,
            Statement::If(_) => NodeKind::If,
            Statement::Block(_) => NodeKind::Block,
            Statement::Return(_) => NodeKind::Return,
            Statement::Exit(_) => NodeKind::Exit,
        }
    }

    fn as_declaration(&self) -> Option<&dyn Declaration> {
        match self {
            Statement::Constant(c) => Some(&**c as &dyn Declaration),
            Statement::Variable(v) => Some(&**v as &dyn Declaration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOperator {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    Complement,
    #[strum(serialize = "-")]
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl BinaryOperator {
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralValue {
    Bool(bool),
    /// An integer with an optional explicit width (`8w5`)
    Int { value: u64, width: Option<u16> },
}

#[derive(Debug)]
pub struct Literal {
    pub id: NodeId,
    pub value: LiteralValue,
}

/// A use site of a name
#[derive(Debug)]
pub struct PathExpression {
    pub id: NodeId,
    pub name: InternedSymbol,
}

#[derive(Debug)]
pub struct UnaryExpression {
    pub id: NodeId,
    pub operator: UnaryOperator,
    pub operand: Expression,
}

#[derive(Debug)]
pub struct BinaryExpression {
    pub id: NodeId,
    pub operator: BinaryOperator,
    pub lhs: Expression,
    pub rhs: Expression,
}

#[derive(Debug)]
pub struct CallExpression {
    pub id: NodeId,
    pub callee: Rc<PathExpression>,
    pub arguments: Vec<Expression>,
}

/// `Type(args)` used as an argument of an instantiation
#[derive(Debug)]
pub struct ConstructorCall {
    pub id: NodeId,
    pub type_name: Rc<PathExpression>,
    pub arguments: Vec<Expression>,
}

impl Literal {
    pub fn new(value: LiteralValue) -> Self {
        Self {
            id: NodeId::fresh(),
            value,
        }
    }
}

impl PathExpression {
    pub fn new(name: InternedSymbol) -> Self {
        Self {
            id: NodeId::fresh(),
            name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Rc<Literal>),
    Path(Rc<PathExpression>),
    Unary(Rc<UnaryExpression>),
    Binary(Rc<BinaryExpression>),
    Call(Rc<CallExpression>),
    Constructor(Rc<ConstructorCall>),
}

variant_accessors!(Expression {
    Literal(Literal),
    Path(PathExpression),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Call(CallExpression),
    Constructor(ConstructorCall),
});

impl Expression {
    pub fn id(&self) -> NodeId {
        match self {
            Expression::Literal(e) => e.id,
            Expression::Path(e) => e.id,
            Expression::Unary(e) => e.id,
            Expression::Binary(e) => e.id,
            Expression::Call(e) => e.id,
            Expression::Constructor(e) => e.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Expression::Literal(_) => NodeKind::Literal,
            Expression::Path(_) => NodeKind::Path,
            Expression::Unary(_) => NodeKind::Unary,
            Expression::Binary(_) => NodeKind::Binary,
            Expression::Call(_) => NodeKind::CallExpression,
            Expression::Constructor(_) => NodeKind::ConstructorCall,
        }
    }

    /// Whether evaluating the expression may invoke a function or
    /// constructor
    pub fn has_calls(&self) -> bool {
        match self {
            Expression::Literal(_) | Expression::Path(_) => false,
            Expression::Unary(e) => e.operand.has_calls(),
            Expression::Binary(e) => e.lhs.has_calls() || e.rhs.has_calls(),
            Expression::Call(_) | Expression::Constructor(_) => true,
        }
    }
}
