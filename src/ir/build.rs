//! Convenience constructors for assembling trees by hand. Containers built
//! here report duplicate declarations to the builder's diagnostics exactly
//! like containers built by passes.

use std::rc::Rc;

use super::{
    Action, Assignment, BinaryExpression, BinaryOperator, Block, CallExpression, CallStatement,
    Constant, ConstructorCall, Control, ExitStatement, Expression, Function, IfStatement,
    IndexedVec, Instance, Item, Literal, LiteralValue, NodeId, Package, Parameter, PathExpression,
    Program, ReturnStatement, Statement, Table, Type, UnaryExpression, UnaryOperator, Variable,
};
use crate::{diagnostics::Diagnostics, intern::InternedSymbol};

#[derive(Debug, Clone, Copy)]
pub struct IrBuilder<'d> {
    diagnostics: &'d Diagnostics,
}

impl<'d> IrBuilder<'d> {
    pub fn new(diagnostics: &'d Diagnostics) -> Self {
        Self { diagnostics }
    }

    pub fn sym(&self, name: &str) -> InternedSymbol {
        InternedSymbol::new(name)
    }

    /* Expressions */

    pub fn path(&self, name: &str) -> Rc<PathExpression> {
        Rc::new(PathExpression::new(self.sym(name)))
    }

    pub fn name(&self, name: &str) -> Expression {
        Expression::Path(self.path(name))
    }

    /// An integer literal without an explicit width
    pub fn int(&self, value: u64) -> Expression {
        Expression::Literal(Rc::new(Literal::new(LiteralValue::Int { value, width: None })))
    }

    pub fn int_w(&self, value: u64, width: u16) -> Expression {
        Expression::Literal(Rc::new(Literal::new(LiteralValue::Int {
            value,
            width: Some(width),
        })))
    }

    pub fn bool(&self, value: bool) -> Expression {
        Expression::Literal(Rc::new(Literal::new(LiteralValue::Bool(value))))
    }

    pub fn unary(&self, operator: UnaryOperator, operand: Expression) -> Expression {
        Expression::Unary(Rc::new(UnaryExpression {
            id: NodeId::fresh(),
            operator,
            operand,
        }))
    }

    pub fn not(&self, operand: Expression) -> Expression {
        self.unary(UnaryOperator::Not, operand)
    }

    pub fn binary(&self, operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(Rc::new(BinaryExpression {
            id: NodeId::fresh(),
            operator,
            lhs,
            rhs,
        }))
    }

    pub fn call_expr(&self, callee: &str, arguments: Vec<Expression>) -> Expression {
        Expression::Call(Rc::new(CallExpression {
            id: NodeId::fresh(),
            callee: self.path(callee),
            arguments,
        }))
    }

    pub fn construct(&self, type_name: &str, arguments: Vec<Expression>) -> Expression {
        Expression::Constructor(Rc::new(ConstructorCall {
            id: NodeId::fresh(),
            type_name: self.path(type_name),
            arguments,
        }))
    }

    /* Statements */

    pub fn var(&self, name: &str, ty: Type, initializer: Option<Expression>) -> Statement {
        Statement::Variable(Rc::new(Variable::new(self.sym(name), ty, initializer)))
    }

    pub fn constant(&self, name: &str, ty: Type, value: Expression) -> Statement {
        Statement::Constant(Rc::new(Constant::new(self.sym(name), ty, value)))
    }

    pub fn assign(&self, target: &str, value: Expression) -> Statement {
        Statement::Assignment(Rc::new(Assignment::new(self.path(target), value)))
    }

    pub fn call(&self, callee: &str, arguments: Vec<Expression>) -> Statement {
        Statement::Call(Rc::new(CallStatement::new(self.path(callee), arguments)))
    }

    /// `callee.apply()` for tables and control instances
    pub fn apply(&self, callee: &str) -> Statement {
        self.call(callee, Vec::new())
    }

    pub fn if_(
        &self,
        condition: Expression,
        then_branch: Statement,
        else_branch: Option<Statement>,
    ) -> Statement {
        Statement::If(Rc::new(IfStatement::new(condition, then_branch, else_branch)))
    }

    pub fn ret(&self) -> Statement {
        Statement::Return(Rc::new(ReturnStatement::new(None)))
    }

    pub fn ret_value(&self, value: Expression) -> Statement {
        Statement::Return(Rc::new(ReturnStatement::new(Some(value))))
    }

    pub fn exit(&self) -> Statement {
        Statement::Exit(Rc::new(ExitStatement::new()))
    }

    pub fn body(&self, statements: Vec<Statement>) -> Rc<Block> {
        Rc::new(Block::new(IndexedVec::from_vec(statements, self.diagnostics)))
    }

    pub fn block(&self, statements: Vec<Statement>) -> Statement {
        Statement::Block(self.body(statements))
    }

    /* Declarations */

    pub fn param(&self, name: &str, ty: Type) -> Rc<Parameter> {
        Rc::new(Parameter::new(self.sym(name), ty))
    }

    pub fn action(
        &self,
        name: &str,
        parameters: Vec<Rc<Parameter>>,
        statements: Vec<Statement>,
    ) -> Item {
        Item::Action(Rc::new(Action::new(
            self.sym(name),
            IndexedVec::from_vec(parameters, self.diagnostics),
            self.body(statements),
        )))
    }

    pub fn function(
        &self,
        name: &str,
        return_type: Type,
        parameters: Vec<Rc<Parameter>>,
        statements: Vec<Statement>,
    ) -> Item {
        Item::Function(Rc::new(Function::new(
            self.sym(name),
            return_type,
            IndexedVec::from_vec(parameters, self.diagnostics),
            self.body(statements),
        )))
    }

    pub fn table(&self, name: &str, actions: &[&str], default_action: Option<&str>) -> Item {
        Item::Table(Rc::new(Table::new(
            self.sym(name),
            actions.iter().map(|a| self.path(a)).collect(),
            default_action.map(|a| self.path(a)),
        )))
    }

    pub fn control(
        &self,
        name: &str,
        parameters: Vec<Rc<Parameter>>,
        locals: Vec<Item>,
        statements: Vec<Statement>,
    ) -> Item {
        Item::Control(Rc::new(Control::new(
            self.sym(name),
            IndexedVec::from_vec(parameters, self.diagnostics),
            IndexedVec::from_vec(locals, self.diagnostics),
            self.body(statements),
        )))
    }

    pub fn package(&self, name: &str, parameters: Vec<Rc<Parameter>>) -> Item {
        Item::Package(Rc::new(Package::new(
            self.sym(name),
            IndexedVec::from_vec(parameters, self.diagnostics),
        )))
    }

    pub fn instance(&self, name: &str, type_name: &str, arguments: Vec<Expression>) -> Item {
        Item::Instance(Rc::new(Instance::new(
            self.sym(name),
            self.path(type_name),
            arguments,
        )))
    }

    pub fn global_var(&self, name: &str, ty: Type, initializer: Option<Expression>) -> Item {
        Item::Variable(Rc::new(Variable::new(self.sym(name), ty, initializer)))
    }

    pub fn global_const(&self, name: &str, ty: Type, value: Expression) -> Item {
        Item::Constant(Rc::new(Constant::new(self.sym(name), ty, value)))
    }

    pub fn program(&self, items: Vec<Item>) -> Program {
        Program::new(IndexedVec::from_vec(items, self.diagnostics))
    }
}
