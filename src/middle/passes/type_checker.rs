//! Type checking.
//!
//! The checker never rewrites the program. It reports type errors and records
//! the type of every well-typed expression in a [`TypeMap`] that later passes
//! read. It relies on the reference map being current.

use std::rc::Rc;

use hashbrown::HashMap;

use crate::{
    diagnostics::{Diagnostics, report_error},
    intern::InternedSymbol,
    ir::{
        Action, Block, CallStatement, Constant, Control, Expression, Function, Instance,
        Item, LiteralValue, NodeId, NodeKind, Package, Parameter, PathExpression, Program, Statement,
        Table, Type, UnaryOperator, Variable,
        visit::{self, Visitor},
    },
    middle::{
        pass::{Pass, PassContext},
        reference_map::ReferenceMap,
    },
};

/// Types of expressions by node id
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    types: HashMap<NodeId, Type>,
}

impl TypeMap {
    pub fn get(&self, expression: NodeId) -> Option<&Type> {
        self.types.get(&expression)
    }

    pub fn set(&mut self, expression: NodeId, ty: Type) {
        self.types.insert(expression, ty);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}

/// Checks the whole program and replaces the type map's contents
pub struct TypeChecker;

impl Pass for TypeChecker {
    fn name(&self) -> &'static str {
        "type-checker"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        cx.type_map.clear();

        let mut collector = DeclarationCollector::default();
        collector.visit_program(&program);

        let mut checker = Checker {
            declarations: collector.declarations,
            ref_map: &cx.ref_map,
            type_map: &mut cx.type_map,
            diagnostics: cx.diagnostics,
        };
        checker.check_program(&program);

        program
    }
}

/// What the checker needs to know about a declaration
#[derive(Debug, Clone)]
enum DeclarationInfo {
    Value { ty: Type, assignable: bool },
    Callable {
        kind: NodeKind,
        parameters: Vec<Type>,
        return_type: Type,
    },
    /// Tables and control instances: invoked without arguments
    Applicable,
    /// Controls and packages
    TypeName,
}

#[derive(Default)]
struct DeclarationCollector {
    declarations: HashMap<NodeId, DeclarationInfo>,
}

impl DeclarationCollector {
    fn callable(&mut self, id: NodeId, kind: NodeKind, parameters: &[Rc<Parameter>], return_type: Type) {
        self.declarations.insert(
            id,
            DeclarationInfo::Callable {
                kind,
                parameters: parameters.iter().map(|p| p.ty.clone()).collect(),
                return_type,
            },
        );
    }
}

impl Visitor for DeclarationCollector {
    fn visit_constant(&mut self, constant: &Rc<Constant>) {
        self.declarations.insert(
            constant.id,
            DeclarationInfo::Value {
                ty: constant.ty.clone(),
                assignable: false,
            },
        );
    }

    fn visit_variable(&mut self, variable: &Rc<Variable>) {
        self.declarations.insert(
            variable.id,
            DeclarationInfo::Value {
                ty: variable.ty.clone(),
                assignable: true,
            },
        );
    }

    fn visit_parameter(&mut self, parameter: &Rc<Parameter>) {
        self.declarations.insert(
            parameter.id,
            DeclarationInfo::Value {
                ty: parameter.ty.clone(),
                assignable: true,
            },
        );
    }

    fn visit_action(&mut self, action: &Rc<Action>) {
        self.callable(action.id, NodeKind::Action, &action.parameters, Type::Void);
        visit::walk_action(self, action)
    }

    fn visit_function(&mut self, function: &Rc<Function>) {
        self.callable(
            function.id,
            NodeKind::Function,
            &function.parameters,
            function.return_type.clone(),
        );
        visit::walk_function(self, function)
    }

    fn visit_table(&mut self, table: &Rc<Table>) {
        self.declarations.insert(table.id, DeclarationInfo::Applicable);
    }

    fn visit_instance(&mut self, instance: &Rc<Instance>) {
        self.declarations
            .insert(instance.id, DeclarationInfo::Applicable);
    }

    fn visit_control(&mut self, control: &Rc<Control>) {
        self.declarations.insert(control.id, DeclarationInfo::TypeName);
        visit::walk_control(self, control)
    }

    fn visit_package(&mut self, package: &Rc<Package>) {
        self.declarations.insert(package.id, DeclarationInfo::TypeName);
    }
}

/// Type of an expression while checking. Integer literals without a width
/// take the width their context expects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inferred {
    Exact(Type),
    UnsizedInt,
}

impl Inferred {
    fn is_numeric(&self) -> bool {
        matches!(self, Inferred::UnsizedInt | Inferred::Exact(Type::Bits(_)))
    }

    fn describe(&self) -> String {
        match self {
            Inferred::Exact(ty) => ty.to_string(),
            Inferred::UnsizedInt => "int".to_owned(),
        }
    }
}

struct Checker<'m, 'd> {
    declarations: HashMap<NodeId, DeclarationInfo>,
    ref_map: &'m ReferenceMap,
    type_map: &'m mut TypeMap,
    diagnostics: &'d Diagnostics,
}

impl Checker<'_, '_> {
    fn check_program(&mut self, program: &Program) {
        for item in &program.declarations {
            self.check_item(item);
        }
    }

    fn check_item(&mut self, item: &Item) {
        match item {
            Item::Constant(constant) => {
                self.expect_type(&constant.value, &constant.ty, "constant", constant.name)
            }
            Item::Variable(variable) => self.check_variable(variable),
            Item::Action(action) => self.check_block(&action.body, &Type::Void),
            Item::Function(function) => self.check_block(&function.body, &function.return_type),
            Item::Table(table) => {
                for action in table.actions.iter().chain(&table.default_action) {
                    if let Some(declaration) = self.ref_map.get_declaration(action.id) {
                        if declaration.kind != NodeKind::Action {
                            report_error!(
                                self.diagnostics,
                                "table `{}` lists `{}` which is a {}, not an action",
                                table.name,
                                action.name,
                                declaration.kind
                            );
                        }
                    }
                }
            }
            Item::Control(control) => {
                for local in &control.locals {
                    self.check_item(local);
                }

                self.check_block(&control.body, &Type::Void);
            }
            Item::Package(_) => {}
            // Constructor arguments are checked by evaluation
            Item::Instance(instance) => {
                if let Some(declaration) = self.ref_map.get_declaration(instance.type_name.id) {
                    if !matches!(declaration.kind, NodeKind::Control | NodeKind::Package) {
                        report_error!(
                            self.diagnostics,
                            "`{}` is a {} and cannot be instantiated",
                            instance.type_name.name,
                            declaration.kind
                        );
                    }
                }
            }
        }
    }

    fn check_variable(&mut self, variable: &Variable) {
        if let Some(initializer) = &variable.initializer {
            self.expect_type(initializer, &variable.ty, "variable", variable.name);
        }
    }

    fn check_block(&mut self, block: &Block, return_type: &Type) {
        for statement in &block.components {
            self.check_statement(statement, return_type);
        }
    }

    fn check_statement(&mut self, statement: &Statement, return_type: &Type) {
        match statement {
            Statement::Constant(constant) => {
                self.expect_type(&constant.value, &constant.ty, "constant", constant.name)
            }
            Statement::Variable(variable) => self.check_variable(variable),
            Statement::Assignment(assignment) => {
                let Some(target) = self.lookup(&assignment.target) else {
                    return;
                };

                match target {
                    DeclarationInfo::Value {
                        ty,
                        assignable: true,
                    } => self.expect_type(
                        &assignment.value,
                        &ty,
                        "assignment to",
                        assignment.target.name,
                    ),
                    DeclarationInfo::Value {
                        assignable: false, ..
                    } => report_error!(
                        self.diagnostics,
                        "cannot assign to constant `{}`",
                        assignment.target.name
                    ),
                    _ => report_error!(
                        self.diagnostics,
                        "cannot assign to `{}`; it is not a variable",
                        assignment.target.name
                    ),
                }
            }
            Statement::Call(call) => self.check_call_statement(call),
            Statement::If(if_statement) => {
                self.expect_condition(&if_statement.condition);
                self.check_statement(&if_statement.then_branch, return_type);

                if let Some(else_branch) = &if_statement.else_branch {
                    self.check_statement(else_branch, return_type);
                }
            }
            Statement::Block(block) => self.check_block(block, return_type),
            Statement::Return(return_statement) => {
                match (&return_statement.value, return_type) {
                    (None, Type::Void) => {}
                    (Some(_), Type::Void) => report_error!(
                        self.diagnostics,
                        "a value is returned from a callable without a return type"
                    ),
                    (None, expected) => report_error!(
                        self.diagnostics,
                        "missing return value of type `{expected}`"
                    ),
                    (Some(value), expected) => {
                        self.expect_type(value, expected, "return value", InternedSymbol::new("return"))
                    }
                }
            }
            Statement::Exit(_) => {}
        }
    }

    fn check_call_statement(&mut self, call: &CallStatement) {
        let Some(callee) = self.lookup(&call.callee) else {
            return;
        };

        match callee {
            DeclarationInfo::Callable { parameters, .. } => {
                self.check_arguments(call.callee.name, &parameters, &call.arguments)
            }
            DeclarationInfo::Applicable => {
                if !call.arguments.is_empty() {
                    report_error!(
                        self.diagnostics,
                        "`{}` is applied without arguments but {} were given",
                        call.callee.name,
                        call.arguments.len()
                    );
                }
            }
            _ => report_error!(
                self.diagnostics,
                "`{}` cannot be called",
                call.callee.name
            ),
        }
    }

    fn check_arguments(
        &mut self,
        callee: InternedSymbol,
        parameters: &[Type],
        arguments: &[Expression],
    ) {
        if parameters.len() != arguments.len() {
            report_error!(
                self.diagnostics,
                "`{callee}` expects {} argument(s) but {} were given",
                parameters.len(),
                arguments.len()
            );
            return;
        }

        for (parameter, argument) in parameters.iter().zip(arguments) {
            self.expect_type(argument, parameter, "argument of", callee);
        }
    }

    fn lookup(&self, path: &PathExpression) -> Option<DeclarationInfo> {
        // Unresolved names were already reported by resolution
        let declaration = self.ref_map.get_declaration(path.id)?;
        self.declarations.get(&declaration.id).cloned()
    }

    fn expect_condition(&mut self, condition: &Expression) {
        if let Some(inferred) = self.infer(condition) {
            if inferred != Inferred::Exact(Type::Bool) {
                report_error!(
                    self.diagnostics,
                    "condition must be `bool`, found `{}`",
                    inferred.describe()
                );
            }
        }
    }

    /// Checks that `expression` can be used where `expected` is required and
    /// records the type it takes there
    fn expect_type(
        &mut self,
        expression: &Expression,
        expected: &Type,
        context: &str,
        name: InternedSymbol,
    ) {
        let Some(inferred) = self.infer(expression) else {
            return;
        };

        let compatible = match (&inferred, expected) {
            (Inferred::UnsizedInt, Type::Bits(_)) => true,
            (Inferred::Exact(found), expected) => found == expected,
            _ => false,
        };

        if compatible {
            self.type_map.set(expression.id(), expected.clone());
        } else {
            report_error!(
                self.diagnostics,
                "type mismatch in {context} `{name}`: expected `{expected}`, found `{}`",
                inferred.describe()
            );
        }
    }

    fn record(&mut self, expression: &Expression, inferred: Inferred) -> Option<Inferred> {
        if let Inferred::Exact(ty) = &inferred {
            self.type_map.set(expression.id(), ty.clone());
        }

        Some(inferred)
    }

    fn infer(&mut self, expression: &Expression) -> Option<Inferred> {
        match expression {
            Expression::Literal(literal) => {
                let inferred = match literal.value {
                    LiteralValue::Bool(_) => Inferred::Exact(Type::Bool),
                    LiteralValue::Int {
                        width: Some(width), ..
                    } => Inferred::Exact(Type::Bits(width)),
                    LiteralValue::Int { width: None, .. } => Inferred::UnsizedInt,
                };
                self.record(expression, inferred)
            }
            Expression::Path(path) => match self.lookup(path)? {
                DeclarationInfo::Value { ty, .. } => self.record(expression, Inferred::Exact(ty)),
                _ => {
                    report_error!(
                        self.diagnostics,
                        "`{}` cannot be used as a value",
                        path.name
                    );
                    None
                }
            },
            Expression::Unary(unary) => {
                let operand = self.infer(&unary.operand)?;

                let valid = match unary.operator {
                    UnaryOperator::Not => operand == Inferred::Exact(Type::Bool),
                    UnaryOperator::Complement | UnaryOperator::Negate => operand.is_numeric(),
                };

                if !valid {
                    report_error!(
                        self.diagnostics,
                        "operator `{}` cannot be applied to `{}`",
                        unary.operator,
                        operand.describe()
                    );
                    return None;
                }

                self.record(expression, operand)
            }
            Expression::Binary(binary) => {
                let lhs = self.infer(&binary.lhs)?;
                let rhs = self.infer(&binary.rhs)?;
                let operator = binary.operator;

                let result = if operator.is_logical() {
                    (lhs == Inferred::Exact(Type::Bool) && rhs == Inferred::Exact(Type::Bool))
                        .then_some(Inferred::Exact(Type::Bool))
                } else {
                    let unified = unify_numeric(&lhs, &rhs);

                    if operator.is_equality() {
                        (lhs == rhs || unified.is_some()).then_some(Inferred::Exact(Type::Bool))
                    } else if operator.is_ordering() {
                        unified.map(|_| Inferred::Exact(Type::Bool))
                    } else {
                        unified
                    }
                };

                match result {
                    Some(result) => {
                        self.settle_operand(&binary.lhs, &lhs, &rhs);
                        self.settle_operand(&binary.rhs, &rhs, &lhs);
                        self.record(expression, result)
                    }
                    None => {
                        report_error!(
                            self.diagnostics,
                            "operator `{operator}` cannot be applied to `{}` and `{}`",
                            lhs.describe(),
                            rhs.describe()
                        );
                        None
                    }
                }
            }
            Expression::Call(call) => {
                match self.lookup(&call.callee)? {
                    DeclarationInfo::Callable {
                        kind: NodeKind::Function,
                        parameters,
                        return_type,
                    } if return_type != Type::Void => {
                        self.check_arguments(call.callee.name, &parameters, &call.arguments);
                        self.record(expression, Inferred::Exact(return_type))
                    }
                    _ => {
                        report_error!(
                            self.diagnostics,
                            "`{}` does not produce a value",
                            call.callee.name
                        );
                        None
                    }
                }
            }
            Expression::Constructor(constructor) => {
                report_error!(
                    self.diagnostics,
                    "`{}(...)` can only be used to instantiate a package argument",
                    constructor.type_name.name
                );
                None
            }
        }
    }

    /// An unsized literal next to a sized operand takes the operand's width
    fn settle_operand(&mut self, operand: &Expression, inferred: &Inferred, other: &Inferred) {
        if let (Inferred::UnsizedInt, Inferred::Exact(ty @ Type::Bits(_))) = (inferred, other) {
            self.type_map.set(operand.id(), ty.clone());
        }
    }
}

fn unify_numeric(lhs: &Inferred, rhs: &Inferred) -> Option<Inferred> {
    match (lhs, rhs) {
        (Inferred::UnsizedInt, Inferred::UnsizedInt) => Some(Inferred::UnsizedInt),
        (Inferred::UnsizedInt, Inferred::Exact(ty @ Type::Bits(_)))
        | (Inferred::Exact(ty @ Type::Bits(_)), Inferred::UnsizedInt) => {
            Some(Inferred::Exact(ty.clone()))
        }
        (Inferred::Exact(Type::Bits(l)), Inferred::Exact(Type::Bits(r))) if l == r => {
            Some(Inferred::Exact(Type::Bits(*l)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinaryOperator, build::IrBuilder},
        middle::passes::resolve_references::resolve_program,
        options::CompilerOptions,
    };

    fn check(program: Program, cx: &mut PassContext<'_>) -> Program {
        resolve_program(&program, &mut cx.ref_map, false, cx.diagnostics);
        TypeChecker.apply(program, cx)
    }

    #[test]
    fn well_typed_program_fills_the_type_map() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let argument = b.int(3);
        let program = b.program(vec![
            b.global_var("total", Type::Bits(8), None),
            b.action(
                "add",
                vec![b.param("amount", Type::Bits(8))],
                vec![b.assign(
                    "total",
                    b.binary(BinaryOperator::Add, b.name("total"), b.name("amount")),
                )],
            ),
            b.control(
                "C",
                vec![],
                vec![],
                vec![b.if_(
                    b.binary(BinaryOperator::Lt, b.name("total"), b.int(10)),
                    b.call("add", vec![argument.clone()]),
                    None,
                )],
            ),
        ]);

        check(program, &mut cx);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(cx.type_map.get(argument.id()), Some(&Type::Bits(8)));
    }

    #[test]
    fn reports_mismatches() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.global_const("K", Type::Bits(8), b.bool(true)),
            b.action("a", vec![b.param("p", Type::Bool)], vec![b.ret_value(b.int(1))]),
            b.function("f", Type::Bits(4), vec![], vec![b.ret()]),
            b.control(
                "C",
                vec![],
                vec![],
                vec![
                    b.assign("K", b.int_w(1, 8)),
                    b.call("a", vec![]),
                    b.if_(b.int(1), b.exit(), None),
                    b.call("a", vec![b.int_w(2, 8)]),
                ],
            ),
        ]);

        check(program, &mut cx);

        let errors = diagnostics.errors();
        assert_eq!(errors.len(), 7, "{errors:#?}");
        assert!(errors[0].contains("type mismatch in constant `K`: expected `bit<8>`, found `bool`"));
        assert!(errors[1].contains("a value is returned"));
        assert!(errors[2].contains("missing return value of type `bit<4>`"));
        assert!(errors[3].contains("cannot assign to constant `K`"));
        assert!(errors[4].contains("`a` expects 1 argument(s) but 0 were given"));
        assert!(errors[5].contains("condition must be `bool`, found `int`"));
        assert!(errors[6].contains("type mismatch in argument of `a`"));
    }
}
