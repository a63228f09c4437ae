use std::rc::Rc;

use super::{
    Action, Block, Constant, Control, Expression, Function, Instance, Item, Package, Parameter,
    PathExpression, Program, Statement, Table, Variable,
};

/// Read-only traversal of a program. Override a `visit_*` method to observe a
/// node and call the matching `walk_*` function to continue into its
/// children.
pub trait Visitor: Sized {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program)
    }

    fn visit_item(&mut self, item: &Item) {
        walk_item(self, item)
    }

    fn visit_constant(&mut self, constant: &Rc<Constant>) {
        walk_constant(self, constant)
    }

    fn visit_variable(&mut self, variable: &Rc<Variable>) {
        walk_variable(self, variable)
    }

    fn visit_parameter(&mut self, _parameter: &Rc<Parameter>) {}

    fn visit_action(&mut self, action: &Rc<Action>) {
        walk_action(self, action)
    }

    fn visit_function(&mut self, function: &Rc<Function>) {
        walk_function(self, function)
    }

    fn visit_table(&mut self, table: &Rc<Table>) {
        walk_table(self, table)
    }

    fn visit_control(&mut self, control: &Rc<Control>) {
        walk_control(self, control)
    }

    fn visit_package(&mut self, package: &Rc<Package>) {
        walk_package(self, package)
    }

    fn visit_instance(&mut self, instance: &Rc<Instance>) {
        walk_instance(self, instance)
    }

    fn visit_block(&mut self, block: &Rc<Block>) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement)
    }

    fn visit_expression(&mut self, expression: &Expression) {
        walk_expression(self, expression)
    }

    fn visit_path(&mut self, _path: &Rc<PathExpression>) {}
}

pub fn walk_program(visitor: &mut impl Visitor, program: &Program) {
    for item in &program.declarations {
        visitor.visit_item(item);
    }
}

pub fn walk_item(visitor: &mut impl Visitor, item: &Item) {
    match item {
        Item::Constant(constant) => visitor.visit_constant(constant),
        Item::Variable(variable) => visitor.visit_variable(variable),
        Item::Action(action) => visitor.visit_action(action),
        Item::Function(function) => visitor.visit_function(function),
        Item::Table(table) => visitor.visit_table(table),
        Item::Control(control) => visitor.visit_control(control),
        Item::Package(package) => visitor.visit_package(package),
        Item::Instance(instance) => visitor.visit_instance(instance),
    }
}

pub fn walk_constant(visitor: &mut impl Visitor, constant: &Constant) {
    visitor.visit_expression(&constant.value);
}

pub fn walk_variable(visitor: &mut impl Visitor, variable: &Variable) {
    if let Some(initializer) = &variable.initializer {
        visitor.visit_expression(initializer);
    }
}

pub fn walk_action(visitor: &mut impl Visitor, action: &Action) {
    for parameter in &action.parameters {
        visitor.visit_parameter(parameter);
    }

    visitor.visit_block(&action.body);
}

pub fn walk_function(visitor: &mut impl Visitor, function: &Function) {
    for parameter in &function.parameters {
        visitor.visit_parameter(parameter);
    }

    visitor.visit_block(&function.body);
}

pub fn walk_table(visitor: &mut impl Visitor, table: &Table) {
    for action in &table.actions {
        visitor.visit_path(action);
    }

    if let Some(default_action) = &table.default_action {
        visitor.visit_path(default_action);
    }
}

pub fn walk_control(visitor: &mut impl Visitor, control: &Control) {
    for parameter in &control.parameters {
        visitor.visit_parameter(parameter);
    }

    for local in &control.locals {
        visitor.visit_item(local);
    }

    visitor.visit_block(&control.body);
}

pub fn walk_package(visitor: &mut impl Visitor, package: &Package) {
    for parameter in &package.parameters {
        visitor.visit_parameter(parameter);
    }
}

pub fn walk_instance(visitor: &mut impl Visitor, instance: &Instance) {
    visitor.visit_path(&instance.type_name);

    for argument in &instance.arguments {
        visitor.visit_expression(argument);
    }
}

pub fn walk_block(visitor: &mut impl Visitor, block: &Block) {
    for statement in &block.components {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement(visitor: &mut impl Visitor, statement: &Statement) {
    match statement {
        Statement::Constant(constant) => visitor.visit_constant(constant),
        Statement::Variable(variable) => visitor.visit_variable(variable),
        Statement::Assignment(assignment) => {
            visitor.visit_path(&assignment.target);
            visitor.visit_expression(&assignment.value);
        }
        Statement::Call(call) => {
            visitor.visit_path(&call.callee);

            for argument in &call.arguments {
                visitor.visit_expression(argument);
            }
        }
        Statement::If(if_statement) => {
            visitor.visit_expression(&if_statement.condition);
            visitor.visit_statement(&if_statement.then_branch);

            if let Some(else_branch) = &if_statement.else_branch {
                visitor.visit_statement(else_branch);
            }
        }
        Statement::Block(block) => visitor.visit_block(block),
        Statement::Return(return_statement) => {
            if let Some(value) = &return_statement.value {
                visitor.visit_expression(value);
            }
        }
        Statement::Exit(_) => {}
    }
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &Expression) {
    match expression {
        Expression::Literal(_) => {}
        Expression::Path(path) => visitor.visit_path(path),
        Expression::Unary(unary) => visitor.visit_expression(&unary.operand),
        Expression::Binary(binary) => {
            visitor.visit_expression(&binary.lhs);
            visitor.visit_expression(&binary.rhs);
        }
        Expression::Call(call) => {
            visitor.visit_path(&call.callee);

            for argument in &call.arguments {
                visitor.visit_expression(argument);
            }
        }
        Expression::Constructor(constructor) => {
            visitor.visit_path(&constructor.type_name);

            for argument in &constructor.arguments {
                visitor.visit_expression(argument);
            }
        }
    }
}

/// Counts every node reachable from the program, including the program
pub fn count_nodes(program: &Program) -> usize {
    let mut counter = NodeCounter { count: 0 };
    counter.visit_program(program);
    counter.count
}

struct NodeCounter {
    count: usize,
}

impl Visitor for NodeCounter {
    fn visit_program(&mut self, program: &Program) {
        self.count += 1;
        walk_program(self, program)
    }

    fn visit_item(&mut self, item: &Item) {
        self.count += 1;
        walk_item(self, item)
    }

    fn visit_parameter(&mut self, _parameter: &Rc<Parameter>) {
        self.count += 1;
    }

    fn visit_block(&mut self, block: &Rc<Block>) {
        self.count += 1;
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Statement) {
        // Blocks are counted by `visit_block`
        if !matches!(statement, Statement::Block(_)) {
            self.count += 1;
        }

        walk_statement(self, statement)
    }

    fn visit_expression(&mut self, expression: &Expression) {
        // Paths are counted by `visit_path`
        if !matches!(expression, Expression::Path(_)) {
            self.count += 1;
        }

        walk_expression(self, expression)
    }

    fn visit_path(&mut self, _path: &Rc<PathExpression>) {
        self.count += 1;
    }
}
