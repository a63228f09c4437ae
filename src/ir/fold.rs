use std::rc::Rc;

use super::{
    Action, Assignment, BinaryExpression, Block, CallExpression, CallStatement, Constant,
    ConstructorCall, Control, ExitStatement, Expression, Function, IfStatement, IndexedVec,
    Instance, Item, Literal, NodeId, Package, Parameter, ParameterList, PathExpression, Program,
    ReturnStatement, Statement, Table, UnaryExpression, Variable,
};
use crate::{diagnostics::Diagnostics, intern::InternedSymbol};

/// Rebuilding traversal. Every `fold_*` method returns a new node with a
/// fresh id; override one to change what gets built and call the matching
/// `walk_*` function for the default rebuild.
pub trait Folder: Sized {
    /// Receives duplicate declaration reports from rebuilt containers
    fn diagnostics(&self) -> &Diagnostics;

    /// Chooses the name of a rebuilt declaration. `id` is the id of the
    /// declaration being rebuilt.
    fn fold_declared_name(&mut self, _id: NodeId, name: InternedSymbol) -> InternedSymbol {
        name
    }

    fn fold_program(&mut self, program: &Program) -> Program {
        walk_program(self, program)
    }

    fn fold_items(&mut self, items: &IndexedVec<Item>) -> IndexedVec<Item> {
        walk_items(self, items)
    }

    fn fold_item(&mut self, item: &Item) -> Item {
        walk_item(self, item)
    }

    fn fold_constant(&mut self, constant: &Rc<Constant>) -> Rc<Constant> {
        walk_constant(self, constant)
    }

    fn fold_variable(&mut self, variable: &Rc<Variable>) -> Rc<Variable> {
        walk_variable(self, variable)
    }

    fn fold_parameter(&mut self, parameter: &Rc<Parameter>) -> Rc<Parameter> {
        let name = self.fold_declared_name(parameter.id, parameter.name);
        Rc::new(Parameter::new(name, parameter.ty.clone()))
    }

    fn fold_action(&mut self, action: &Rc<Action>) -> Rc<Action> {
        walk_action(self, action)
    }

    fn fold_function(&mut self, function: &Rc<Function>) -> Rc<Function> {
        walk_function(self, function)
    }

    fn fold_table(&mut self, table: &Rc<Table>) -> Rc<Table> {
        walk_table(self, table)
    }

    fn fold_control(&mut self, control: &Rc<Control>) -> Rc<Control> {
        walk_control(self, control)
    }

    fn fold_package(&mut self, package: &Rc<Package>) -> Rc<Package> {
        let name = self.fold_declared_name(package.id, package.name);
        let parameters = fold_parameters(self, &package.parameters);
        Rc::new(Package::new(name, parameters))
    }

    fn fold_instance(&mut self, instance: &Rc<Instance>) -> Rc<Instance> {
        walk_instance(self, instance)
    }

    fn fold_block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        walk_block(self, block)
    }

    fn fold_statement(&mut self, statement: &Statement) -> Statement {
        walk_statement(self, statement)
    }

    fn fold_expression(&mut self, expression: &Expression) -> Expression {
        walk_expression(self, expression)
    }

    fn fold_path(&mut self, path: &Rc<PathExpression>) -> Rc<PathExpression> {
        Rc::new(PathExpression::new(path.name))
    }
}

pub fn walk_program(folder: &mut impl Folder, program: &Program) -> Program {
    Program::new(folder.fold_items(&program.declarations))
}

pub fn walk_items(folder: &mut impl Folder, items: &IndexedVec<Item>) -> IndexedVec<Item> {
    let folded = items.iter().map(|item| folder.fold_item(item)).collect();
    IndexedVec::from_vec(folded, folder.diagnostics())
}

pub fn walk_item(folder: &mut impl Folder, item: &Item) -> Item {
    match item {
        Item::Constant(constant) => Item::Constant(folder.fold_constant(constant)),
        Item::Variable(variable) => Item::Variable(folder.fold_variable(variable)),
        Item::Action(action) => Item::Action(folder.fold_action(action)),
        Item::Function(function) => Item::Function(folder.fold_function(function)),
        Item::Table(table) => Item::Table(folder.fold_table(table)),
        Item::Control(control) => Item::Control(folder.fold_control(control)),
        Item::Package(package) => Item::Package(folder.fold_package(package)),
        Item::Instance(instance) => Item::Instance(folder.fold_instance(instance)),
    }
}

pub fn walk_constant(folder: &mut impl Folder, constant: &Constant) -> Rc<Constant> {
    let name = folder.fold_declared_name(constant.id, constant.name);
    let value = folder.fold_expression(&constant.value);
    Rc::new(Constant::new(name, constant.ty.clone(), value))
}

pub fn walk_variable(folder: &mut impl Folder, variable: &Variable) -> Rc<Variable> {
    let name = folder.fold_declared_name(variable.id, variable.name);
    let initializer = variable
        .initializer
        .as_ref()
        .map(|e| folder.fold_expression(e));
    Rc::new(Variable::new(name, variable.ty.clone(), initializer))
}

pub fn fold_parameters(folder: &mut impl Folder, parameters: &ParameterList) -> ParameterList {
    let folded = parameters
        .iter()
        .map(|p| folder.fold_parameter(p))
        .collect();
    IndexedVec::from_vec(folded, folder.diagnostics())
}

pub fn walk_action(folder: &mut impl Folder, action: &Action) -> Rc<Action> {
    let name = folder.fold_declared_name(action.id, action.name);
    let parameters = fold_parameters(folder, &action.parameters);
    let body = folder.fold_block(&action.body);
    Rc::new(Action::new(name, parameters, body))
}

pub fn walk_function(folder: &mut impl Folder, function: &Function) -> Rc<Function> {
    let name = folder.fold_declared_name(function.id, function.name);
    let parameters = fold_parameters(folder, &function.parameters);
    let body = folder.fold_block(&function.body);
    Rc::new(Function::new(
        name,
        function.return_type.clone(),
        parameters,
        body,
    ))
}

pub fn walk_table(folder: &mut impl Folder, table: &Table) -> Rc<Table> {
    let name = folder.fold_declared_name(table.id, table.name);
    let actions = table.actions.iter().map(|a| folder.fold_path(a)).collect();
    let default_action = table.default_action.as_ref().map(|a| folder.fold_path(a));
    Rc::new(Table::new(name, actions, default_action))
}

pub fn walk_control(folder: &mut impl Folder, control: &Control) -> Rc<Control> {
    let name = folder.fold_declared_name(control.id, control.name);
    let parameters = fold_parameters(folder, &control.parameters);
    let locals = folder.fold_items(&control.locals);
    let body = folder.fold_block(&control.body);
    Rc::new(Control::new(name, parameters, locals, body))
}

pub fn walk_instance(folder: &mut impl Folder, instance: &Instance) -> Rc<Instance> {
    let name = folder.fold_declared_name(instance.id, instance.name);
    let type_name = folder.fold_path(&instance.type_name);
    let arguments = fold_expressions(folder, &instance.arguments);
    Rc::new(Instance::new(name, type_name, arguments))
}

pub fn walk_block(folder: &mut impl Folder, block: &Block) -> Rc<Block> {
    let components = block
        .components
        .iter()
        .map(|s| folder.fold_statement(s))
        .collect();
    Rc::new(Block::new(IndexedVec::from_vec(
        components,
        folder.diagnostics(),
    )))
}

pub fn walk_statement(folder: &mut impl Folder, statement: &Statement) -> Statement {
    match statement {
        Statement::Constant(constant) => Statement::Constant(folder.fold_constant(constant)),
        Statement::Variable(variable) => Statement::Variable(folder.fold_variable(variable)),
        Statement::Assignment(assignment) => {
            let target = folder.fold_path(&assignment.target);
            let value = folder.fold_expression(&assignment.value);
            Statement::Assignment(Rc::new(Assignment::new(target, value)))
        }
        Statement::Call(call) => {
            let callee = folder.fold_path(&call.callee);
            let arguments = fold_expressions(folder, &call.arguments);
            Statement::Call(Rc::new(CallStatement::new(callee, arguments)))
        }
        Statement::If(if_statement) => {
            let condition = folder.fold_expression(&if_statement.condition);
            let then_branch = folder.fold_statement(&if_statement.then_branch);
            let else_branch = if_statement
                .else_branch
                .as_ref()
                .map(|s| folder.fold_statement(s));
            Statement::If(Rc::new(IfStatement::new(
                condition,
                then_branch,
                else_branch,
            )))
        }
        Statement::Block(block) => Statement::Block(folder.fold_block(block)),
        Statement::Return(return_statement) => {
            let value = return_statement
                .value
                .as_ref()
                .map(|e| folder.fold_expression(e));
            Statement::Return(Rc::new(ReturnStatement::new(value)))
        }
        Statement::Exit(_) => Statement::Exit(Rc::new(ExitStatement::new())),
    }
}

pub fn fold_expressions(folder: &mut impl Folder, expressions: &[Expression]) -> Vec<Expression> {
    expressions
        .iter()
        .map(|e| folder.fold_expression(e))
        .collect()
}

pub fn walk_expression(folder: &mut impl Folder, expression: &Expression) -> Expression {
    match expression {
        Expression::Literal(literal) => Expression::Literal(Rc::new(Literal::new(literal.value))),
        Expression::Path(path) => Expression::Path(folder.fold_path(path)),
        Expression::Unary(unary) => Expression::Unary(Rc::new(UnaryExpression {
            id: NodeId::fresh(),
            operator: unary.operator,
            operand: folder.fold_expression(&unary.operand),
        })),
        Expression::Binary(binary) => Expression::Binary(Rc::new(BinaryExpression {
            id: NodeId::fresh(),
            operator: binary.operator,
            lhs: folder.fold_expression(&binary.lhs),
            rhs: folder.fold_expression(&binary.rhs),
        })),
        Expression::Call(call) => Expression::Call(Rc::new(CallExpression {
            id: NodeId::fresh(),
            callee: folder.fold_path(&call.callee),
            arguments: fold_expressions(folder, &call.arguments),
        })),
        Expression::Constructor(constructor) => {
            Expression::Constructor(Rc::new(ConstructorCall {
                id: NodeId::fresh(),
                type_name: folder.fold_path(&constructor.type_name),
                arguments: fold_expressions(folder, &constructor.arguments),
            }))
        }
    }
}
