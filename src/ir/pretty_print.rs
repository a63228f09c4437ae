//! Renders a program as source-like text for dumps and the CLI.

use itertools::Itertools;

use super::{
    Block, Expression, Item, LiteralValue, ParameterList, Program, Statement,
};

pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();

    for item in &program.declarations {
        printer.item(item);
    }

    printer.out
}

pub fn print_item(item: &Item) -> String {
    let mut printer = Printer::default();
    printer.item(item);
    printer.out
}

pub fn print_expression(expression: &Expression) -> String {
    match expression {
        Expression::Literal(literal) => match literal.value {
            LiteralValue::Bool(value) => value.to_string(),
            LiteralValue::Int { value, width: None } => value.to_string(),
            LiteralValue::Int {
                value,
                width: Some(width),
            } => format!("{width}w{value}"),
        },
        Expression::Path(path) => path.name.to_string(),
        Expression::Unary(unary) => {
            format!("{}{}", unary.operator, operand(&unary.operand))
        }
        Expression::Binary(binary) => format!(
            "{} {} {}",
            operand(&binary.lhs),
            binary.operator,
            operand(&binary.rhs)
        ),
        Expression::Call(call) => format!("{}({})", call.callee.name, arguments(&call.arguments)),
        Expression::Constructor(constructor) => format!(
            "{}({})",
            constructor.type_name.name,
            arguments(&constructor.arguments)
        ),
    }
}

/// Nested operators are parenthesized so the text never depends on
/// precedence
fn operand(expression: &Expression) -> String {
    match expression {
        Expression::Binary(_) => format!("({})", print_expression(expression)),
        _ => print_expression(expression),
    }
}

fn arguments(arguments: &[Expression]) -> String {
    arguments.iter().map(print_expression).join(", ")
}

fn parameters(parameters: &ParameterList) -> String {
    parameters
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .join(", ")
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }

        self.out.push_str(text);
        self.out.push('\n');
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Constant(constant) => self.line(&format!(
                "const {} {} = {};",
                constant.ty,
                constant.name,
                print_expression(&constant.value)
            )),
            Item::Variable(variable) => match &variable.initializer {
                Some(initializer) => self.line(&format!(
                    "{} {} = {};",
                    variable.ty,
                    variable.name,
                    print_expression(initializer)
                )),
                None => self.line(&format!("{} {};", variable.ty, variable.name)),
            },
            Item::Action(action) => {
                self.line(&format!(
                    "action {}({}) {{",
                    action.name,
                    parameters(&action.parameters)
                ));
                self.block_contents(&action.body);
                self.line("}");
            }
            Item::Function(function) => {
                self.line(&format!(
                    "function {} {}({}) {{",
                    function.return_type,
                    function.name,
                    parameters(&function.parameters)
                ));
                self.block_contents(&function.body);
                self.line("}");
            }
            Item::Table(table) => {
                self.line(&format!("table {} {{", table.name));
                self.indent += 1;
                self.line(&format!(
                    "actions = {{ {} }}",
                    table.actions.iter().map(|a| format!("{};", a.name)).join(" ")
                ));
                if let Some(default_action) = &table.default_action {
                    self.line(&format!("default_action = {};", default_action.name));
                }
                self.indent -= 1;
                self.line("}");
            }
            Item::Control(control) => {
                self.line(&format!(
                    "control {}({}) {{",
                    control.name,
                    parameters(&control.parameters)
                ));
                self.indent += 1;
                for local in &control.locals {
                    self.item(local);
                }
                self.line("apply {");
                self.block_contents(&control.body);
                self.line("}");
                self.indent -= 1;
                self.line("}");
            }
            Item::Package(package) => self.line(&format!(
                "package {}({});",
                package.name,
                parameters(&package.parameters)
            )),
            Item::Instance(instance) => self.line(&format!(
                "{}({}) {};",
                instance.type_name.name,
                arguments(&instance.arguments),
                instance.name
            )),
        }
    }

    fn block_contents(&mut self, block: &Block) {
        self.indent += 1;
        for statement in &block.components {
            self.statement(statement);
        }
        self.indent -= 1;
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Constant(constant) => self.line(&format!(
                "const {} {} = {};",
                constant.ty,
                constant.name,
                print_expression(&constant.value)
            )),
            Statement::Variable(variable) => match &variable.initializer {
                Some(initializer) => self.line(&format!(
                    "{} {} = {};",
                    variable.ty,
                    variable.name,
                    print_expression(initializer)
                )),
                None => self.line(&format!("{} {};", variable.ty, variable.name)),
            },
            Statement::Assignment(assignment) => self.line(&format!(
                "{} = {};",
                assignment.target.name,
                print_expression(&assignment.value)
            )),
            Statement::Call(call) => self.line(&format!(
                "{}({});",
                call.callee.name,
                arguments(&call.arguments)
            )),
            Statement::If(if_statement) => {
                self.line(&format!(
                    "if ({}) {{",
                    print_expression(&if_statement.condition)
                ));
                self.branch(&if_statement.then_branch);
                match &if_statement.else_branch {
                    Some(else_branch) => {
                        self.line("} else {");
                        self.branch(else_branch);
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            Statement::Block(block) => {
                self.line("{");
                self.block_contents(block);
                self.line("}");
            }
            Statement::Return(return_statement) => match &return_statement.value {
                Some(value) => self.line(&format!("return {};", print_expression(value))),
                None => self.line("return;"),
            },
            Statement::Exit(_) => self.line("exit;"),
        }
    }

    /// Branch bodies print without their own braces; the `if` supplies them
    fn branch(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(block) => self.block_contents(block),
            other => {
                self.indent += 1;
                self.statement(other);
                self.indent -= 1;
            }
        }
    }
}
