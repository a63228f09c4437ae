use std::rc::Rc;

use crate::{
    diagnostics::Diagnostics,
    ir::{
        Action, Assignment, Block, Control, Function, IfStatement, IndexedVec, Item, PathExpression,
        Program, Statement, Variable,
    },
    middle::pass::{Pass, PassContext},
};

/// Hoists local declarations out of nested blocks.
///
/// Variables and constants declared anywhere in the body of an action or
/// function move to the start of that body. For a control they move to the
/// end of the control's locals. A variable's initializer stays where it was,
/// turned into an assignment. Requires unique names.
pub struct MoveDeclarations;

impl Pass for MoveDeclarations {
    fn name(&self) -> &'static str {
        "move-declarations"
    }

    fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
        for position in 0..program.declarations.len() {
            if let Some(moved) = move_in_item(&program.declarations[position], cx.diagnostics) {
                program
                    .declarations
                    .replace(position, moved, cx.diagnostics);
            }
        }

        program
    }
}

/// Returns the rewritten item, or `None` when it has no body
fn move_in_item(item: &Item, diagnostics: &Diagnostics) -> Option<Item> {
    match item {
        Item::Action(action) => {
            let body = hoist_to_front(&action.body, diagnostics);
            Some(Item::Action(Rc::new(Action::new(
                action.name,
                action.parameters.clone(),
                body,
            ))))
        }
        Item::Function(function) => {
            let body = hoist_to_front(&function.body, diagnostics);
            Some(Item::Function(Rc::new(Function::new(
                function.name,
                function.return_type.clone(),
                function.parameters.clone(),
                body,
            ))))
        }
        Item::Control(control) => {
            let mut locals = IndexedVec::new();
            for local in &control.locals {
                let local = move_in_item(local, diagnostics).unwrap_or_else(|| local.clone());
                locals.push(local, diagnostics);
            }

            let mut hoister = Hoister::new(diagnostics);
            let body = hoister.strip_block(&control.body);

            for declaration in hoister.hoisted {
                let local = match declaration {
                    Statement::Variable(variable) => Item::Variable(variable),
                    Statement::Constant(constant) => Item::Constant(constant),
                    _ => continue,
                };
                locals.push(local, diagnostics);
            }

            Some(Item::Control(Rc::new(Control::new(
                control.name,
                control.parameters.clone(),
                locals,
                body,
            ))))
        }
        _ => None,
    }
}

fn hoist_to_front(body: &Block, diagnostics: &Diagnostics) -> Rc<Block> {
    let mut hoister = Hoister::new(diagnostics);
    let stripped = hoister.strip_block(body);

    let mut components = IndexedVec::from_vec(hoister.hoisted, diagnostics);
    components.append(&stripped.components, diagnostics);
    Rc::new(Block::new(components))
}

struct Hoister<'d> {
    diagnostics: &'d Diagnostics,
    hoisted: Vec<Statement>,
}

impl<'d> Hoister<'d> {
    fn new(diagnostics: &'d Diagnostics) -> Self {
        Self {
            diagnostics,
            hoisted: Vec::new(),
        }
    }

    /// Moves declarations out of `statement`, returning what remains in its
    /// place, if anything
    fn strip_statement(&mut self, statement: &Statement) -> Option<Statement> {
        match statement {
            Statement::Variable(variable) => {
                self.hoisted.push(Statement::Variable(Rc::new(Variable::new(
                    variable.name,
                    variable.ty.clone(),
                    None,
                ))));

                variable.initializer.as_ref().map(|initializer| {
                    Statement::Assignment(Rc::new(Assignment::new(
                        Rc::new(PathExpression::new(variable.name)),
                        initializer.clone(),
                    )))
                })
            }
            Statement::Constant(_) => {
                self.hoisted.push(statement.clone());
                None
            }
            Statement::Block(block) => Some(Statement::Block(self.strip_block(block))),
            Statement::If(if_statement) => {
                let then_branch = self.strip_branch(&if_statement.then_branch);
                let else_branch = if_statement
                    .else_branch
                    .as_ref()
                    .map(|branch| self.strip_branch(branch));

                Some(Statement::If(Rc::new(IfStatement::new(
                    if_statement.condition.clone(),
                    then_branch,
                    else_branch,
                ))))
            }
            _ => Some(statement.clone()),
        }
    }

    /// Like [`Self::strip_statement`], but a branch must keep a statement
    fn strip_branch(&mut self, branch: &Statement) -> Statement {
        self.strip_statement(branch).unwrap_or_else(|| {
            Statement::Block(Rc::new(Block::new(IndexedVec::new())))
        })
    }

    fn strip_block(&mut self, block: &Block) -> Rc<Block> {
        let components = block
            .components
            .iter()
            .filter_map(|statement| self.strip_statement(statement))
            .collect();

        Rc::new(Block::new(IndexedVec::from_vec(components, self.diagnostics)))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::{
        ir::{Type, build::IrBuilder, pretty_print::print_program},
        options::CompilerOptions,
    };

    #[test]
    fn hoists_nested_declarations_and_keeps_initializers_in_place() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.action(
                "a",
                vec![],
                vec![
                    b.exit(),
                    b.block(vec![
                        b.var("tmp", Type::Bits(8), Some(b.int(4))),
                        b.constant("K", Type::Bits(8), b.int(1)),
                    ]),
                    b.if_(b.bool(true), b.var("flag", Type::Bool, None), None),
                ],
            ),
            b.control(
                "C",
                vec![],
                vec![b.global_var("existing", Type::Bool, None)],
                vec![b.if_(
                    b.bool(false),
                    b.block(vec![b.var("hidden", Type::Bool, Some(b.bool(true)))]),
                    None,
                )],
            ),
        ]);

        let program = MoveDeclarations.apply(program, &mut cx);

        expect![[r#"
            action a() {
                bit<8> tmp;
                const bit<8> K = 1;
                bool flag;
                exit;
                {
                    tmp = 4;
                }
                if (true) {
                }
            }
            control C() {
                bool existing;
                bool hidden;
                apply {
                    if (false) {
                        hidden = true;
                    }
                }
            }
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
        program.declarations.check_valid();
    }
}
