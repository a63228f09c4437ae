use std::rc::Rc;

use crate::{
    diagnostics::Diagnostics,
    ir::{
        Block, IfStatement, IndexedVec, Program, Statement,
        fold::{self, Folder},
    },
    middle::pass::{Pass, PassContext},
};

/// Cleans up the block structure left behind by inlining.
///
/// Empty blocks are dropped, blocks without declarations are spliced into
/// their parent, and an `if` whose branches are all empty disappears unless
/// its condition calls something.
pub struct SimplifyControlFlow;

impl Pass for SimplifyControlFlow {
    fn name(&self) -> &'static str {
        "simplify-control-flow"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        Simplifier {
            diagnostics: cx.diagnostics,
        }
        .fold_program(&program)
    }
}

struct Simplifier<'d> {
    diagnostics: &'d Diagnostics,
}

fn is_empty_statement(statement: &Statement) -> bool {
    matches!(statement, Statement::Block(block) if block.is_empty())
}

fn empty_block() -> Statement {
    Statement::Block(Rc::new(Block::new(IndexedVec::new())))
}

/// A branch holding a single statement that declares nothing is that statement
fn collapse_branch(branch: Statement) -> Statement {
    match &branch {
        Statement::Block(block) if block.components.len() == 1 && !block.has_declarations() => {
            block.components[0].clone()
        }
        _ => branch,
    }
}

impl Folder for Simplifier<'_> {
    fn diagnostics(&self) -> &Diagnostics {
        self.diagnostics
    }

    fn fold_block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        let mut components = Vec::with_capacity(block.components.len());

        for statement in &block.components {
            match self.fold_statement(statement) {
                Statement::Block(inner) if !inner.has_declarations() => {
                    components.extend(inner.components.iter().cloned())
                }
                other => components.push(other),
            }
        }

        Rc::new(Block::new(IndexedVec::from_vec(
            components,
            self.diagnostics,
        )))
    }

    fn fold_statement(&mut self, statement: &Statement) -> Statement {
        let folded = fold::walk_statement(self, statement);

        let Statement::If(if_statement) = &folded else {
            return folded;
        };

        let then_empty = is_empty_statement(&if_statement.then_branch);
        let else_empty = if_statement
            .else_branch
            .as_ref()
            .is_none_or(is_empty_statement);

        if then_empty && else_empty && !if_statement.condition.has_calls() {
            return empty_block();
        }

        let else_branch = if else_empty {
            None
        } else {
            if_statement.else_branch.clone().map(collapse_branch)
        };

        Statement::If(Rc::new(IfStatement::new(
            if_statement.condition.clone(),
            collapse_branch(if_statement.then_branch.clone()),
            else_branch,
        )))
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
    fn removes_empty_and_redundant_blocks() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.global_var("total", Type::Bits(8), None),
            b.global_var("flag", Type::Bool, None),
            b.function("check", Type::Bool, vec![], vec![b.ret_value(b.bool(true))]),
            b.control(
                "C",
                vec![],
                vec![],
                vec![
                    b.block(vec![]),
                    b.block(vec![b.assign("total", b.int(1))]),
                    b.block(vec![
                        b.var("t", Type::Bits(8), Some(b.int(2))),
                        b.assign("total", b.name("t")),
                    ]),
                    b.if_(b.bool(true), b.block(vec![]), None),
                    b.if_(b.call_expr("check", vec![]), b.block(vec![]), None),
                    b.if_(
                        b.name("flag"),
                        b.block(vec![b.block(vec![b.exit()])]),
                        Some(b.block(vec![b.block(vec![])])),
                    ),
                ],
            ),
        ]);

        let program = SimplifyControlFlow.apply(program, &mut cx);

        expect![[r#"
            bit<8> total;
            bool flag;
            function bool check() {
                return true;
            }
            control C() {
                apply {
                    total = 1;
                    {
                        bit<8> t = 2;
                        total = t;
                    }
                    if (check()) {
                    }
                    if (flag) {
                        exit;
                    }
                }
            }
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
    }
}
