use std::rc::Rc;

use crate::{
    diagnostics::Diagnostics,
    intern::InternedSymbol,
    ir::{
        Action, Assignment, Block, Control, Expression, Function, IfStatement, IndexedVec, Item,
        Literal, LiteralValue, NodeId, PathExpression, Program, Statement, Type, UnaryExpression,
        UnaryOperator, Variable,
    },
    middle::{
        pass::{Pass, PassContext},
        reference_map::ReferenceMap,
    },
};

/// Replaces `return;` in actions, void functions and control bodies with a
/// boolean flag.
///
/// A body that returns early gets a fresh `bool hasReturned_N = false;`
/// declaration at its start. Each `return;` becomes `hasReturned_N = true;`
/// and every statement that could run after it is guarded by
/// `if (!hasReturned_N)`. Expects declarations to have been moved to the
/// start of their bodies already.
pub struct RemoveReturns;

impl Pass for RemoveReturns {
    fn name(&self) -> &'static str {
        "remove-returns"
    }

    fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
        for position in 0..program.declarations.len() {
            let item = &program.declarations[position];
            if let Some(lowered) = lower_item(item, &mut cx.ref_map, cx.diagnostics) {
                program
                    .declarations
                    .replace(position, lowered, cx.diagnostics);
            }
        }

        program
    }
}

fn lower_item(item: &Item, names: &mut ReferenceMap, diagnostics: &Diagnostics) -> Option<Item> {
    match item {
        Item::Action(action) => {
            let body = lower_body(&action.body, names, diagnostics)?;
            Some(Item::Action(Rc::new(Action::new(
                action.name,
                action.parameters.clone(),
                body,
            ))))
        }
        Item::Function(function) if function.return_type == Type::Void => {
            let body = lower_body(&function.body, names, diagnostics)?;
            Some(Item::Function(Rc::new(Function::new(
                function.name,
                function.return_type.clone(),
                function.parameters.clone(),
                body,
            ))))
        }
        Item::Control(control) => {
            let mut changed = false;
            let mut locals = IndexedVec::new();

            for local in &control.locals {
                let local = match lower_item(local, names, diagnostics) {
                    Some(lowered) => {
                        changed = true;
                        lowered
                    }
                    None => local.clone(),
                };
                locals.push(local, diagnostics);
            }

            let body = match lower_body(&control.body, names, diagnostics) {
                Some(body) => {
                    changed = true;
                    body
                }
                None => control.body.clone(),
            };

            changed.then(|| {
                Item::Control(Rc::new(Control::new(
                    control.name,
                    control.parameters.clone(),
                    locals,
                    body,
                )))
            })
        }
        _ => None,
    }
}

/// The lowered body, or `None` if it never returns early
fn lower_body(
    body: &Block,
    names: &mut ReferenceMap,
    diagnostics: &Diagnostics,
) -> Option<Rc<Block>> {
    if !body.components.iter().any(may_return) {
        return None;
    }

    let flag = names.new_name(InternedSymbol::new("hasReturned"));
    let lowering = ReturnLowering { flag, diagnostics };

    let mut components = vec![Statement::Variable(Rc::new(Variable::new(
        flag,
        Type::Bool,
        Some(bool_literal(false)),
    )))];
    components.extend(lowering.lower_statements(&body.components));

    Some(Rc::new(Block::new(IndexedVec::from_vec(
        components,
        diagnostics,
    ))))
}

/// Whether executing `statement` may run a `return;`
fn may_return(statement: &Statement) -> bool {
    match statement {
        Statement::Return(return_statement) => return_statement.value.is_none(),
        Statement::Block(block) => block.components.iter().any(may_return),
        Statement::If(if_statement) => {
            may_return(&if_statement.then_branch)
                || if_statement.else_branch.as_ref().is_some_and(may_return)
        }
        _ => false,
    }
}

fn bool_literal(value: bool) -> Expression {
    Expression::Literal(Rc::new(Literal::new(LiteralValue::Bool(value))))
}

struct ReturnLowering<'d> {
    flag: InternedSymbol,
    diagnostics: &'d Diagnostics,
}

impl ReturnLowering<'_> {
    fn flag_path(&self) -> Rc<PathExpression> {
        Rc::new(PathExpression::new(self.flag))
    }

    fn lower_statements(&self, statements: &[Statement]) -> Vec<Statement> {
        let mut lowered = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            lowered.push(self.lower_statement(statement));

            let rest = &statements[index + 1..];
            if may_return(statement) && !rest.is_empty() {
                let guarded = self.lower_statements(rest);
                lowered.push(self.guard(guarded));
                break;
            }
        }

        lowered
    }

    fn lower_statement(&self, statement: &Statement) -> Statement {
        match statement {
            Statement::Return(return_statement) if return_statement.value.is_none() => {
                Statement::Assignment(Rc::new(Assignment::new(
                    self.flag_path(),
                    bool_literal(true),
                )))
            }
            Statement::Block(block) if may_return(statement) => {
                Statement::Block(self.block(self.lower_statements(&block.components)))
            }
            Statement::If(if_statement) if may_return(statement) => {
                Statement::If(Rc::new(IfStatement::new(
                    if_statement.condition.clone(),
                    self.lower_statement(&if_statement.then_branch),
                    if_statement
                        .else_branch
                        .as_ref()
                        .map(|branch| self.lower_statement(branch)),
                )))
            }
            _ => statement.clone(),
        }
    }

    /// `if (!flag) { statements }`
    fn guard(&self, statements: Vec<Statement>) -> Statement {
        let not_returned = Expression::Unary(Rc::new(UnaryExpression {
            id: NodeId::fresh(),
            operator: UnaryOperator::Not,
            operand: Expression::Path(self.flag_path()),
        }));

        Statement::If(Rc::new(IfStatement::new(
            not_returned,
            Statement::Block(self.block(statements)),
            None,
        )))
    }

    fn block(&self, statements: Vec<Statement>) -> Rc<Block> {
        Rc::new(Block::new(IndexedVec::from_vec(statements, self.diagnostics)))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::{
        ir::{BinaryOperator, IrNode, build::IrBuilder, pretty_print::print_program},
        options::CompilerOptions,
    };

    #[test]
    fn guards_statements_after_an_early_return() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.global_var("count", Type::Bits(8), None),
            b.action(
                "a",
                vec![b.param("limit", Type::Bits(8))],
                vec![
                    b.if_(
                        b.binary(BinaryOperator::Gt, b.name("count"), b.name("limit")),
                        b.block(vec![b.ret()]),
                        None,
                    ),
                    b.assign("count", b.int(0)),
                    b.ret(),
                    b.exit(),
                ],
            ),
            b.function("f", Type::Bits(8), vec![], vec![b.ret_value(b.int(1))]),
        ]);

        let program = RemoveReturns.apply(program, &mut cx);

        expect![[r#"
            bit<8> count;
            action a(bit<8> limit) {
                bool hasReturned_0 = false;
                if (count > limit) {
                    hasReturned_0 = true;
                }
                if (!hasReturned_0) {
                    count = 0;
                    hasReturned_0 = true;
                    if (!hasReturned_0) {
                        exit;
                    }
                }
            }
            function bit<8> f() {
                return 1;
            }
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn bodies_without_returns_are_untouched() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![b.control("C", vec![], vec![], vec![b.exit()])]);
        let before = program.declarations[0].id();

        let program = RemoveReturns.apply(program, &mut cx);

        assert_eq!(program.declarations[0].id(), before);
    }

    #[test]
    fn flag_names_do_not_collide_with_declared_names() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);
        cx.ref_map.note_name(b.sym("hasReturned_0"));

        let program = b.program(vec![b.control("C", vec![], vec![], vec![b.ret(), b.exit()])]);
        let program = RemoveReturns.apply(program, &mut cx);

        assert!(print_program(&program).contains("bool hasReturned_1 = false;"));
    }
}
