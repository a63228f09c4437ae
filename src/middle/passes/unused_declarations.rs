use std::rc::Rc;

use crate::{
    diagnostics::Diagnostics,
    ir::{
        Action, Block, Control, Function, IfStatement, IndexedVec, IrNode, Item, Program,
        Statement,
    },
    middle::{
        pass::{Pass, PassContext},
        reference_map::ReferenceMap,
    },
};

/// Erases declarations that the reference map records no uses for.
///
/// Actions, functions, tables, variables and constants are removed when
/// unused, unless evaluating an initializer could have an effect. Controls,
/// packages, instances and parameters are never removed; they form the
/// program's interface. Removing a declaration can make others unused, so
/// this pass is run together with resolution until nothing changes.
pub struct RemoveUnusedDeclarations;

impl Pass for RemoveUnusedDeclarations {
    fn name(&self) -> &'static str {
        "remove-unused-declarations"
    }

    fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
        let ref_map = &cx.ref_map;
        program.declarations.retain(|item| !is_removable(item, ref_map));

        for position in 0..program.declarations.len() {
            if let Some(cleaned) = clean_item(&program.declarations[position], ref_map, cx.diagnostics)
            {
                program
                    .declarations
                    .replace(position, cleaned, cx.diagnostics);
            }
        }

        program
    }
}

fn is_removable(item: &Item, ref_map: &ReferenceMap) -> bool {
    let removable_kind = match item {
        Item::Action(_) | Item::Function(_) | Item::Table(_) => true,
        Item::Variable(variable) => variable
            .initializer
            .as_ref()
            .is_none_or(|initializer| !initializer.has_calls()),
        Item::Constant(constant) => !constant.value.has_calls(),
        Item::Control(_) | Item::Package(_) | Item::Instance(_) => false,
    };

    removable_kind && !ref_map.is_used(item.id())
}

fn is_removable_statement(statement: &Statement, ref_map: &ReferenceMap) -> bool {
    match statement {
        Statement::Variable(variable) => {
            !ref_map.is_used(variable.id)
                && variable
                    .initializer
                    .as_ref()
                    .is_none_or(|initializer| !initializer.has_calls())
        }
        Statement::Constant(constant) => {
            !ref_map.is_used(constant.id) && !constant.value.has_calls()
        }
        _ => false,
    }
}

/// The item with unused nested declarations removed, or `None` when nothing
/// in it changed
fn clean_item(item: &Item, ref_map: &ReferenceMap, diagnostics: &Diagnostics) -> Option<Item> {
    match item {
        Item::Action(action) => {
            let body = clean_block(&action.body, ref_map, diagnostics)?;
            Some(Item::Action(Rc::new(Action::new(
                action.name,
                action.parameters.clone(),
                body,
            ))))
        }
        Item::Function(function) => {
            let body = clean_block(&function.body, ref_map, diagnostics)?;
            Some(Item::Function(Rc::new(Function::new(
                function.name,
                function.return_type.clone(),
                function.parameters.clone(),
                body,
            ))))
        }
        Item::Control(control) => {
            let mut locals = control.locals.clone();
            let locals_before = locals.len();
            locals.retain(|local| !is_removable(local, ref_map));
            let mut changed = locals.len() != locals_before;

            for position in 0..locals.len() {
                if let Some(cleaned) = clean_item(&locals[position], ref_map, diagnostics) {
                    locals.replace(position, cleaned, diagnostics);
                    changed = true;
                }
            }

            let body = match clean_block(&control.body, ref_map, diagnostics) {
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

/// Unchanged statements are shared with the original block, so their
/// resolutions stay valid
fn clean_block(block: &Block, ref_map: &ReferenceMap, diagnostics: &Diagnostics) -> Option<Rc<Block>> {
    let mut changed = false;
    let mut components = Vec::with_capacity(block.components.len());

    for statement in &block.components {
        if is_removable_statement(statement, ref_map) {
            changed = true;
            continue;
        }

        match clean_statement(statement, ref_map, diagnostics) {
            Some(cleaned) => {
                changed = true;
                components.push(cleaned);
            }
            None => components.push(statement.clone()),
        }
    }

    changed.then(|| Rc::new(Block::new(IndexedVec::from_vec(components, diagnostics))))
}

fn clean_statement(
    statement: &Statement,
    ref_map: &ReferenceMap,
    diagnostics: &Diagnostics,
) -> Option<Statement> {
    match statement {
        Statement::Block(block) => clean_block(block, ref_map, diagnostics).map(Statement::Block),
        Statement::If(if_statement) => {
            let then_branch = clean_statement(&if_statement.then_branch, ref_map, diagnostics);
            let else_branch = if_statement
                .else_branch
                .as_ref()
                .map(|branch| clean_statement(branch, ref_map, diagnostics));

            let else_changed = matches!(else_branch, Some(Some(_)));
            if then_branch.is_none() && !else_changed {
                return None;
            }

            Some(Statement::If(Rc::new(IfStatement::new(
                if_statement.condition.clone(),
                then_branch.unwrap_or_else(|| if_statement.then_branch.clone()),
                if_statement
                    .else_branch
                    .as_ref()
                    .map(|original| match else_branch.flatten() {
                        Some(cleaned) => cleaned,
                        None => original.clone(),
                    }),
            ))))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::{
        ir::{Type, build::IrBuilder, pretty_print::print_program},
        middle::passes::resolve_references::resolve_program,
        options::CompilerOptions,
    };

    #[test]
    fn removes_unused_declarations_but_keeps_interface_and_calls() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.global_const("UNUSED", Type::Bits(8), b.int(1)),
            b.function("next", Type::Bits(8), vec![], vec![b.ret_value(b.int(1))]),
            b.global_var("seeded", Type::Bits(8), Some(b.call_expr("next", vec![]))),
            b.action("orphan", vec![b.param("p", Type::Bool)], vec![]),
            b.control(
                "C",
                vec![b.param("unused_param", Type::Bool)],
                vec![
                    b.action("used", vec![], vec![b.exit()]),
                    b.table("dead_table", &["used"], None),
                    b.global_var("dead_local", Type::Bool, None),
                ],
                vec![
                    b.var("x", Type::Bool, None),
                    b.if_(
                        b.bool(true),
                        b.block(vec![b.var("y", Type::Bool, None), b.call("used", vec![])]),
                        None,
                    ),
                ],
            ),
            b.package("P", vec![b.param("c", Type::Named(b.sym("C")))]),
        ]);

        resolve_program(&program, &mut cx.ref_map, false, &diagnostics);
        let program = RemoveUnusedDeclarations.apply(program, &mut cx);

        expect![[r#"
            function bit<8> next() {
                return 1;
            }
            bit<8> seeded = next();
            control C(bool unused_param) {
                action used() {
                    exit;
                }
                apply {
                    if (true) {
                        used();
                    }
                }
            }
            package P(C c);
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
        program.declarations.check_valid();
    }

    #[test]
    fn unchanged_items_keep_their_identity() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![b.control(
            "C",
            vec![],
            vec![b.action("a", vec![], vec![])],
            vec![b.call("a", vec![])],
        )]);
        let before = program.declarations[0].id();

        resolve_program(&program, &mut cx.ref_map, false, &diagnostics);
        let program = RemoveUnusedDeclarations.apply(program, &mut cx);

        assert_eq!(program.declarations[0].id(), before);
    }
}
