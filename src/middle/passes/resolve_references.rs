//! Name resolution.
//!
//! Every path expression is bound to the declaration it denotes by walking
//! the scope chain from the innermost block outwards: block statements,
//! control locals, the parameters of the enclosing callable, and finally the
//! program's top-level declarations. Lookups go through the declaration
//! index of each container, so a scope is searched in O(1).

use std::rc::Rc;

use hashbrown::HashSet;

use crate::{
    diagnostics::{Diagnostics, report_error, report_warning},
    intern::InternedSymbol,
    ir::{
        Action, Block, Constant, Control, Function, IrNode, Item, NodeId, Package, PathExpression,
        Program, Statement, Variable,
        visit::{self, Visitor},
    },
    middle::{
        pass::{Pass, PassContext},
        reference_map::{ReferenceMap, ResolvedDeclaration},
    },
};

/// Rebuilds the reference map from scratch
pub struct ResolveReferences {
    legacy: bool,
}

impl ResolveReferences {
    pub fn new(legacy: bool) -> Self {
        Self { legacy }
    }
}

impl Pass for ResolveReferences {
    fn name(&self) -> &'static str {
        "resolve-references"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        resolve_program(&program, &mut cx.ref_map, self.legacy, cx.diagnostics);
        program
    }
}

/// Clears `ref_map` and fills it with the resolutions of every use site in
/// `program`. In legacy mode names may be used before their declaration.
pub fn resolve_program(
    program: &Program,
    ref_map: &mut ReferenceMap,
    legacy: bool,
    diagnostics: &Diagnostics,
) {
    ref_map.clear();

    let mut resolver = Resolver {
        program,
        scopes: Vec::new(),
        declared: HashSet::new(),
        ref_map,
        legacy,
        diagnostics,
    };
    resolver.visit_program(program);
}

fn resolved<T: IrNode>(node: &T) -> Option<ResolvedDeclaration> {
    let declaration = node.as_declaration()?;

    Some(ResolvedDeclaration {
        id: node.id(),
        name: declaration.name(),
        kind: node.kind(),
    })
}

/// A nested scope. Scopes hold shared handles to the nodes that own them so
/// the resolver does not borrow from the traversal.
enum Scope {
    Parameters(Item),
    ControlLocals(Rc<Control>),
    Block(Rc<Block>),
}

impl Scope {
    fn lookup(&self, name: InternedSymbol) -> Option<ResolvedDeclaration> {
        match self {
            Scope::Parameters(owner) => owner
                .parameters()
                .and_then(|parameters| parameters.get_declaration(name))
                .and_then(resolved),
            Scope::ControlLocals(control) => {
                control.locals.get_declaration(name).and_then(resolved)
            }
            Scope::Block(block) => block.components.get_declaration(name).and_then(resolved),
        }
    }
}

struct Resolver<'p, 'm, 'd> {
    program: &'p Program,
    /// Innermost scope last; the program scope is implicit
    scopes: Vec<Scope>,
    /// Declarations whose declaration point has been passed
    declared: HashSet<NodeId>,
    ref_map: &'m mut ReferenceMap,
    legacy: bool,
    diagnostics: &'d Diagnostics,
}

impl Resolver<'_, '_, '_> {
    fn declare(&mut self, id: NodeId, name: InternedSymbol) {
        self.declared.insert(id);
        self.ref_map.note_name(name);
    }

    fn is_visible(&self, declaration: &ResolvedDeclaration) -> bool {
        self.legacy || self.declared.contains(&declaration.id)
    }

    /// Finds the declaration `name` denotes from the current scope. A
    /// declaration that is not visible yet is skipped in favour of one in an
    /// enclosing scope; the second value reports whether one was skipped.
    fn lookup(&self, name: InternedSymbol) -> (Option<ResolvedDeclaration>, bool) {
        let mut skipped = false;

        let program_scope = self
            .program
            .declarations
            .get_declaration(name)
            .and_then(resolved);

        for candidate in self
            .scopes
            .iter()
            .rev()
            .map(|scope| scope.lookup(name))
            .chain(std::iter::once(program_scope))
            .flatten()
        {
            if self.is_visible(&candidate) {
                return (Some(candidate), skipped);
            }

            skipped = true;
        }

        (None, skipped)
    }

    /// Warns when a declaration in the innermost scope hides one from an
    /// enclosing scope
    fn check_shadowing(&self, kind: &str, name: InternedSymbol) {
        let enclosing = self
            .scopes
            .iter()
            .rev()
            .skip(1)
            .find_map(|scope| scope.lookup(name))
            .or_else(|| {
                self.program
                    .declarations
                    .get_declaration(name)
                    .and_then(resolved)
            });

        if let Some(shadowed) = enclosing {
            report_warning!(
                self.diagnostics,
                "{kind} `{name}` shadows {} `{name}`",
                shadowed.kind
            );
        }
    }

    fn with_parameters(&mut self, owner: Item, body: impl FnOnce(&mut Self)) {
        self.scopes.push(Scope::Parameters(owner.clone()));

        if let Some(parameters) = owner.parameters() {
            for parameter in parameters {
                self.check_shadowing(&parameter.kind().to_string(), parameter.name);
                self.declare(parameter.id, parameter.name);
            }
        }

        body(self);
        self.scopes.pop();
    }
}

impl Visitor for Resolver<'_, '_, '_> {
    fn visit_program(&mut self, program: &Program) {
        for item in &program.declarations {
            // Top-level names are visible from their own bodies
            self.declare(item.id(), item.name());
            self.visit_item(item);
        }
    }

    fn visit_constant(&mut self, constant: &Rc<Constant>) {
        visit::walk_constant(self, constant);
        self.declare(constant.id, constant.name);
    }

    fn visit_variable(&mut self, variable: &Rc<Variable>) {
        // The initializer cannot see the variable being declared
        visit::walk_variable(self, variable);
        self.declare(variable.id, variable.name);
    }

    fn visit_action(&mut self, action: &Rc<Action>) {
        self.with_parameters(Item::Action(action.clone()), |this| {
            this.visit_block(&action.body)
        });
    }

    fn visit_function(&mut self, function: &Rc<Function>) {
        self.with_parameters(Item::Function(function.clone()), |this| {
            this.visit_block(&function.body)
        });
    }

    fn visit_package(&mut self, package: &Rc<Package>) {
        for parameter in &package.parameters {
            self.declare(parameter.id, parameter.name);
        }
    }

    fn visit_control(&mut self, control: &Rc<Control>) {
        self.with_parameters(Item::Control(control.clone()), |this| {
            this.scopes.push(Scope::ControlLocals(control.clone()));

            for local in &control.locals {
                this.check_shadowing(&local.kind().to_string(), local.name());
                this.declare(local.id(), local.name());
                this.visit_item(local);
            }

            this.visit_block(&control.body);
            this.scopes.pop();
        });
    }

    fn visit_block(&mut self, block: &Rc<Block>) {
        self.scopes.push(Scope::Block(block.clone()));

        for statement in &block.components {
            if let Some(declaration) = statement.as_declaration() {
                self.check_shadowing(&statement.kind().to_string(), declaration.name());
            }

            self.visit_statement(statement);
        }

        self.scopes.pop();
    }

    fn visit_statement(&mut self, statement: &Statement) {
        visit::walk_statement(self, statement)
    }

    fn visit_path(&mut self, path: &Rc<PathExpression>) {
        match self.lookup(path.name) {
            (Some(declaration), _) => self.ref_map.set_declaration(path.id, declaration),
            (None, true) => report_error!(
                self.diagnostics,
                "`{}` is used before its declaration",
                path.name
            ),
            (None, false) => report_error!(
                self.diagnostics,
                "cannot find declaration for `{}`",
                path.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOperator, Type, build::IrBuilder};

    fn resolve(program: &Program, legacy: bool, diagnostics: &Diagnostics) -> ReferenceMap {
        let mut ref_map = ReferenceMap::new();
        resolve_program(program, &mut ref_map, legacy, diagnostics);
        ref_map
    }

    #[test]
    fn resolves_through_nested_scopes() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let global = b.global_const("LIMIT", Type::Bits(8), b.int_w(3, 8));
        let program = b.program(vec![
            global.clone(),
            b.action(
                "a",
                vec![b.param("p", Type::Bits(8))],
                vec![
                    b.var("x", Type::Bits(8), Some(b.name("p"))),
                    b.block(vec![b.assign(
                        "x",
                        b.binary(BinaryOperator::Add, b.name("x"), b.name("LIMIT")),
                    )]),
                ],
            ),
        ]);

        let ref_map = resolve(&program, false, &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(ref_map.resolution_count(), 4);
        assert_eq!(ref_map.use_count(global.id()), 1);
        assert_eq!(ref_map.uses_of_name(b.sym("x")), 2);
        assert_eq!(ref_map.uses_of_name(b.sym("p")), 1);
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let outer = b.global_var("x", Type::Bool, None);
        let inner = b.var("x", Type::Bool, None);
        let program = b.program(vec![
            outer.clone(),
            b.action(
                "a",
                vec![],
                vec![inner.clone(), b.assign("x", b.bool(true))],
            ),
        ]);

        let ref_map = resolve(&program, false, &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.warnings()[0].contains("shadows"));
        assert_eq!(ref_map.use_count(inner.id()), 1);
        assert!(!ref_map.is_used(outer.id()));
    }

    #[test]
    fn use_before_declaration_depends_on_dialect() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![b.action(
            "a",
            vec![],
            vec![
                b.assign("later", b.bool(true)),
                b.var("later", Type::Bool, None),
            ],
        )]);

        resolve(&program, false, &diagnostics);
        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].contains("used before its declaration"));

        let legacy_diagnostics = Diagnostics::silent();
        let ref_map = resolve(&program, true, &legacy_diagnostics);
        assert_eq!(legacy_diagnostics.error_count(), 0);
        assert_eq!(ref_map.uses_of_name(b.sym("later")), 1);
    }

    #[test]
    fn unknown_names_are_errors() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![b.action("a", vec![], vec![b.call("missing", vec![])])]);
        resolve(&program, false, &diagnostics);

        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].starts_with("cannot find declaration for `missing`"));
    }

    #[test]
    fn control_locals_and_parameters_are_in_scope() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![b.control(
            "Ingress",
            vec![b.param("port", Type::Bits(9))],
            vec![
                b.action("drop", vec![], vec![b.exit()]),
                b.table("forward", &["drop"], Some("drop")),
            ],
            vec![b.if_(
                b.binary(BinaryOperator::Eq, b.name("port"), b.int(0)),
                b.block(vec![b.apply("forward")]),
                None,
            )],
        )]);

        let ref_map = resolve(&program, false, &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(ref_map.uses_of_name(b.sym("drop")), 2);
        assert_eq!(ref_map.uses_of_name(b.sym("forward")), 1);
        assert_eq!(ref_map.uses_of_name(b.sym("port")), 1);
    }

    #[test]
    fn parameters_hiding_outer_declarations_are_warned_about() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.global_var("total", Type::Bits(8), None),
            b.control(
                "Ingress",
                vec![b.param("total", Type::Bits(8))],
                vec![],
                vec![b.assign("total", b.int(1))],
            ),
        ]);

        let ref_map = resolve(&program, false, &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.warnings()[0].starts_with("parameter `total` shadows variable `total`"));
        assert!(!ref_map.is_used(program.declarations[0].id()));
    }
}
