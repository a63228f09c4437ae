use std::rc::Rc;

use hashbrown::HashMap;

use crate::{
    diagnostics::Diagnostics,
    intern::InternedSymbol,
    ir::{
        Control, IrNode, Item, NodeId, Package, Parameter, PathExpression, Program, Statement,
        fold::Folder,
        visit::{self, Visitor},
    },
    middle::{
        pass::{Pass, PassContext},
        passes::resolve_references::resolve_program,
        reference_map::ReferenceMap,
    },
};

/// Gives every declaration below the top level a name that is unique in the
/// whole program, and rewrites its uses to match.
///
/// Top-level names are the program's interface and are never touched. In
/// the legacy dialect actions and tables are also referenced from outside the
/// program, so they keep their names too unless they hide a top-level name.
///
/// Parameters keep their names unless they hide a declaration from an
/// enclosing scope. Such a parameter would capture the outer name in any body
/// inlined into its callable, so it is renamed like a local.
pub struct UniqueNames {
    legacy: bool,
}

impl UniqueNames {
    pub fn new(legacy: bool) -> Self {
        Self { legacy }
    }
}

impl Pass for UniqueNames {
    fn name(&self) -> &'static str {
        "unique-names"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        let mut ref_map = ReferenceMap::new();
        resolve_program(&program, &mut ref_map, self.legacy, cx.diagnostics);

        let mut finder = LocalDeclarations {
            legacy: self.legacy,
            program: &program,
            control: None,
            found: Vec::new(),
        };
        for item in &program.declarations {
            finder.visit_item(item);
        }

        if finder.found.is_empty() {
            return program;
        }

        // Names are chosen after resolution noted every declared name
        let renames = finder
            .found
            .into_iter()
            .map(|(id, name)| (id, ref_map.new_name(name)))
            .collect();

        let mut renamer = Renamer {
            renames,
            ref_map: &ref_map,
            diagnostics: cx.diagnostics,
        };
        let program = renamer.fold_program(&program);

        // Later passes draw fresh names from the shared map
        for &name in renamer.renames.values() {
            cx.ref_map.note_name(name);
        }

        program
    }
}

/// Collects the declarations to rename, in program order
struct LocalDeclarations<'p> {
    legacy: bool,
    program: &'p Program,
    /// Control whose locals are being visited
    control: Option<Rc<Control>>,
    found: Vec<(NodeId, InternedSymbol)>,
}

impl LocalDeclarations<'_> {
    fn keeps_name(&self, item: &Item) -> bool {
        self.legacy
            && matches!(item, Item::Action(_) | Item::Table(_))
            && self.program.declarations.get_declaration(item.name()).is_none()
    }

    /// Whether `name` is declared at the top level or, inside a control, among
    /// the control's parameters and locals
    fn is_declared_outside(&self, name: InternedSymbol) -> bool {
        self.program.declarations.get_declaration(name).is_some()
            || self.control.as_ref().is_some_and(|control| {
                control.parameters.get_declaration(name).is_some()
                    || control.locals.get_declaration(name).is_some()
            })
    }
}

impl Visitor for LocalDeclarations<'_> {
    fn visit_control(&mut self, control: &Rc<Control>) {
        for parameter in &control.parameters {
            self.visit_parameter(parameter);
        }

        self.control = Some(control.clone());

        for local in &control.locals {
            if !self.keeps_name(local) {
                self.found.push((local.id(), local.name()));
            }

            self.visit_item(local);
        }

        self.visit_block(&control.body);
        self.control = None;
    }

    fn visit_parameter(&mut self, parameter: &Rc<Parameter>) {
        if self.is_declared_outside(parameter.name) {
            self.found.push((parameter.id, parameter.name));
        }
    }

    // Package parameters only name constructor arguments
    fn visit_package(&mut self, _package: &Rc<Package>) {}

    fn visit_statement(&mut self, statement: &Statement) {
        if let Some(declaration) = statement.as_declaration() {
            self.found.push((statement.id(), declaration.name()));
        }

        visit::walk_statement(self, statement)
    }
}

struct Renamer<'r, 'd> {
    renames: HashMap<NodeId, InternedSymbol>,
    ref_map: &'r ReferenceMap,
    diagnostics: &'d Diagnostics,
}

impl Folder for Renamer<'_, '_> {
    fn diagnostics(&self) -> &Diagnostics {
        self.diagnostics
    }

    fn fold_declared_name(&mut self, id: NodeId, name: InternedSymbol) -> InternedSymbol {
        self.renames.get(&id).copied().unwrap_or(name)
    }

    fn fold_path(&mut self, path: &Rc<PathExpression>) -> Rc<PathExpression> {
        let name = self
            .ref_map
            .get_declaration(path.id)
            .and_then(|declaration| self.renames.get(&declaration.id))
            .copied()
            .unwrap_or(path.name);

        Rc::new(PathExpression::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Type, build::IrBuilder, pretty_print::print_program},
        options::{CompilerOptions, LangVersion},
    };

    fn sample(b: &IrBuilder<'_>) -> Program {
        b.program(vec![
            b.global_var("x", Type::Bits(8), None),
            b.control(
                "Ingress",
                vec![b.param("port", Type::Bits(8))],
                vec![
                    b.action("set", vec![], vec![b.assign("x", b.name("port"))]),
                    b.table("t", &["set"], Some("set")),
                ],
                vec![
                    b.var("x", Type::Bits(8), Some(b.int(1))),
                    b.apply("t"),
                    b.block(vec![b.var("x", Type::Bool, None), b.assign("x", b.bool(true))]),
                    b.assign("x", b.int(2)),
                ],
            ),
        ])
    }

    #[test]
    fn renames_locals_and_their_uses() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = UniqueNames::new(false).apply(sample(&b), &mut cx);

        expect_test::expect![[r#"
            bit<8> x;
            control Ingress(bit<8> port) {
                action set_0() {
                    x = port;
                }
                table t_0 {
                    actions = { set_0; }
                    default_action = set_0;
                }
                apply {
                    bit<8> x_0 = 1;
                    t_0();
                    {
                        bool x_1;
                        x_1 = true;
                    }
                    x_0 = 2;
                }
            }
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn legacy_dialect_keeps_action_and_table_names() {
        let mut options = CompilerOptions::default();
        options.lang_version = LangVersion::P4v1;
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = UniqueNames::new(options.is_legacy()).apply(sample(&b), &mut cx);
        let text = print_program(&program);

        assert!(text.contains("action set()"));
        assert!(text.contains("table t {"));
        assert!(text.contains("bit<8> x_0 = 1;"));
    }

    #[test]
    fn parameters_hiding_outer_names_are_renamed() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);
        let mut cx = PassContext::new(&options, &diagnostics);

        let program = b.program(vec![
            b.global_var("total", Type::Bits(8), None),
            b.function(
                "add",
                Type::Void,
                vec![b.param("total", Type::Bits(8)), b.param("amount", Type::Bits(8))],
                vec![b.assign("total", b.name("amount"))],
            ),
            b.control(
                "Ingress",
                vec![b.param("port", Type::Bits(8))],
                vec![b.action(
                    "set",
                    vec![b.param("port", Type::Bits(8))],
                    vec![b.assign("total", b.name("port"))],
                )],
                vec![b.call("set", vec![b.name("port")])],
            ),
        ]);

        let program = UniqueNames::new(false).apply(program, &mut cx);

        expect_test::expect![[r#"
            bit<8> total;
            function void add(bit<8> total_0, bit<8> amount) {
                total_0 = amount;
            }
            control Ingress(bit<8> port) {
                action set_0(bit<8> port_0) {
                    total = port_0;
                }
                apply {
                    set_0(port);
                }
            }
        "#]]
        .assert_eq(&print_program(&program));
        assert_eq!(diagnostics.error_count(), 0);
    }
}
