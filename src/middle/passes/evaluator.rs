//! Evaluation of the program's instantiation tree.
//!
//! Starting from the top-level `main` instance, constructor arguments are
//! followed into packages and controls, and instances declared among a
//! control's locals are instantiated in turn. The result, a [`BlockMap`], is
//! what backends consume. A program without `main` is a library and evaluates
//! to a map with no root.

use core::fmt;

use hashbrown::HashSet;
use itertools::Itertools;

use crate::{
    diagnostics::{Diagnostics, report_error},
    index::{IndexVec, simple_index},
    intern::InternedSymbol,
    ir::{Expression, IrNode, Item, NodeKind, PathExpression, Program, Type},
    middle::pass::{Pass, PassContext},
};

simple_index! {
    pub struct InstanceId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BlockKind {
    Package,
    Control,
}

#[derive(Debug, Clone)]
pub struct BlockInstance {
    /// Dotted path from `main`, e.g. `main.ig.acl`
    pub path: String,
    pub type_name: InternedSymbol,
    pub kind: BlockKind,
    pub children: Vec<InstanceId>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockMap {
    /// Kind and name of every top-level declaration
    pub globals: Vec<(NodeKind, InternedSymbol)>,
    pub instances: IndexVec<InstanceId, BlockInstance>,
    main: Option<InstanceId>,
}

impl BlockMap {
    /// The instance evaluated from the `main` declaration
    pub fn main(&self) -> Option<&BlockInstance> {
        self.main.and_then(|id| self.instances.get(id))
    }

    pub fn main_id(&self) -> Option<InstanceId> {
        self.main
    }

    pub fn get(&self, id: InstanceId) -> Option<&BlockInstance> {
        self.instances.get(id)
    }

    /// Type names of every control that is instantiated somewhere
    pub fn instantiated_controls(&self) -> HashSet<InternedSymbol> {
        self.instances
            .iter()
            .filter(|instance| instance.kind == BlockKind::Control)
            .map(|instance| instance.type_name)
            .collect()
    }

    fn fmt_instance(&self, f: &mut fmt::Formatter<'_>, id: InstanceId, depth: usize) -> fmt::Result {
        let Some(instance) = self.instances.get(id) else {
            return Ok(());
        };

        writeln!(
            f,
            "{:indent$}{} {}: {}",
            "",
            instance.kind,
            instance.path,
            instance.type_name,
            indent = depth * 2
        )?;

        for &child in &instance.children {
            self.fmt_instance(f, child, depth + 1)?;
        }

        Ok(())
    }
}

impl fmt::Display for BlockMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "globals: {}",
            self.globals
                .iter()
                .map(|(kind, name)| format!("{kind} {name}"))
                .join(", ")
        )?;

        match self.main {
            Some(main) => self.fmt_instance(f, main, 0),
            None => writeln!(f, "no main instance"),
        }
    }
}

/// Stores a fresh [`BlockMap`] in the pass context. Never changes the program.
pub struct EvaluatorPass;

impl Pass for EvaluatorPass {
    fn name(&self) -> &'static str {
        "evaluator"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        cx.block_map = Some(evaluate(&program, cx.diagnostics));
        program
    }
}

pub fn evaluate(program: &Program, diagnostics: &Diagnostics) -> BlockMap {
    let mut evaluator = Evaluator {
        program,
        diagnostics,
        map: BlockMap::default(),
        in_progress: Vec::new(),
    };

    evaluator.map.globals = program
        .declarations
        .declarations()
        .map(|item| (item.kind(), item.name()))
        .collect();

    if let Some(main) = program.main() {
        evaluator.map.main =
            evaluator.instantiate(main.name.to_string(), &main.type_name, &main.arguments);
    }

    evaluator.map
}

struct Evaluator<'p, 'd> {
    program: &'p Program,
    diagnostics: &'d Diagnostics,
    map: BlockMap,
    /// Types currently being instantiated, outermost first
    in_progress: Vec<InternedSymbol>,
}

impl Evaluator<'_, '_> {
    fn instantiate(
        &mut self,
        path: String,
        type_name: &PathExpression,
        arguments: &[Expression],
    ) -> Option<InstanceId> {
        let name = type_name.name;
        let program = self.program;

        let Some(declaration) = program.declarations.get_declaration(name) else {
            report_error!(self.diagnostics, "cannot instantiate unknown type `{name}`");
            return None;
        };

        if self.in_progress.contains(&name) {
            report_error!(
                self.diagnostics,
                "`{name}` instantiates itself (through {})",
                self.in_progress.iter().join(" -> ")
            );
            return None;
        }

        self.in_progress.push(name);
        let instance = match declaration {
            Item::Package(package) => {
                if arguments.len() != package.parameters.len() {
                    report_error!(
                        self.diagnostics,
                        "package `{name}` expects {} constructor argument(s) but {path} supplies {}",
                        package.parameters.len(),
                        arguments.len()
                    );
                    None
                } else {
                    let id = self.push(&path, name, BlockKind::Package);
                    let mut children = Vec::new();

                    for (parameter, argument) in package.parameters.iter().zip(arguments) {
                        let child_path = format!("{path}.{}", parameter.name);

                        let Expression::Constructor(constructor) = argument else {
                            report_error!(
                                self.diagnostics,
                                "argument `{}` of `{name}` must be a constructor call",
                                parameter.name
                            );
                            continue;
                        };

                        if let Type::Named(expected) = parameter.ty {
                            if expected != constructor.type_name.name {
                                report_error!(
                                    self.diagnostics,
                                    "argument `{}` of `{name}` expects `{expected}` but `{}` is constructed",
                                    parameter.name,
                                    constructor.type_name.name
                                );
                                continue;
                            }
                        }

                        children.extend(self.instantiate(
                            child_path,
                            &constructor.type_name,
                            &constructor.arguments,
                        ));
                    }

                    self.set_children(id, children);
                    Some(id)
                }
            }
            Item::Control(control) => {
                if !arguments.is_empty() {
                    report_error!(
                        self.diagnostics,
                        "control `{name}` takes no constructor arguments but {path} supplies {}",
                        arguments.len()
                    );
                    None
                } else {
                    let id = self.push(&path, name, BlockKind::Control);
                    let mut children = Vec::new();

                    for local in &control.locals {
                        if let Item::Instance(instance) = local {
                            children.extend(self.instantiate(
                                format!("{path}.{}", instance.name),
                                &instance.type_name,
                                &instance.arguments,
                            ));
                        }
                    }

                    self.set_children(id, children);
                    Some(id)
                }
            }
            other => {
                report_error!(
                    self.diagnostics,
                    "`{name}` is a {} and cannot be instantiated",
                    other.kind()
                );
                None
            }
        };
        self.in_progress.pop();

        instance
    }

    fn push(&mut self, path: &str, type_name: InternedSymbol, kind: BlockKind) -> InstanceId {
        self.map.instances.push(BlockInstance {
            path: path.to_owned(),
            type_name,
            kind,
            children: Vec::new(),
        })
    }

    fn set_children(&mut self, id: InstanceId, children: Vec<InstanceId>) {
        if let Some(instance) = self.map.instances.get_mut(id) {
            instance.children = children;
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::ir::build::IrBuilder;

    fn pipeline_package(b: &IrBuilder<'_>) -> Item {
        b.package(
            "Pipeline",
            vec![
                b.param("ig", Type::Named(b.sym("Ingress"))),
                b.param("eg", Type::Named(b.sym("Egress"))),
            ],
        )
    }

    #[test]
    fn evaluates_packages_controls_and_nested_instances() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.control("Acl", vec![], vec![], vec![]),
            b.control(
                "Ingress",
                vec![],
                vec![b.instance("acl", "Acl", vec![])],
                vec![b.apply("acl")],
            ),
            b.control("Egress", vec![], vec![], vec![]),
            pipeline_package(&b),
            b.instance(
                "main",
                "Pipeline",
                vec![b.construct("Ingress", vec![]), b.construct("Egress", vec![])],
            ),
        ]);

        let map = evaluate(&program, &diagnostics);

        assert_eq!(diagnostics.error_count(), 0);
        assert_eq!(map.main().map(|m| m.kind), Some(BlockKind::Package));
        assert_eq!(map.instantiated_controls().len(), 3);
        expect![[r#"
            globals: control Acl, control Ingress, control Egress, package Pipeline, instance main
            package main: Pipeline
              control main.ig: Ingress
                control main.ig.acl: Acl
              control main.eg: Egress
        "#]]
        .assert_eq(&map.to_string());
    }

    #[test]
    fn library_has_no_main() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![b.control("Ingress", vec![], vec![], vec![])]);
        let map = evaluate(&program, &diagnostics);

        assert!(map.main().is_none());
        assert!(map.instances.is_empty());
        assert_eq!(map.globals, vec![(NodeKind::Control, b.sym("Ingress"))]);
    }

    #[test]
    fn bad_constructor_arguments_are_errors() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.control("Ingress", vec![], vec![], vec![]),
            b.control("Egress", vec![], vec![], vec![]),
            pipeline_package(&b),
            b.instance(
                "main",
                "Pipeline",
                vec![b.construct("Egress", vec![]), b.int(3)],
            ),
        ]);

        let map = evaluate(&program, &diagnostics);

        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.errors()[0].contains("expects `Ingress` but `Egress` is constructed"));
        assert!(diagnostics.errors()[1].contains("must be a constructor call"));
        assert!(map.main().is_some_and(|main| main.children.is_empty()));
    }

    #[test]
    fn self_instantiation_is_an_error() {
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.control("Loop", vec![], vec![b.instance("inner", "Loop", vec![])], vec![]),
            b.instance("main", "Loop", vec![]),
        ]);

        evaluate(&program, &diagnostics);

        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].contains("instantiates itself"));
    }
}
