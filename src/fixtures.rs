//! Sample programs bundled with the command-line harness. There is no parser,
//! so each one is built directly with the [`IrBuilder`].

use strum::{Display, EnumIter, EnumString};

use crate::{
    diagnostics::Diagnostics,
    ir::{BinaryOperator, Program, Type, build::IrBuilder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Fixture {
    /// Declarations without a `main` instance
    LibraryOnly,
    /// A control calling a void function once
    InlinePipeline,
    /// A function that calls another function twice
    NestedCalls,
    /// An action with an early `return`
    EarlyReturn,
    /// Control-local actions, one applied through a table
    ActionsAndTables,
    /// A program with a type error in its control
    TypeError,
}

impl Fixture {
    pub fn description(self) -> &'static str {
        match self {
            Fixture::LibraryOnly => "declarations without a main instance",
            Fixture::InlinePipeline => "a control calling a void function once",
            Fixture::NestedCalls => "a function that calls another function twice",
            Fixture::EarlyReturn => "an action with an early return",
            Fixture::ActionsAndTables => "control-local actions, one applied through a table",
            Fixture::TypeError => "a program with a type error",
        }
    }

    pub fn build(self, diagnostics: &Diagnostics) -> Program {
        let b = IrBuilder::new(diagnostics);
        let byte = || Type::Bits(8);

        match self {
            Fixture::LibraryOnly => b.program(vec![
                b.action("mark", vec![], vec![]),
                b.control("Ingress", vec![], vec![], vec![b.call("mark", vec![])]),
            ]),
            Fixture::InlinePipeline => b.program(vec![
                b.global_var("total", byte(), None),
                b.function(
                    "bump",
                    Type::Void,
                    vec![b.param("amount", byte())],
                    vec![b.assign(
                        "total",
                        b.binary(BinaryOperator::Add, b.name("total"), b.name("amount")),
                    )],
                ),
                b.control(
                    "Ingress",
                    vec![b.param("port", byte())],
                    vec![],
                    vec![b.call("bump", vec![b.name("port")])],
                ),
                b.package("Pipeline", vec![b.param("ig", Type::Named(b.sym("Ingress")))]),
                b.instance("main", "Pipeline", vec![b.construct("Ingress", vec![])]),
            ]),
            Fixture::NestedCalls => b.program(vec![
                b.global_var("total", byte(), None),
                b.function(
                    "add",
                    Type::Void,
                    vec![b.param("amount", byte())],
                    vec![b.assign(
                        "total",
                        b.binary(BinaryOperator::Add, b.name("total"), b.name("amount")),
                    )],
                ),
                b.function(
                    "twice",
                    Type::Void,
                    vec![b.param("amount", byte())],
                    vec![
                        b.call("add", vec![b.name("amount")]),
                        b.call("add", vec![b.name("amount")]),
                    ],
                ),
                b.control(
                    "Ingress",
                    vec![b.param("port", byte())],
                    vec![],
                    vec![b.call("twice", vec![b.name("port")])],
                ),
                b.instance("main", "Ingress", vec![]),
            ]),
            Fixture::EarlyReturn => b.program(vec![
                b.global_var("hits", byte(), None),
                b.action(
                    "count",
                    vec![b.param("by", byte())],
                    vec![
                        b.if_(
                            b.binary(BinaryOperator::Eq, b.name("by"), b.int(0)),
                            b.block(vec![b.ret()]),
                            None,
                        ),
                        b.assign(
                            "hits",
                            b.binary(BinaryOperator::Add, b.name("hits"), b.name("by")),
                        ),
                    ],
                ),
                b.control(
                    "Ingress",
                    vec![b.param("port", byte())],
                    vec![],
                    vec![b.call("count", vec![b.name("port")])],
                ),
                b.instance("main", "Ingress", vec![]),
            ]),
            Fixture::ActionsAndTables => b.program(vec![
                b.global_var("hits", byte(), None),
                b.control(
                    "Ingress",
                    vec![b.param("port", byte())],
                    vec![
                        b.action("drop", vec![], vec![b.exit()]),
                        b.action(
                            "set_port",
                            vec![b.param("p", byte())],
                            vec![b.assign("hits", b.name("p"))],
                        ),
                        b.table("forward", &["drop", "set_port"], Some("drop")),
                    ],
                    vec![b.apply("forward"), b.call("set_port", vec![b.int_w(7, 8)])],
                ),
                b.package("Pipeline", vec![b.param("ig", Type::Named(b.sym("Ingress")))]),
                b.instance("main", "Pipeline", vec![b.construct("Ingress", vec![])]),
            ]),
            Fixture::TypeError => b.program(vec![
                b.global_var("flag", Type::Bool, None),
                b.control(
                    "Ingress",
                    vec![],
                    vec![],
                    vec![b.assign("flag", b.int_w(3, 8))],
                ),
                b.instance("main", "Ingress", vec![]),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_fixture_builds_without_duplicates() {
        for fixture in Fixture::iter() {
            let diagnostics = Diagnostics::silent();
            let program = fixture.build(&diagnostics);

            assert_eq!(diagnostics.error_count(), 0, "{fixture}");
            program.declarations.check_valid();
        }
    }

    #[test]
    fn fixture_names_are_kebab_case() {
        assert_eq!(Fixture::InlinePipeline.to_string(), "inline-pipeline");
        assert_eq!(
            Fixture::from_str("actions-and-tables").unwrap(),
            Fixture::ActionsAndTables
        );
        assert!(Fixture::from_str("InlinePipeline").is_err());
    }
}
