//! The mid-end driver.
//!
//! A run is two pass pipelines applied one after the other. The first
//! simplifies the program and evaluates it; the second inlines calls, cleans
//! up what inlining leaves behind and evaluates again. Both stop at the first
//! pass that reports an error, and the second only runs when the first
//! succeeded and found a `main` instance.

use core::fmt;

use crate::{
    diagnostics::{Diagnostics, bug},
    ir::Program,
    middle::{
        pass::{Pass, PassContext, PassManager, PassRepeated},
        passes::{
            evaluator::{BlockMap, EvaluatorPass},
            inlining::{
                ActionsInliner, DiscoverActionsInlining, DiscoverInlining, GeneralInliner,
                InlineDriver,
            },
            move_declarations::MoveDeclarations,
            remove_returns::RemoveReturns,
            resolve_references::ResolveReferences,
            simplify_control_flow::SimplifyControlFlow,
            snapshot::ToText,
            type_checker::TypeChecker,
            unique_names::UniqueNames,
            unused_declarations::RemoveUnusedDeclarations,
        },
        reference_map::ReferenceMap,
    },
    options::CompilerOptions,
};

#[derive(Debug)]
pub enum MidEndOutcome {
    /// Both pipelines succeeded; the final evaluation of the program
    Compiled(BlockMap),
    /// The program has no `main` instance. Not an error.
    NothingToDo,
    /// `errors` errors had been reported when the run stopped
    Failed { errors: usize },
}

impl MidEndOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn block_map(&self) -> Option<&BlockMap> {
        match self {
            Self::Compiled(block_map) => Some(block_map),
            _ => None,
        }
    }
}

impl fmt::Display for MidEndOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compiled(_) => write!(f, "compiled"),
            Self::NothingToDo => write!(f, "nothing to do"),
            Self::Failed { errors } => write!(f, "failed with {errors} error(s)"),
        }
    }
}

#[derive(Debug)]
pub struct MidEndRun {
    /// The program as the last successful pass left it
    pub program: Program,
    pub outcome: MidEndOutcome,
    /// Resolutions from the last resolution pass that ran
    pub ref_map: ReferenceMap,
}

pub struct MidEnd;

impl MidEnd {
    /// Name uniquification, declaration hoisting, return lowering and dead
    /// code removal, followed by evaluation
    pub fn simplification(legacy: bool) -> PassManager {
        PassManager::new("simplification")
            .with(UniqueNames::new(legacy))
            .with(MoveDeclarations)
            .with(ResolveReferences::new(legacy))
            .with(RemoveReturns)
            .with(ResolveReferences::new(legacy))
            .with(RemoveUnusedDeclarations)
            .with(EvaluatorPass)
            .stopping_on_error()
    }

    /// Function and action inlining with cleanup, followed by the final
    /// evaluation
    pub fn inlining(legacy: bool) -> PassManager {
        PassManager::new("inlining")
            .with(DiscoverInlining)
            .with(InlineDriver::new(GeneralInliner))
            .with(Self::cleanup("inline-cleanup", legacy))
            .with(ResolveReferences::new(legacy))
            .with(TypeChecker)
            .with(DiscoverActionsInlining)
            .with(InlineDriver::new(ActionsInliner))
            .with(ToText::new("-inline"))
            .with(Self::cleanup("actions-cleanup", legacy))
            .with(SimplifyControlFlow)
            .with(EvaluatorPass)
            .stopping_on_error()
    }

    fn cleanup(name: &'static str, legacy: bool) -> PassRepeated {
        PassRepeated::new(name)
            .with(ResolveReferences::new(legacy))
            .with(RemoveUnusedDeclarations)
    }

    pub fn process(
        options: &CompilerOptions,
        program: Program,
        diagnostics: &Diagnostics,
    ) -> MidEndRun {
        let legacy = options.is_legacy();
        let mut cx = PassContext::new(options, diagnostics);

        /* Simplification */

        let (program, outcome) = Self::simplification(legacy).run(program, &mut cx);
        if outcome.is_failed() || diagnostics.error_count() > 0 {
            return Self::failed(program, cx);
        }

        let Some(block_map) = cx.block_map.take() else {
            bug!("simplification finished without evaluating the program");
        };

        if block_map.main().is_none() {
            if options.trace_passes {
                diagnostics.note("no main instance, skipping inlining");
            }

            return MidEndRun {
                program,
                outcome: MidEndOutcome::NothingToDo,
                ref_map: cx.ref_map,
            };
        }

        cx.block_map = Some(block_map);

        /* Inlining */

        let (program, outcome) = Self::inlining(legacy).run(program, &mut cx);
        if outcome.is_failed() || diagnostics.error_count() > 0 {
            return Self::failed(program, cx);
        }

        let program = ToText::new("-midend").apply(program, &mut cx);

        let Some(block_map) = cx.block_map.take() else {
            bug!("inlining finished without evaluating the program");
        };

        MidEndRun {
            program,
            outcome: MidEndOutcome::Compiled(block_map),
            ref_map: cx.ref_map,
        }
    }

    fn failed(program: Program, cx: PassContext<'_>) -> MidEndRun {
        MidEndRun {
            program,
            outcome: MidEndOutcome::Failed {
                errors: cx.diagnostics.error_count(),
            },
            ref_map: cx.ref_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Type, build::IrBuilder};

    #[test]
    fn pipelines_contain_every_stage() {
        assert_eq!(MidEnd::simplification(false).len(), 7);
        assert_eq!(MidEnd::inlining(false).len(), 11);
    }

    #[test]
    fn library_programs_have_nothing_to_do() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.action("unused", vec![], vec![]),
            b.control("Ingress", vec![], vec![], vec![]),
        ]);

        let run = MidEnd::process(&options, program, &diagnostics);

        assert!(matches!(run.outcome, MidEndOutcome::NothingToDo));
        assert_eq!(run.outcome.to_string(), "nothing to do");
        assert_eq!(run.program.declarations.len(), 1);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn errors_in_simplification_stop_the_run() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.control(
                "Ingress",
                vec![],
                vec![],
                vec![b.assign("missing", b.bool(true))],
            ),
            b.instance("main", "Ingress", vec![]),
        ]);

        let run = MidEnd::process(&options, program, &diagnostics);

        assert!(matches!(run.outcome, MidEndOutcome::Failed { errors: 1 }));
        assert!(run.outcome.block_map().is_none());
        assert!(diagnostics.errors()[0].contains("cannot find declaration for `missing`"));
    }

    #[test]
    fn type_errors_fail_the_inlining_pipeline() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.global_var("flag", Type::Bool, None),
            b.control(
                "Ingress",
                vec![],
                vec![],
                vec![b.assign("flag", b.int_w(3, 8))],
            ),
            b.instance("main", "Ingress", vec![]),
        ]);

        let run = MidEnd::process(&options, program, &diagnostics);

        assert!(run.outcome.is_failed());
        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.errors()[0].contains("type mismatch"));
    }
}
