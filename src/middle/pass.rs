//! Pass composition.
//!
//! A [`Pass`] consumes a program and returns the transformed program. Passes
//! share analysis results (the reference map, the type map, inlining work
//! lists and the block map) through a [`PassContext`] instead of holding
//! references to each other, so any pass can be moved, repeated or dropped
//! from a pipeline without rewiring the others.

use crate::{
    diagnostics::{Diagnostics, report_warning},
    ir::Program,
    middle::{
        passes::{evaluator::BlockMap, inlining::InlineWorkList, type_checker::TypeMap},
        reference_map::ReferenceMap,
    },
    options::CompilerOptions,
};

/// State shared by every pass of one mid-end run
#[derive(Debug)]
pub struct PassContext<'a> {
    pub options: &'a CompilerOptions,
    pub diagnostics: &'a Diagnostics,
    pub ref_map: ReferenceMap,
    pub type_map: TypeMap,
    /// Function call sites chosen for inlining
    pub inline_worklist: InlineWorkList,
    /// Action call sites chosen for inlining
    pub action_worklist: InlineWorkList,
    /// Instantiation tree produced by the most recent evaluation
    pub block_map: Option<BlockMap>,
}

impl<'a> PassContext<'a> {
    pub fn new(options: &'a CompilerOptions, diagnostics: &'a Diagnostics) -> Self {
        Self {
            options,
            diagnostics,
            ref_map: ReferenceMap::new(),
            type_map: TypeMap::default(),
            inline_worklist: InlineWorkList::default(),
            action_worklist: InlineWorkList::default(),
            block_map: None,
        }
    }
}

pub trait Pass {
    fn name(&self) -> &'static str;

    /// Transforms the program. Problems in the input are reported to
    /// `cx.diagnostics`; the pass still returns a program.
    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Succeeded,
    /// `new_errors` errors were recorded while running
    Failed { new_errors: usize },
}

impl PassOutcome {
    fn since(errors_before: usize, diagnostics: &Diagnostics) -> Self {
        match diagnostics.error_count() - errors_before {
            0 => Self::Succeeded,
            new_errors => Self::Failed { new_errors },
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Runs passes in order.
///
/// With stop-on-error set, the first pass that records an error ends the run
/// and the program as it was before that pass is returned. Later passes never
/// see a program a failing pass left behind.
pub struct PassManager {
    name: &'static str,
    passes: Vec<Box<dyn Pass>>,
    stop_on_error: bool,
}

impl PassManager {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            passes: Vec::new(),
            stop_on_error: false,
        }
    }

    pub fn with(mut self, pass: impl Pass + 'static) -> Self {
        self.add_pass(pass);
        self
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn set_stop_on_error(&mut self, stop_on_error: bool) {
        self.stop_on_error = stop_on_error;
    }

    pub fn stopping_on_error(mut self) -> Self {
        self.set_stop_on_error(true);
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn run(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> (Program, PassOutcome) {
        let errors_before = cx.diagnostics.error_count();

        for pass in &mut self.passes {
            if cx.options.trace_passes {
                cx.diagnostics
                    .note(format!("{}: running {}", self.name, pass.name()));
            }

            if !self.stop_on_error {
                program = pass.apply(program, cx);
                continue;
            }

            let pass_errors_before = cx.diagnostics.error_count();
            let checkpoint = program.clone();
            program = pass.apply(program, cx);

            if let PassOutcome::Failed { new_errors } =
                PassOutcome::since(pass_errors_before, cx.diagnostics)
            {
                if cx.options.trace_passes {
                    cx.diagnostics.note(format!(
                        "{}: stopping after {} reported {new_errors} error(s)",
                        self.name,
                        pass.name()
                    ));
                }

                return (
                    checkpoint,
                    PassOutcome::since(errors_before, cx.diagnostics),
                );
            }
        }

        (program, PassOutcome::since(errors_before, cx.diagnostics))
    }
}

impl Pass for PassManager {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        self.run(program, cx).0
    }
}

/// Reruns a group of passes until an iteration leaves the program's size
/// unchanged.
///
/// The group stops on the first error. The iteration bound comes from
/// [`CompilerOptions::max_fixpoint_iterations`] unless overridden; reaching
/// it is reported as a warning and the last program is kept.
pub struct PassRepeated {
    inner: PassManager,
    max_iterations: Option<usize>,
    iterations: usize,
}

impl PassRepeated {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: PassManager::new(name).stopping_on_error(),
            max_iterations: None,
            iterations: 0,
        }
    }

    pub fn with(mut self, pass: impl Pass + 'static) -> Self {
        self.inner.add_pass(pass);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Iterations performed by the most recent run, including the final one
    /// that observed no change
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn run(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> (Program, PassOutcome) {
        let limit = self
            .max_iterations
            .unwrap_or(cx.options.max_fixpoint_iterations);
        self.iterations = 0;

        loop {
            if self.iterations >= limit {
                report_warning!(
                    cx.diagnostics,
                    "{} did not reach a fixpoint after {limit} iterations",
                    self.inner.name()
                );
                return (program, PassOutcome::Succeeded);
            }

            self.iterations += 1;
            let size_before = program.node_count();

            let (next, outcome) = self.inner.run(program, cx);
            program = next;

            if outcome.is_failed() {
                return (program, outcome);
            }

            if program.node_count() == size_before {
                if cx.options.trace_passes {
                    cx.diagnostics.note(format!(
                        "{}: fixpoint after {} iteration(s)",
                        self.inner.name(),
                        self.iterations
                    ));
                }

                return (program, outcome);
            }
        }
    }
}

impl Pass for PassRepeated {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        self.run(program, cx).0
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        diagnostics::report_error,
        intern::InternedSymbol,
        ir::{Type, build::IrBuilder},
    };

    type Log = Rc<RefCell<Vec<&'static str>>>;

    /// Appends a global variable named after itself, optionally reporting an
    /// error afterwards
    struct AddGlobal {
        name: &'static str,
        fails: bool,
        log: Log,
    }

    impl Pass for AddGlobal {
        fn name(&self) -> &'static str {
            self.name
        }

        fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
            self.log.borrow_mut().push(self.name);

            let b = IrBuilder::new(cx.diagnostics);
            program
                .declarations
                .push(b.global_var(self.name, Type::Bool, None), cx.diagnostics);

            if self.fails {
                report_error!(cx.diagnostics, "{} failed", self.name);
            }

            program
        }
    }

    /// Erases one declaration whose name starts with `dead` per run
    struct EraseOneDead;

    impl Pass for EraseOneDead {
        fn name(&self) -> &'static str {
            "erase-one-dead"
        }

        fn apply(&mut self, mut program: Program, _cx: &mut PassContext<'_>) -> Program {
            if let Some(position) = program
                .declarations
                .iter()
                .position(|item| item.name().value().starts_with("dead"))
            {
                program.declarations.erase(position);
            }

            program
        }
    }

    struct Grow {
        added: usize,
    }

    impl Pass for Grow {
        fn name(&self) -> &'static str {
            "grow"
        }

        fn apply(&mut self, mut program: Program, cx: &mut PassContext<'_>) -> Program {
            let b = IrBuilder::new(cx.diagnostics);
            let name = format!("grown_{}", self.added);
            self.added += 1;
            program
                .declarations
                .push(b.global_var(&name, Type::Bool, None), cx.diagnostics);
            program
        }
    }

    fn add(name: &'static str, fails: bool, log: &Log) -> AddGlobal {
        AddGlobal {
            name,
            fails,
            log: log.clone(),
        }
    }

    #[test]
    fn stop_on_error_returns_program_from_before_failing_pass() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let mut cx = PassContext::new(&options, &diagnostics);
        let log = Log::default();

        let mut manager = PassManager::new("gated")
            .with(add("first", false, &log))
            .with(add("second", true, &log))
            .with(add("third", false, &log))
            .stopping_on_error();

        let program = IrBuilder::new(&diagnostics).program(vec![]);
        let (program, outcome) = manager.run(program, &mut cx);

        assert_eq!(outcome, PassOutcome::Failed { new_errors: 1 });
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert!(program
            .declarations
            .get_declaration(InternedSymbol::new("first"))
            .is_some());
        assert!(program
            .declarations
            .get_declaration(InternedSymbol::new("second"))
            .is_none());
    }

    #[test]
    fn without_stop_on_error_every_pass_runs() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let mut cx = PassContext::new(&options, &diagnostics);
        let log = Log::default();

        let mut manager = PassManager::new("ungated")
            .with(add("first", true, &log))
            .with(add("second", false, &log));

        let program = IrBuilder::new(&diagnostics).program(vec![]);
        let (program, outcome) = manager.run(program, &mut cx);

        assert_eq!(outcome, PassOutcome::Failed { new_errors: 1 });
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(program.declarations.len(), 2);
    }

    #[test]
    fn outcome_only_counts_errors_from_this_run() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        report_error!(diagnostics, "from an earlier stage");

        let mut cx = PassContext::new(&options, &diagnostics);
        let log = Log::default();
        let mut manager = PassManager::new("clean")
            .with(add("only", false, &log))
            .stopping_on_error();

        let program = IrBuilder::new(&diagnostics).program(vec![]);
        let (_, outcome) = manager.run(program, &mut cx);

        assert_eq!(outcome, PassOutcome::Succeeded);
        assert_eq!(*log.borrow(), vec!["only"]);
    }

    #[test]
    fn repeated_group_stops_one_iteration_after_last_change() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let mut cx = PassContext::new(&options, &diagnostics);
        let b = IrBuilder::new(&diagnostics);

        let program = b.program(vec![
            b.global_var("dead_a", Type::Bool, None),
            b.global_var("live", Type::Bool, None),
            b.global_var("dead_b", Type::Bool, None),
            b.global_var("dead_c", Type::Bool, None),
        ]);

        let mut repeated = PassRepeated::new("cleanup").with(EraseOneDead);
        let (program, outcome) = repeated.run(program, &mut cx);

        assert_eq!(outcome, PassOutcome::Succeeded);
        assert_eq!(repeated.iterations(), 4);
        assert_eq!(program.declarations.len(), 1);
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[test]
    fn repeated_group_warns_when_bound_is_reached() {
        let options = CompilerOptions::default();
        let diagnostics = Diagnostics::silent();
        let mut cx = PassContext::new(&options, &diagnostics);

        // Growing the program every iteration never converges
        let mut repeated = PassRepeated::new("grows")
            .with(Grow { added: 0 })
            .with_max_iterations(3);

        let program = IrBuilder::new(&diagnostics).program(vec![]);
        let (program, outcome) = repeated.run(program, &mut cx);

        assert_eq!(outcome, PassOutcome::Succeeded);
        assert_eq!(repeated.iterations(), 3);
        assert_eq!(program.declarations.len(), 3);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.error_count(), 0);
    }
}
