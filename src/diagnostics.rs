//! User-facing diagnostics for a single compilation run.
//!
//! Recoverable problems in the input program (duplicate declarations,
//! unresolved names, type mismatches) are recorded through a [`Diagnostics`]
//! context which every pass receives. Recording never unwinds, so one run can
//! surface many independent errors; pipeline drivers inspect
//! [`Diagnostics::error_count`] at their checkpoints instead.
//!
//! Internal consistency faults are not diagnostics. They abort through
//! [`bug!`](crate::diagnostics::bug) with the offending operation and node.

use std::{
    cell::{Cell, Ref, RefCell},
    io::Write,
};

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A recorded message with terminal escapes removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Accumulates diagnostics for one run. The error count only ever grows;
/// long-lived hosts create a fresh context per run.
pub struct Diagnostics {
    errors: Cell<usize>,
    warnings: Cell<usize>,
    retained: RefCell<Vec<Diagnostic>>,
    sink: RefCell<Option<Box<dyn Write>>>,
}

impl Diagnostics {
    /// Diagnostics printed to stderr as they are recorded
    pub fn new() -> Self {
        Self::with_sink(std::io::stderr())
    }

    pub fn with_sink(sink: impl Write + 'static) -> Self {
        Self {
            errors: Cell::new(0),
            warnings: Cell::new(0),
            retained: RefCell::new(Vec::new()),
            sink: RefCell::new(Some(Box::new(sink))),
        }
    }

    /// Diagnostics that are only retained, never printed
    pub fn silent() -> Self {
        Self {
            errors: Cell::new(0),
            warnings: Cell::new(0),
            retained: RefCell::new(Vec::new()),
            sink: RefCell::new(None),
        }
    }

    pub fn record_error(&self, message: impl core::fmt::Display) {
        self.errors.set(self.errors.get() + 1);
        self.record(Severity::Error, message.to_string());
    }

    pub fn record_warning(&self, message: impl core::fmt::Display) {
        self.warnings.set(self.warnings.get() + 1);
        self.record(Severity::Warning, message.to_string());
    }

    pub fn note(&self, message: impl core::fmt::Display) {
        self.record(Severity::Note, message.to_string());
    }

    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }

    /// Every diagnostic recorded so far, in order
    pub fn messages(&self) -> Ref<'_, [Diagnostic]> {
        Ref::map(self.retained.borrow(), |v| v.as_slice())
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages_with(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages_with(Severity::Warning)
    }

    fn messages_with(&self, severity: Severity) -> Vec<String> {
        self.retained
            .borrow()
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.clone())
            .collect()
    }

    /// A closing line for a failed run, if any error was recorded
    pub fn summary(&self) -> Option<String> {
        match self.error_count() {
            0 => None,
            1 => Some("aborting due to 1 previous error".to_owned()),
            n => Some(format!("aborting due to {n} previous errors")),
        }
    }

    fn record(&self, severity: Severity, message: String) {
        let label = match severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Note => "note".blue().bold(),
        };

        if let Some(sink) = self.sink.borrow_mut().as_mut() {
            // Diagnostics are best effort; a closed stderr must not abort the run
            let _ = writeln!(sink, "{label}: {message}");
        }

        self.retained.borrow_mut().push(Diagnostic {
            severity,
            message: strip_ansi_escapes::strip_str(&message),
        });
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("errors", &self.errors.get())
            .field("warnings", &self.warnings.get())
            .field("retained", &self.retained.borrow())
            .finish_non_exhaustive()
    }
}

/// Expands to the name of the enclosing function
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

macro_rules! with_backtrace {
    ($message:expr) => {{
        let message = $message;

        #[cfg(feature = "error-backtrace")]
        let message = format!(
            "{}\n  {}: {}::{} {}",
            message,
            ::colored::Colorize::blue("backtrace"),
            module_path!(),
            $crate::diagnostics::function!(),
            ::colored::Colorize::white(
                format!("(at {}:{}:{})", file!(), line!(), column!()).as_str()
            )
        );

        message
    }};
}

/// Records a recoverable error: `report_error!(diagnostics, "fmt", args..)`
macro_rules! report_error {
    ($diagnostics:expr, $($arg:tt)+) => {{
        let message = $crate::diagnostics::with_backtrace!(format!($($arg)+));
        $diagnostics.record_error(message)
    }};
}

macro_rules! report_warning {
    ($diagnostics:expr, $($arg:tt)+) => {{
        $diagnostics.record_warning(format!($($arg)+))
    }};
}

/// Aborts on an internal consistency fault. These are compiler bugs, never
/// problems in the input program.
macro_rules! bug {
    ($($arg:tt)+) => {
        panic!("internal compiler error: {}", format!($($arg)+))
    };
}

pub(crate) use {bug, function, report_error, report_warning, with_backtrace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_accumulate_and_warnings_do_not_count() {
        let diagnostics = Diagnostics::silent();

        report_error!(diagnostics, "first {}", 1);
        report_warning!(diagnostics, "just a warning");
        report_error!(diagnostics, "second");

        assert_eq!(diagnostics.error_count(), 2);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.messages().len(), 3);
        assert!(diagnostics.errors()[0].starts_with("first 1"));
        assert_eq!(
            diagnostics.summary().as_deref(),
            Some("aborting due to 2 previous errors")
        );
    }

    #[test]
    fn stored_messages_have_no_escape_codes() {
        let diagnostics = Diagnostics::silent();

        diagnostics.record_error(format!("{} is bad", "x".red()));

        assert_eq!(diagnostics.errors(), vec!["x is bad".to_owned()]);
    }

    #[test]
    #[should_panic(expected = "internal compiler error: pop from empty")]
    fn bug_panics_with_context() {
        bug!("pop from empty {}", "container");
    }
}
