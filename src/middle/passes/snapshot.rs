use std::io::Write;

use crate::{
    diagnostics::report_warning,
    ir::{Program, pretty_print::print_program},
    middle::pass::{Pass, PassContext},
};

/// Writes the program as text into the dump directory, named after the
/// compiled file and `suffix`. Does nothing when dumping is disabled.
pub struct ToText {
    suffix: &'static str,
}

impl ToText {
    pub fn new(suffix: &'static str) -> Self {
        Self { suffix }
    }
}

impl Pass for ToText {
    fn name(&self) -> &'static str {
        "to-text"
    }

    fn apply(&mut self, program: Program, cx: &mut PassContext<'_>) -> Program {
        let (Some(path), Some(stream)) = (
            cx.options.dump_path(self.suffix),
            cx.options.dump_stream(self.suffix),
        ) else {
            return program;
        };

        let written = stream.and_then(|mut file| file.write_all(print_program(&program).as_bytes()));

        match written {
            Ok(()) => {
                if cx.options.trace_passes {
                    cx.diagnostics.note(format!("wrote {}", path.display()));
                }
            }
            Err(error) => report_warning!(
                cx.diagnostics,
                "cannot write snapshot {}: {error}",
                path.display()
            ),
        }

        program
    }
}
