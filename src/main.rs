use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use indoc::indoc;
use pktc::{
    diagnostics::Diagnostics,
    fixtures::Fixture,
    ir::pretty_print::print_program,
    middle::midend::{MidEnd, MidEndOutcome},
    options::{CompilerOptions, LangVersion},
};
use strum::IntoEnumIterator;

const LONG_ABOUT: &str = indoc! {"
    Runs the packet compiler mid-end over one of the bundled sample programs.

    The program is simplified, evaluated, inlined and cleaned up. On success
    the final program and its block map are printed; every diagnostic goes to
    stderr. With --dump-dir, snapshots are written after action inlining
    (<fixture>-inline.p4) and at the end of the mid-end (<fixture>-midend.p4).
"};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = LONG_ABOUT)]
pub struct Args {
    /// Sample program to compile, or `list` to show them all
    fixture: String,

    /// Language dialect of the program (p4-14 or p4-16)
    #[arg(long, default_value_t = LangVersion::P4v16)]
    lang_version: LangVersion,

    /// Directory for intermediate program snapshots
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Print a note for every pass that runs
    #[arg(long)]
    trace_passes: bool,

    /// Upper bound on iterations of a repeated pass group
    #[arg(long, default_value_t = CompilerOptions::DEFAULT_MAX_FIXPOINT_ITERATIONS)]
    max_fixpoint_iterations: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.fixture == "list" {
        for fixture in Fixture::iter() {
            println!("{fixture:<20} {}", fixture.description());
        }

        return ExitCode::SUCCESS;
    }

    let Ok(fixture) = args.fixture.parse::<Fixture>() else {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!(
                    "Unknown fixture '{}' (run with `list` to see them all)",
                    args.fixture
                ),
            )
            .exit()
    };

    if args.max_fixpoint_iterations == 0 {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                "--max-fixpoint-iterations must be at least 1",
            )
            .exit()
    }

    let mut options = CompilerOptions::new(format!("{fixture}.p4"));
    options.lang_version = args.lang_version;
    options.dump_dir = args.dump_dir;
    options.trace_passes = args.trace_passes;
    options.max_fixpoint_iterations = args.max_fixpoint_iterations;

    /* Run the mid-end */

    let diagnostics = Diagnostics::new();
    let program = fixture.build(&diagnostics);
    let run = MidEnd::process(&options, program, &diagnostics);

    match &run.outcome {
        MidEndOutcome::Compiled(block_map) => {
            print!("{}", print_program(&run.program));
            println!();
            print!("{block_map}");
        }
        MidEndOutcome::NothingToDo => println!("{fixture}: no main instance, nothing to do"),
        MidEndOutcome::Failed { .. } => {}
    }

    if let Some(summary) = diagnostics.summary() {
        eprintln!("{summary}");
    }

    if run.outcome.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
