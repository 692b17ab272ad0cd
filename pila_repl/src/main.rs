use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use codesnake::{Block, CodeWidth, Label, LineIndex};
use pila::{CompileErrors, GcConfig, InterpretError, Vm, VmConfig};
use rustyline::error::ReadlineError;
use yansi::Paint;

/// Runs a pila script, or starts an interactive session without one.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// script to run
    file: Option<PathBuf>,
    /// print every instruction and the stack while running
    #[arg(long)]
    trace: bool,
    /// print the bytecode of everything compiled
    #[arg(long)]
    print_code: bool,
    /// report every collection
    #[arg(long)]
    log_gc: bool,
    /// collect before every allocation
    #[arg(long)]
    stress_gc: bool,
    /// instructions allowed per script or line
    #[arg(long, value_name = "N")]
    fuel: Option<i32>,
    /// bytes allocated before the first collection
    #[arg(long, value_name = "BYTES")]
    gc_threshold: Option<usize>,
}

impl Args {
    fn config(&self) -> VmConfig {
        let defaults = GcConfig::default();
        VmConfig {
            fuel: self.fuel,
            trace_execution: self.trace,
            print_code: self.print_code,
            log_gc: self.log_gc,
            gc: GcConfig {
                initial_threshold: self.gc_threshold.unwrap_or(defaults.initial_threshold),
                stress: self.stress_gc,
                ..defaults
            },
            ..Default::default()
        }
    }
}

/// Points at the offending source of every compile error that has a span.
fn render_errors(name: &str, source: &str, errors: &CompileErrors) {
    let idx = LineIndex::new(source);
    let labels = errors
        .iter()
        .filter(|error| !error.span.is_empty())
        .map(|error| {
            Label::new(error.span.clone())
                .with_text(error.kind.to_string().red().to_string())
                .with_style(|s| s.red().to_string())
        });
    let Some(block) = Block::new(&idx, labels) else {
        return;
    };
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    eprintln!("{}[{name}]", block.prologue());
    eprint!("{block}");
    eprintln!("{}", block.epilogue());
}

fn run_file(args: &Args, path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("{}: could not read {}: {error}", "error".red(), path.display());
            return ExitCode::from(74);
        }
    };
    let mut vm = Vm::new(args.config());
    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretError::Compile(errors)) => {
            render_errors(&path.display().to_string(), &source, &errors);
            ExitCode::from(65)
        }
        Err(InterpretError::Runtime(_)) => ExitCode::from(70),
    }
}

fn repl(args: &Args) -> anyhow::Result<()> {
    let mut readline = rustyline::DefaultEditor::new()?;
    // globals and leftover stack values carry over from line to line
    let mut vm = Vm::new(args.config());

    loop {
        let input = match readline.readline(">> ") {
            Ok(input) => input,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        };
        if input.trim().is_empty() {
            continue;
        }
        _ = readline.add_history_entry(input.as_str());

        match vm.interpret(&input) {
            Err(InterpretError::Compile(errors)) => render_errors("repl", &input, &errors),
            // already reported on the error port
            Err(InterpretError::Runtime(_)) | Ok(()) => {}
        }
        println!();
    }

    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    match &args.file {
        Some(path) => Ok(run_file(&args, path)),
        None => {
            repl(&args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
