use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::process;

use anyhow::{Context, Result};
use basic_rs::basic_interpreter::{Interpreter, Outcome};
use basic_rs::basic_io::{InputContext, InputProvider, LineKeyboard, WriterScreen};
use basic_rs::basic_types::{RunStatus, Termination};
use clap::Parser as ClapParser;

#[derive(ClapParser)]
#[command(author, version, about = "TI-99/4A style BASIC interpreter")]
struct Args {
    /// BASIC program file to load and run. Without it, lines are read
    /// interactively from standard input.
    program: Option<String>,

    /// Read INPUT responses from this file instead of standard input
    #[arg(long)]
    input: Option<String>,

    /// Print each line number as it executes
    #[arg(long)]
    trace: bool,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

type Machine = Interpreter<WriterScreen<io::Stdout>, LineKeyboard<Box<dyn BufRead>>>;

fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown log level: {}", level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn keyboard(input: Option<&str>) -> Result<LineKeyboard<Box<dyn BufRead>>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => {
            let file = fs::File::open(path).with_context(|| format!("opening input file {}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };
    Ok(LineKeyboard::new(reader))
}

/// Enters every line of the file, then RUN.
fn run_program(machine: &mut Machine, path: &str) -> Result<i32> {
    let source = fs::read_to_string(path).with_context(|| format!("reading program {}", path))?;
    let lines = source.lines().filter(|line| !line.trim().is_empty());
    if machine.enter_lines(lines) == Outcome::Exit {
        return Ok(0);
    }
    machine.enter("RUN");
    Ok(exit_code(machine.status()))
}

fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Terminated(Termination::Normal) => 0,
        RunStatus::HaltedAtBreakpoint(_) => 2,
        _ => 1,
    }
}

/// The console prompt loop. Ends at BYE or end of input.
fn interactive(machine: &mut Machine) -> Result<i32> {
    loop {
        let prompt = match machine.next_auto_line() {
            Some(line) => format!("{} ", line),
            None => ">".to_string(),
        };
        print!("{}", prompt);
        io::stdout().flush()?;

        let line = match machine.keyboard_mut().provide_input(&InputContext::default()) {
            Ok(line) => line,
            Err(_) => return Ok(0),
        };
        if machine.enter(&line) == Outcome::Exit {
            return Ok(0);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut machine = Interpreter::new(WriterScreen::new(io::stdout()), keyboard(args.input.as_deref())?);
    if args.trace {
        machine.enter("TRACE");
    }

    let code = match &args.program {
        Some(path) => run_program(&mut machine, path)?,
        None => interactive(&mut machine)?,
    };
    process::exit(code);
}
