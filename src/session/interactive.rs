//! Line-oriented interactive mode
//!
//! Each input line is a verb followed by space separated arguments. Errors are
//! reported and the loop continues; `quit` or end of input ends it.

use std::io::{self, BufRead, Write};

use super::{Session, SessionError};
use crate::plot::{PlotDimensions, DEFAULT_LAYOUT_COLUMNS, DEFAULT_ROWS, DEFAULT_USAGE_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Quit,
    Load,
    Save,
    Print,
    Plot,
    PlotLayout,
    Diff,
    Histogram,
    Truncate,
    Help,
}

struct Command {
    name: &'static str,
    short_name: &'static str,
    help: &'static str,
    verb: Verb,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "quit",
        short_name: "q",
        help: "Quit application",
        verb: Verb::Quit,
    },
    Command {
        name: "load",
        short_name: "l",
        help: "Load tracked heap [file name]",
        verb: Verb::Load,
    },
    Command {
        name: "save",
        short_name: "s",
        help: "Save tracked heap [file name]",
        verb: Verb::Save,
    },
    Command {
        name: "print",
        short_name: "p",
        help: "Print heap operation [sequence number] ?[bt | backtrace]",
        verb: Verb::Print,
    },
    Command {
        name: "plot",
        short_name: "plot",
        help: "Plot heap memory usage ?[range-spec] ?[columns] ?[rows]",
        verb: Verb::Plot,
    },
    Command {
        name: "plot-layout",
        short_name: "plot-layout",
        help: "Plot heap memory layout of the last diff ?[columns] ?[rows]",
        verb: Verb::PlotLayout,
    },
    Command {
        name: "diff",
        short_name: "d",
        help: "Diff between two pre-operation states of the heap [from..to]",
        verb: Verb::Diff,
    },
    Command {
        name: "histogram",
        short_name: "hist",
        help: "Print histogram of allocations by size ?[no-buckets | nb]",
        verb: Verb::Histogram,
    },
    Command {
        name: "truncate",
        short_name: "t",
        help: "Keep only the heap operations in a range [from..to]",
        verb: Verb::Truncate,
    },
    Command {
        name: "help",
        short_name: "h",
        help: "Usage information",
        verb: Verb::Help,
    },
];

fn required<'a>(args: &[&'a str], position: usize, name: &'static str) -> Result<&'a str, SessionError> {
    args.get(position)
        .copied()
        .ok_or(SessionError::MissingArgument { name, position })
}

fn integer<T: std::str::FromStr>(
    arg: &str,
    position: usize,
    name: &'static str,
) -> Result<T, SessionError> {
    arg.parse()
        .map_err(|_| SessionError::InvalidInteger { name, position })
}

fn optional_integer<T: std::str::FromStr>(
    args: &[&str],
    position: usize,
    name: &'static str,
    default: T,
) -> Result<T, SessionError> {
    match args.get(position) {
        Some(arg) => integer(arg, position, name),
        None => Ok(default),
    }
}

fn usage() -> String {
    let mut text = String::from("Usage:");
    for command in COMMANDS {
        text.push_str(&format!(
            "\n{}, {} -> {}",
            command.name, command.short_name, command.help
        ));
    }
    text
}

/// What the loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading; show the text unless it is empty.
    Continue(String),
    /// Leave the loop.
    Quit,
}

/// Run one input line against `session`.
pub fn execute(session: &mut Session, line: &str) -> Result<Outcome, SessionError> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(&name) = args.first() else {
        return Ok(Outcome::Continue(String::new()));
    };
    let Some(command) = COMMANDS
        .iter()
        .find(|c| c.name == name || c.short_name == name)
    else {
        return Ok(Outcome::Continue(format!("Unknown command: {name}")));
    };

    let text = match command.verb {
        Verb::Quit => return Ok(Outcome::Quit),
        Verb::Help => usage(),
        Verb::Load => session.load(required(&args, 1, "file-path")?)?,
        Verb::Save => session.save(required(&args, 1, "file-path")?)?,
        Verb::Print => {
            let seq_no = integer(
                required(&args, 1, "heap-operation-sequence-number")?,
                1,
                "heap-operation-sequence-number",
            )?;
            let backtrace = matches!(args.get(2), Some(&"bt" | &"backtrace"));
            session.print(seq_no, backtrace)?
        }
        Verb::Plot => {
            let dimensions = PlotDimensions::new(
                optional_integer(&args, 2, "columns", DEFAULT_USAGE_COLUMNS)?,
                optional_integer(&args, 3, "rows", DEFAULT_ROWS)?,
            );
            session.plot(args.get(1).copied(), dimensions)?
        }
        Verb::PlotLayout => {
            let dimensions = PlotDimensions::new(
                optional_integer(&args, 1, "columns", DEFAULT_LAYOUT_COLUMNS)?,
                optional_integer(&args, 2, "rows", DEFAULT_ROWS)?,
            );
            session.plot_layout(dimensions)?
        }
        Verb::Diff => session.diff_range(required(&args, 1, "diff-spec")?)?,
        Verb::Histogram => {
            let use_buckets = !matches!(args.get(1), Some(&"no-buckets" | &"nb"));
            session.histogram(use_buckets)?
        }
        Verb::Truncate => session.truncate(required(&args, 1, "range-spec")?)?,
    };
    Ok(Outcome::Continue(text))
}

/// Read commands from `input` until `quit` or end of input.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session,
    mut input: R,
    mut output: W,
) -> io::Result<()> {
    writeln!(output, "Interactive mode:")?;
    writeln!(output, "type h<enter> for help")?;
    let mut line = String::new();
    loop {
        write!(output, "> ")?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        match execute(session, &line) {
            Ok(Outcome::Quit) => return Ok(()),
            Ok(Outcome::Continue(text)) if text.is_empty() => {}
            Ok(Outcome::Continue(text)) => writeln!(output, "{text}")?,
            Err(e) => writeln!(output, "Invalid command. {e}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapOperation, TrackedHeap};

    fn session() -> Session {
        let heap = TrackedHeap::builder()
            .add_operation(HeapOperation::alloc(1, 16))
            .add_operation(HeapOperation::alloc(64, 17))
            .build();
        Session::default().with_heap(heap)
    }

    #[test]
    fn short_and_long_names_match() {
        let mut session = session();
        let long = execute(&mut session, "histogram").unwrap();
        let short = execute(&mut session, "hist").unwrap();
        assert_eq!(long, short);
    }

    #[test]
    fn unknown_and_blank_lines() {
        let mut session = session();
        assert_eq!(
            execute(&mut session, "frobnicate 1").unwrap(),
            Outcome::Continue("Unknown command: frobnicate".to_string())
        );
        assert_eq!(
            execute(&mut session, "   ").unwrap(),
            Outcome::Continue(String::new())
        );
        assert_eq!(execute(&mut session, "q").unwrap(), Outcome::Quit);
    }

    #[test]
    fn argument_errors() {
        let mut session = session();
        assert!(matches!(
            execute(&mut session, "print"),
            Err(SessionError::MissingArgument { position: 1, .. })
        ));
        assert!(matches!(
            execute(&mut session, "p one"),
            Err(SessionError::InvalidInteger { position: 1, .. })
        ));
    }

    #[test]
    fn loop_reports_errors_and_stops_on_quit() {
        let mut session = session();
        let input = b"d 0..9\nhist nb\nquit\nhelp\n";
        let mut output = Vec::new();
        run(&mut session, &input[..], &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Invalid command. invalid range spec 0..9"));
        assert!(output.contains("        17\t1"));
        assert!(!output.contains("Usage:"));
    }
}
