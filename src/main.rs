use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use memdb::capture::{CaptureConfig, Framing};
use memdb::plot::{PlotDimensions, Theme, DEFAULT_LAYOUT_COLUMNS, DEFAULT_ROWS, DEFAULT_USAGE_COLUMNS};
use memdb::session::{interactive, Session};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MEMDB_LOG";

#[derive(Parser, Debug)]
#[command(name = "memdb", about = "Capture and analyse heap operation traces")]
struct Cli {
    /// Capture a heap trace from host[:port].
    #[arg(short, long, value_name = "HOST[:PORT]")]
    capture: Option<String>,
    /// Load a stored heap trace.
    #[arg(short, long, value_name = "PATH")]
    load: Option<String>,
    /// Save the heap trace after all other options ran.
    #[arg(short, long, value_name = "PATH")]
    save: Option<String>,
    /// Diff between two positions in the tracked heap.
    #[arg(short, long, value_name = "FROM..TO")]
    diff: Option<String>,
    /// Print a histogram of allocation sizes.
    #[arg(long)]
    histogram: bool,
    /// Disable power-of-two buckets for the histogram.
    #[arg(long)]
    no_buckets: bool,
    /// Print the heap operation with this sequence number, with backtrace.
    #[arg(short, long, value_name = "SEQ")]
    print: Option<u64>,
    /// Keep only the heap operations in a range.
    #[arg(short, long, value_name = "FROM..TO")]
    truncate: Option<String>,
    /// Run in interactive mode.
    #[arg(short, long)]
    interactive: bool,
    /// Never emit ANSI colours.
    #[arg(long)]
    no_color: bool,
    /// How updates are delimited on the capture socket.
    #[arg(long, value_enum, default_value_t = FramingArg::Legacy)]
    framing: FramingArg,
    /// Abort a capture that has not finished after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plot heap usage over time.
    Plot {
        /// Limit the plot to a range.
        #[arg(short, long)]
        range: Option<String>,
        /// Bar width in characters.
        #[arg(long, default_value_t = DEFAULT_USAGE_COLUMNS)]
        columns: usize,
        /// Maximum number of operation rows.
        #[arg(long, default_value_t = DEFAULT_ROWS)]
        rows: usize,
    },
    /// Plot the address layout of the diff.
    PlotLayout {
        /// Cells per row.
        #[arg(long, default_value_t = DEFAULT_LAYOUT_COLUMNS)]
        columns: usize,
        /// Number of rows.
        #[arg(long, default_value_t = DEFAULT_ROWS)]
        rows: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FramingArg {
    Legacy,
    LengthDelimited,
}

impl From<FramingArg> for Framing {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Legacy => Framing::Legacy,
            FramingArg::LengthDelimited => Framing::LengthDelimited,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut capture = CaptureConfig::default().with_framing(cli.framing.into());
    if let Some(secs) = cli.timeout_secs {
        capture = capture.with_deadline(Duration::from_secs(secs));
    }
    let theme = if cli.no_color {
        Theme::plain()
    } else {
        Theme::for_stdout()
    };
    let mut session = Session::new(capture, theme);

    if let Some(connection) = &cli.capture {
        println!("Capturing heap trace from {connection}...");
        report(session.capture(connection).context("capture failed"))?;
    }
    if let Some(path) = &cli.load {
        println!("Loading tracked heap from {path}...");
        report(session.load(path).with_context(|| format!("failed to load {path}")))?;
    }
    if session.heap().is_none() && !cli.interactive {
        println!("No tracked heap. Closing.");
        return Ok(());
    }

    if session.heap().is_some() {
        run_options(&mut session, &cli)?;
    }

    if cli.interactive {
        let stdin = io::stdin();
        interactive::run(&mut session, stdin.lock(), io::stdout())
            .context("interactive mode failed")?;
    }
    Ok(())
}

fn run_options(session: &mut Session, cli: &Cli) -> Result<()> {
    if cli.histogram {
        report(session.histogram(!cli.no_buckets).context("histogram failed"))?;
    }
    if let Some(spec) = &cli.diff {
        report(session.diff_range(spec).context("diff failed"))?;
    }
    if let Some(seq_no) = cli.print {
        report(session.print(seq_no, true).context("print failed"))?;
    }
    if let Some(spec) = &cli.truncate {
        report(session.truncate(spec).context("truncate failed"))?;
    }

    match &cli.command {
        Some(Commands::Plot {
            range,
            columns,
            rows,
        }) => {
            let dimensions = PlotDimensions::new(*columns, *rows);
            report(session.plot(range.as_deref(), dimensions).context("plot failed"))?;
        }
        Some(Commands::PlotLayout { columns, rows }) => {
            let dimensions = PlotDimensions::new(*columns, *rows);
            report(session.plot_layout(dimensions).context("layout plot failed"))?;
        }
        None => {}
    }

    if let Some(path) = &cli.save {
        println!("Saving tracked heap to {path}...");
        report(session.save(path).with_context(|| format!("failed to save {path}")))?;
    }
    Ok(())
}

fn report(result: Result<String>) -> Result<()> {
    println!("{}", result?);
    Ok(())
}
