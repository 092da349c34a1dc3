//! # mseed-tool
//!
//! Command-line access to the stream utilities and trace listing.
//!
//! ```sh
//! # Keep only data between two times
//! mseed-tool timewindow -e 2010-02-27T06:50:00Z -l 2010-02-27T07:00:00Z < in.mseed > out.mseed
//!
//! # Pass a stream through, printing per-source statistics to stderr
//! mseed-tool stats < in.mseed > /dev/null
//!
//! # List the traces and segments in files
//! mseed-tool list data/*.mseed
//! ```

use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use miniseed_trace::stream::{self, TimeWindow};
use miniseed_trace::time::{self, NsTime, SubSecond, TimeFormat};
use miniseed_trace::{ParseOptions, StreamReader, TraceList, TraceListOptions};

/// miniSEED stream and trace tool
#[derive(Parser)]
#[command(name = "mseed-tool")]
#[command(about = "Streaming miniSEED selection, statistics and trace listing", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read records from stdin, write those within a time window to stdout
    Timewindow {
        /// Earliest time to output
        #[arg(short, long, value_parser = parse_time)]
        earliest: Option<NsTime>,
        /// Latest time to output
        #[arg(short, long, value_parser = parse_time)]
        latest: Option<NsTime>,
    },
    /// Pass records from stdin to stdout, printing statistics to stderr
    Stats,
    /// List traces and segments in files
    List {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Time tolerance in seconds
        #[arg(long)]
        time_tolerance: Option<f64>,
        /// Sample rate tolerance in Hz
        #[arg(long)]
        rate_tolerance: Option<f64>,
        /// Keep publication versions in separate traces
        #[arg(long)]
        split_version: bool,
    },
}

fn parse_time(s: &str) -> std::result::Result<NsTime, String> {
    time::timestr_to_nstime(s).map_err(|_| format!("invalid time string: {s}"))
}

fn timestr(t: NsTime) -> String {
    time::nstime_to_timestr(t, TimeFormat::IsoMonthDayZ, SubSecond::NanoMicroNone)
        .unwrap_or_else(|_| t.to_string())
}

fn stdin_reader() -> StreamReader<BufReader<io::Stdin>> {
    StreamReader::with_options(BufReader::new(io::stdin()), ParseOptions::default())
}

fn timewindow(earliest: Option<NsTime>, latest: Option<NsTime>) -> Result<()> {
    let window = TimeWindow::new(earliest, latest)?;
    eprintln!("Reading miniSEED from stdin, writing to stdout");
    let mut out = BufWriter::new(io::stdout().lock());
    let summary = stream::process_timewindow(stdin_reader(), &mut out, &window)
        .context("processing time window")?;
    eprintln!("Wrote {} records, {} bytes", summary.records, summary.bytes);
    Ok(())
}

fn stats() -> Result<()> {
    eprintln!("Reading miniSEED from stdin, writing to stdout");
    let mut out = BufWriter::new(io::stdout().lock());
    let stats = stream::collect_stats(stdin_reader(), &mut out).context("collecting stats")?;

    let mut err = io::stderr().lock();
    for (sid, s) in &stats {
        let versions: Vec<_> = s.formatversions.iter().map(|v| v.as_u8()).collect();
        writeln!(err, "{sid}:")?;
        writeln!(err, "    record_count: {}", s.record_count)?;
        writeln!(err, "    sample_count: {}", s.sample_count)?;
        writeln!(err, "    bytes: {}", s.bytes)?;
        writeln!(err, "    pubversions: {:?}", s.pubversions)?;
        writeln!(err, "    formatversions: {versions:?}")?;
        writeln!(err, "    earliest: {}", timestr(s.earliest))?;
        writeln!(err, "    latest: {}", timestr(s.latest))?;
    }
    Ok(())
}

fn list(
    files: &[PathBuf],
    time_tolerance: Option<f64>,
    rate_tolerance: Option<f64>,
    split_version: bool,
) -> Result<()> {
    let mut options = TraceListOptions::default().with_split_version(split_version);
    if let Some(seconds) = time_tolerance {
        options = options.with_time_tolerance(seconds);
    }
    if let Some(hz) = rate_tolerance {
        options = options.with_sample_rate_tolerance(hz);
    }

    let mut traces = TraceList::new(options);
    for path in files {
        let records = traces
            .read_file(path)
            .with_context(|| format!("reading {}", path.display()))?;
        tracing::info!(path = %path.display(), records, "read file");
    }
    print!("{traces}");
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Timewindow { earliest, latest } => timewindow(earliest, latest),
        Commands::Stats => stats(),
        Commands::List {
            files,
            time_tolerance,
            rate_tolerance,
            split_version,
        } => list(&files, time_tolerance, rate_tolerance, split_version),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
