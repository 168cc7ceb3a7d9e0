//! autopar Command Line Interface
//!
//! Usage:
//!   autopar [OPTIONS] <case-file>
//!   autopar --help
//!
//! Examples:
//!   autopar scatter.json                          # Analyze every loop
//!   autopar --loop 2 --no-aliasing gemm.json      # One loop, assume no aliasing
//!   autopar --unique-indirect-index scatter.json  # Trust index[i] to be unique
//!   autopar --format json -o reports.json gemm.json

use autopar::case::AnalysisCase;
use autopar::ir::{print_program, LoopId};
use autopar::analysis::LoopReport;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::fs;
use anyhow::{Result, Context};
use log::{info, debug};

/// autopar - Loop parallelization legality and autoscoping
#[derive(Parser, Debug)]
#[command(name = "autopar")]
#[command(author = "autopar Contributors")]
#[command(version)]
#[command(about = "Decides which loops can run in parallel and how their variables are scoped", long_about = None)]
struct Cli {
    /// Case file to analyze (JSON)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Analyze only this loop (by loop id)
    #[arg(long = "loop", value_name = "ID")]
    loop_id: Option<u32>,

    /// Assume arrays and pointers never alias
    #[arg(long)]
    no_aliasing: bool,

    /// Treat indirect indices `x[index[i]]` as unique per iteration
    #[arg(long)]
    unique_indirect_index: bool,

    /// Trace autoscoping and dependence elimination (use with -vv)
    #[arg(long)]
    debug_trace: bool,

    /// Report format
    #[arg(long, default_value = "text")]
    format: ReportFormat,

    /// Print the program model before the reports
    #[arg(long)]
    dump: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    /// Human-readable reports
    Text,
    /// JSON array of reports
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("autopar v{}", autopar::VERSION);
    debug!("Case file: {:?}", cli.input);

    let mut case = AnalysisCase::load(&cli.input)?;
    apply_flags(&cli, &mut case);
    debug!("Analysis config: {:?}", case.config);

    let dump = cli.dump.then(|| print_program(&case.program));

    info!("Analyzing {}...", case.program.name);
    let reports = case
        .run(cli.loop_id.map(LoopId))
        .with_context(|| format!("Analysis of {:?} failed", cli.input))?;
    let parallel = reports.iter().filter(|r| r.is_parallelizable()).count();
    info!("{} of {} loops are parallelizable", parallel, reports.len());

    let mut output = String::new();
    if let Some(dump) = dump {
        output.push_str(&dump);
        output.push('\n');
    }
    output.push_str(&render(&reports, cli.format)?);
    write_output(&cli.output, &output)
}

/// Command line flags switch analysis options on; they never switch off
/// what the case file enables.
fn apply_flags(cli: &Cli, case: &mut AnalysisCase) {
    if cli.no_aliasing {
        case.config.assume_no_aliasing = true;
    }
    if cli.unique_indirect_index {
        case.config.enable_indirect_index_uniqueness = true;
    }
    if cli.debug_trace {
        case.config.enable_debug_trace = true;
    }
}

fn render(reports: &[LoopReport], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(reports.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n")),
        ReportFormat::Json => serde_json::to_string_pretty(reports).context("Failed to serialize reports"),
    }
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
