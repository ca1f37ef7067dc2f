//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// testem-instrumented: collect istanbul coverage from testem browser runs
#[derive(Parser, Debug)]
#[command(name = "testem-instrumented")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./testem-instrumented.yaml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Module root that relative paths resolve against
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Coverage collector port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instrument, run the test runner, and verify the coverage report
    Run(RunArgs),

    /// Instrument and collect coverage until Ctrl+C, then report
    Collect(CollectArgs),

    /// Print or write the derived testem configuration
    Config(ConfigArgs),

    /// Empty the coverage and instrumented directories
    Clean(CleanArgs),

    /// Generate and verify the coverage report
    Report(ReportArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Runner command overriding the configured one (`{config}` is replaced
    /// with the generated configuration path)
    #[arg(last = true, value_name = "RUNNER")]
    pub runner: Vec<String>,
}

/// Arguments for the collect command
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Allow cross-origin posts to the collector
    #[arg(long)]
    pub cors: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Only verify existing report files; do not run the report tool
    #[arg(long)]
    pub verify_only: bool,
}
