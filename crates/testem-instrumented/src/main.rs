//! testem-instrumented CLI
//!
//! ## Usage
//!
//! ```bash
//! testem-instrumented run                         # instrument, testem ci, report
//! testem-instrumented run -- testem ci -l Chrome  # custom runner command
//! testem-instrumented collect --cors              # collect until Ctrl+C
//! testem-instrumented config -o testem.json       # write testem config only
//! ```

use clap::Parser;
use std::process::ExitCode;
use testem_instrumented::{
    clean_dirs, generate_report, run_instrumented, verify_report, Cli, Commands, HarnessError,
    HarnessResult, InstrumentedSession, RunConfig, ToolCommand,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> HarnessResult<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(&cli)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| HarnessError::config(format!("Failed to create runtime: {e}")))?;
    rt.block_on(dispatch(cli.command, config))
}

/// `RUST_LOG` wins; otherwise `-q`/`-v` pick the level
fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("testem_instrumented={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> HarnessResult<RunConfig> {
    let cwd = std::env::current_dir()?;
    let mut config = RunConfig::discover(cli.config.as_deref(), &cwd)?;
    if let Some(ref root) = cli.root {
        config = config.with_module_root(root.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_coverage_port(port);
    }
    Ok(config)
}

async fn dispatch(command: Commands, config: RunConfig) -> HarnessResult<()> {
    match command {
        Commands::Run(args) => {
            let resolved = config.resolve()?;
            let runner = if args.runner.is_empty() {
                resolved.runner_command.clone()
            } else {
                ToolCommand::from_argv(&args.runner)?
            };
            let mut session = InstrumentedSession::new(resolved);
            run_instrumented(&mut session, &runner).await?;
            println!(
                "Coverage reports saved to {}",
                session.config().coverage_dir.display()
            );
            Ok(())
        }
        Commands::Collect(args) => {
            let cors = config.cors || args.cors;
            let mut session = InstrumentedSession::new(config.with_cors(cors).resolve()?);
            let addr = session.on_start().await?;
            println!(
                "Collecting coverage on http://localhost:{} (Ctrl+C to stop)",
                addr.port()
            );

            tokio::signal::ctrl_c().await?;
            println!("Stopping collector...");

            session.on_exit().await?;
            println!(
                "Coverage reports saved to {}",
                session.config().coverage_dir.display()
            );
            Ok(())
        }
        Commands::Config(args) => {
            let session = InstrumentedSession::new(config.resolve()?);
            let runner_config = session.runner_config();
            match args.output {
                Some(path) => {
                    runner_config.write_to(&path)?;
                    println!("Runner configuration written to {}", path.display());
                }
                None => println!("{}", runner_config.to_json()?),
            }
            Ok(())
        }
        Commands::Clean(_) => {
            let resolved = config.resolve()?;
            let report = clean_dirs(&resolved.working_dirs()).into_result()?;
            for dir in report.created.iter().chain(&report.cleared) {
                println!("Cleaned {}", dir.display());
            }
            Ok(())
        }
        Commands::Report(args) => {
            let resolved = config.resolve()?;
            if args.verify_only {
                verify_report(&resolved.coverage_dir, &resolved.markers)?;
            } else {
                generate_report(&resolved).await?;
            }
            println!(
                "Coverage reports saved to {}",
                resolved.coverage_dir.display()
            );
            Ok(())
        }
    }
}
