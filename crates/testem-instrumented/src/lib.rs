//! testem-instrumented: code coverage for testem runs
//!
//! Instruments sources with istanbul, collects the coverage objects that
//! browsers post back during the run, and verifies the generated report.
//!
//! ## Lifecycle
//!
//! ```text
//! on_start:  clean coverage/ + instrumented/ -> instrument -> bind collector
//! (runner):  browsers POST coverage through the /coverage proxy
//! on_exit:   close collector -> istanbul report -> verify lcov + html
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod collector;
mod commands;
pub mod config;
pub mod dirs;
mod error;
pub mod instrument;
pub mod lifecycle;
pub mod report;
pub mod runner;
pub mod runner_config;
pub mod tools;

pub use collector::{CollectorConfig, CollectorHandle, CoverageCollector};
pub use commands::{Cli, CleanArgs, CollectArgs, Commands, ConfigArgs, ReportArgs, RunArgs};
pub use config::{ResolvedConfig, RunConfig, DEFAULT_CONFIG_FILE, DEFAULT_COVERAGE_PORT};
pub use dirs::{clean_dirs, CleanFailure, CleanReport};
pub use error::{HarnessError, HarnessResult};
pub use lifecycle::InstrumentedSession;
pub use report::{generate_report, verify_report, ReportMarkers};
pub use runner::run_instrumented;
pub use runner_config::{ProxyRule, RunnerConfig, COVERAGE_PROXY_PATH};
pub use tools::{ToolCommand, ToolOutput};
