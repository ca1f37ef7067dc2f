//! Error types for instrumented runs

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while instrumenting, collecting, or reporting
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// External tool could not be launched
    #[error("Failed to execute `{command}`: {source}")]
    Spawn {
        /// Command line that was attempted
        command: String,
        /// Underlying launch failure
        #[source]
        source: std::io::Error,
    },

    /// External tool exited with a nonzero status
    #[error("`{command}` failed with exit code {code}:\n{output}")]
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit code (-1 when terminated by a signal)
        code: i32,
        /// Captured stdout followed by stderr
        output: String,
    },

    /// External tool did not finish within the configured timeout
    #[error("`{command}` timed out after {seconds}s")]
    Timeout {
        /// Command line that was run
        command: String,
        /// Timeout in seconds
        seconds: u64,
    },

    /// Collector could not bind its listener
    #[error("Failed to bind coverage collector on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying bind failure
        #[source]
        source: std::io::Error,
    },

    /// Exit hook called without a running collector
    #[error("Cannot shutdown server because it does not exist.")]
    NoServer,

    /// Start hook called while a collector is already running
    #[error("Coverage collector is already running on {addr}")]
    AlreadyRunning {
        /// Address of the running collector
        addr: SocketAddr,
    },

    /// Report tool succeeded but its output lacks an expected marker
    #[error("Unable to generate coverage report: `{marker}` not found in {}", .path.display())]
    ReportVerification {
        /// File that was inspected
        path: PathBuf,
        /// Marker that was expected
        marker: String,
    },

    /// Test runner exited with a nonzero status
    #[error("Test runner `{command}` failed with exit code {code}")]
    RunnerFailed {
        /// Command line that was run
        command: String,
        /// Exit code (-1 when terminated by a signal)
        code: i32,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error
    #[error("Invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a report verification error
    #[must_use]
    pub fn report_verification(path: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self::ReportVerification {
            path: path.into(),
            marker: marker.into(),
        }
    }

    /// Exit code of the failed external process, if this error carries one
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } | Self::RunnerFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
