//! Lifecycle hooks
//!
//! [`InstrumentedSession`] owns the collector between the start and exit
//! hooks. The handle is moved in by [`on_start`](InstrumentedSession::on_start)
//! and moved out by [`on_exit`](InstrumentedSession::on_exit), so at most one
//! collector exists per session.

use crate::collector::{CollectorConfig, CollectorHandle, CoverageCollector};
use crate::config::ResolvedConfig;
use crate::dirs::clean_dirs;
use crate::error::{HarnessError, HarnessResult};
use crate::instrument::instrument;
use crate::report::generate_report;
use crate::runner_config::RunnerConfig;
use std::net::SocketAddr;
use tracing::{info, warn};

/// One instrumented test run
#[derive(Debug)]
pub struct InstrumentedSession {
    config: ResolvedConfig,
    collector: Option<CollectorHandle>,
}

impl InstrumentedSession {
    /// Create a session; nothing runs until [`on_start`](Self::on_start)
    #[must_use]
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            collector: None,
        }
    }

    /// Resolved configuration
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// True while a collector is running
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collector.is_some()
    }

    /// Address of the running collector
    #[must_use]
    pub fn collector_addr(&self) -> Option<SocketAddr> {
        self.collector.as_ref().map(CollectorHandle::local_addr)
    }

    /// Runner configuration proxying to the running collector, or to the
    /// configured port when none is running
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let port = self
            .collector
            .as_ref()
            .map_or(self.config.coverage_port, CollectorHandle::port);
        RunnerConfig::derive(&self.config, port)
    }

    /// Start hook: clean, instrument, start collecting
    ///
    /// If instrumentation fails the collector is never started.
    pub async fn on_start(&mut self) -> HarnessResult<SocketAddr> {
        if let Some(addr) = self.collector_addr() {
            return Err(HarnessError::AlreadyRunning { addr });
        }

        let dirs: Vec<_> = self
            .config
            .working_dirs()
            .iter()
            .map(|d| d.to_path_buf())
            .collect();
        let report = tokio::task::spawn_blocking(move || clean_dirs(&dirs))
            .await
            .map_err(task_failure)?;
        for failure in &report.failures {
            warn!(
                path = %failure.path.display(),
                error = %failure.error,
                "continuing despite cleanup failure"
            );
        }

        match self.config.matched_source_files() {
            Ok(files) if files.is_empty() => {
                warn!(patterns = ?self.config.source_files, "source globs match no files");
            }
            Ok(files) => info!(count = files.len(), "source files matched"),
            Err(e) => warn!(error = %e, "could not expand source globs"),
        }

        instrument(&self.config).await?;

        let handle = CoverageCollector::new(
            CollectorConfig::new(self.config.coverage_dir.clone(), self.config.coverage_port)
                .cors(self.config.cors)
                .shutdown_grace(self.config.shutdown_grace),
        )
        .start()
        .await?;

        let addr = handle.local_addr();
        self.collector = Some(handle);
        Ok(addr)
    }

    /// Exit hook: stop collecting, generate and verify the report
    ///
    /// Fails with [`HarnessError::NoServer`] and does nothing else when no
    /// collector is running.
    pub async fn on_exit(&mut self) -> HarnessResult<()> {
        let handle = self.collector.take().ok_or(HarnessError::NoServer)?;
        let fragments = handle.close().await?;
        if fragments == 0 {
            warn!("no coverage fragments were received");
        }

        generate_report(&self.config).await?;
        Ok(())
    }
}

fn task_failure(error: tokio::task::JoinError) -> HarnessError {
    HarnessError::Io(std::io::Error::other(error))
}
