//! Derived testem configuration
//!
//! The runner serves the pages and proxies `/coverage` to the collector, so
//! browsers post to their own origin.

use crate::config::ResolvedConfig;
use crate::error::HarnessResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Path prefix the runner forwards to the collector
pub const COVERAGE_PROXY_PATH: &str = "/coverage";

/// One proxy rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRule {
    /// Upstream URL
    pub target: String,
}

/// testem configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Absolute source globs
    pub src_files: Vec<String>,
    /// Absolute serve globs
    pub serve_files: Vec<String>,
    /// Absolute test pages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_page: Vec<String>,
    /// Path prefix to upstream mapping
    pub proxies: BTreeMap<String, ProxyRule>,
}

impl RunnerConfig {
    /// Derive the runner configuration, proxying to `port`
    #[must_use]
    pub fn derive(config: &ResolvedConfig, port: u16) -> Self {
        let mut proxies = BTreeMap::new();
        proxies.insert(
            COVERAGE_PROXY_PATH.to_string(),
            ProxyRule {
                target: collector_url(port),
            },
        );

        Self {
            src_files: config.source_files.clone(),
            serve_files: config.serve_files.clone(),
            test_page: config.test_pages.clone(),
            proxies,
        }
    }

    /// Pretty JSON
    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON to `path`, creating parent directories
    pub fn write_to(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        debug!(path = %path.display(), "wrote runner configuration");
        Ok(())
    }
}

/// URL the runner proxies coverage posts to
#[must_use]
pub fn collector_url(port: u16) -> String {
    format!("http://localhost:{port}")
}
