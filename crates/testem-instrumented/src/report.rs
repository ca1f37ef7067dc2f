//! Coverage report generation and verification
//!
//! The report generator is trusted only as far as the files it leaves
//! behind: a zero exit status is not enough, both artifacts must contain
//! their marker.

use crate::config::ResolvedConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::tools::{run_tool, ToolOutput};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// lcov data file, relative to the coverage directory
pub const LCOV_FILE: &str = "lcov.info";

/// HTML report index, relative to the coverage directory
pub const HTML_INDEX: &str = "lcov-report/index.html";

/// Literal markers that prove a report was generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMarkers {
    /// Expected in `lcov.info`
    pub lcov: String,
    /// Expected in `lcov-report/index.html`
    pub html: String,
}

impl Default for ReportMarkers {
    fn default() -> Self {
        Self {
            lcov: "end_of_record".to_string(),
            html: "src/index.html".to_string(),
        }
    }
}

/// Check both report artifacts for their markers
///
/// A missing or unreadable file counts as a missing marker.
pub fn verify_report(coverage_dir: &Path, markers: &ReportMarkers) -> HarnessResult<()> {
    for (relative, marker) in [(LCOV_FILE, &markers.lcov), (HTML_INDEX, &markers.html)] {
        let path = coverage_dir.join(relative);
        if !file_contains(&path, marker) {
            return Err(HarnessError::report_verification(path, marker.as_str()));
        }
    }
    Ok(())
}

fn file_contains(path: &Path, marker: &str) -> bool {
    let Ok(contents) = std::fs::read(path) else {
        return false;
    };
    let needle = marker.as_bytes();
    needle.is_empty() || contents.windows(needle.len()).any(|window| window == needle)
}

/// Run the report generator, then verify its output
pub async fn generate_report(config: &ResolvedConfig) -> HarnessResult<ToolOutput> {
    let output = run_tool(
        &config.report_command,
        &[("coverage", config.coverage_dir.as_path())],
        &config.module_root,
        config.tool_timeout,
    )
    .await?;

    verify_report(&config.coverage_dir, &config.markers)?;

    info!(dir = %config.coverage_dir.display(), "Coverage reports saved");
    Ok(output)
}
