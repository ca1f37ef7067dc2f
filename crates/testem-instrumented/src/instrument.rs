//! Instrumentation Invoker

use crate::config::ResolvedConfig;
use crate::error::HarnessResult;
use crate::tools::{run_tool, ToolOutput};
use tracing::{info, warn};

/// Instrument `source_dir` into `instrumented_dir`
///
/// Only one source directory is supported per run. A nonzero exit is
/// returned as [`HarnessError::CommandFailed`](crate::HarnessError::CommandFailed).
pub async fn instrument(config: &ResolvedConfig) -> HarnessResult<ToolOutput> {
    if !config.source_dir.is_dir() {
        warn!(dir = %config.source_dir.display(), "source directory does not exist");
    }

    let output = run_tool(
        &config.instrument_command,
        &[
            ("output", config.instrumented_dir.as_path()),
            ("source", config.source_dir.as_path()),
        ],
        &config.module_root,
        config.tool_timeout,
    )
    .await?;

    info!(
        source = %config.source_dir.display(),
        output = %config.instrumented_dir.display(),
        "Instrumented sources"
    );
    Ok(output)
}
