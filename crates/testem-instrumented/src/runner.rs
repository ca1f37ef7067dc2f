//! Runner driver
//!
//! Wraps a complete testem run in the lifecycle hooks: start, runner, exit.
//! The exit hook always runs once the start hook has succeeded, even if the
//! runner fails.

use crate::error::HarnessResult;
use crate::lifecycle::InstrumentedSession;
use crate::tools::{run_inherited, ToolCommand};
use tracing::{error, info};

/// Run `runner` between the start and exit hooks
///
/// The runner configuration is written after the collector is bound so its
/// proxy targets the real port. Errors, in priority order: start failure
/// (runner never launched), runner failure, exit failure.
pub async fn run_instrumented(
    session: &mut InstrumentedSession,
    runner: &ToolCommand,
) -> HarnessResult<()> {
    let addr = session.on_start().await?;
    info!(%addr, "coverage collector ready");

    let config_path = session.config().runner_config_path.clone();
    let cwd = session.config().module_root.clone();

    let runner_result = match session.runner_config().write_to(&config_path) {
        Ok(()) => run_inherited(runner, &[("config", config_path.as_path())], &cwd).await,
        Err(e) => Err(e),
    };
    let exit_result = session.on_exit().await;

    match (runner_result, exit_result) {
        (Err(runner_err), Err(exit_err)) => {
            error!(error = %exit_err, "exit hook failed after runner failure");
            Err(runner_err)
        }
        (Err(runner_err), Ok(())) => Err(runner_err),
        (Ok(()), exit_result) => exit_result,
    }
}
