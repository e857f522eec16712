//! `burrow down`: cancel jobs, clear remote state and close the tunnel.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::commands::PortArgs;

/// Run `burrow down`.
///
/// Cleanup failures are reported as warnings; the command still succeeds so
/// it can be re-run until the session is gone.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn run(args: &PortArgs, app: &AppContext) -> Result<ExitCode> {
    let local_port = args.resolve(app).await;
    let reporter = app.terminal_reporter();
    let report = app.session_env(&reporter).teardown(local_port).await;
    drop(reporter);
    app.renderer().render_cleanup(&report)?;
    Ok(ExitCode::SUCCESS)
}
