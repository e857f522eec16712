//! `burrow status`: local record, remote state directory and queue entry.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::status::gather_status;
use crate::commands::PortArgs;

/// Run `burrow status`. Unreachable hosts are shown, not raised.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn run(args: &PortArgs, app: &AppContext) -> Result<ExitCode> {
    let default_port = args.resolve(app).await;
    let report = gather_status(&app.cluster, &app.local, &app.state_mgr, default_port).await;
    app.renderer().render_status(&report)?;
    Ok(ExitCode::SUCCESS)
}
