//! `burrow verify`: confirm the session is usable end to end.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::status::verify;
use crate::commands::PortArgs;

/// Run `burrow verify`. Exits 1 when any check fails.
///
/// # Errors
///
/// Returns an error only if rendering fails.
pub async fn run(args: &PortArgs, app: &AppContext) -> Result<ExitCode> {
    let local_port = args.resolve(app).await;
    let report = verify(&app.cluster, &app.local, local_port).await;
    app.renderer().render_verify(&report)?;
    Ok(if report.verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
