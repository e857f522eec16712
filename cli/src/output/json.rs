//! JSON output for `--json`.
//!
//! Every command prints exactly one pretty-printed object on stdout. Failures
//! use the error object from [`format_error`].

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::services::cleanup::CleanupReport;
use crate::application::services::session::SessionOutcome;
use crate::application::services::status::{StatusReport, VerifyReport};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": 1
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: i32) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    println!("{out}");
    Ok(())
}

/// Renders results as JSON objects on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_version(version: &str) -> Result<()> {
        print(&serde_json::json!({ "version": version }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_outcome(outcome: &SessionOutcome, detached: bool) -> Result<()> {
        print(&serde_json::json!({
            "link": outcome.link,
            "detached": detached,
            "session": outcome.session,
            "endpoint": outcome.endpoint,
            "tunnel": outcome.tunnel,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_status(report: &StatusReport) -> Result<()> {
        print(report)
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_verify(report: &VerifyReport) -> Result<()> {
        print(&serde_json::json!({
            "verified": report.verified(),
            "ready": report.ready,
            "join_url": report.join_url,
            "tunnel_listening": report.tunnel_listening,
            "link": report.link,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_cleanup(report: &CleanupReport) -> Result<()> {
        print(&serde_json::json!({
            "clean": report.is_clean(),
            "steps": report.steps,
        }))
    }
}
