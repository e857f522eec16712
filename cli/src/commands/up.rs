//! `burrow up`: bring a session up and hold it until Ctrl-C.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::PreferenceStore;
use crate::application::services::allocation::fresh_job_name;
use crate::application::services::session::Budgets;
use crate::domain::SessionRequest;
use crate::domain::prefs::{Preferences, parse_flag};
use crate::infra::signals::cancel_on_signal;

/// Arguments for the up command. Unset values are prompted for, with the
/// saved preferences as defaults.
#[derive(Args, Default)]
pub struct UpArgs {
    /// Wall-clock duration in hours
    #[arg(long)]
    pub hours: Option<u32>,

    /// Partition, or `any` to let the scheduler choose
    #[arg(long)]
    pub partition: Option<String>,

    /// CPU cores
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory in GiB
    #[arg(long)]
    pub ram: Option<u32>,

    /// Request a GPU (yes/no)
    #[arg(long, value_parser = parse_gpu)]
    pub gpu: Option<bool>,

    /// Port the backend listens on, on the node
    #[arg(long)]
    pub remote_port: Option<u16>,

    /// Local tunnel port
    #[arg(long)]
    pub local_port: Option<u16>,

    /// Container image path on the cluster
    #[arg(long)]
    pub image: Option<String>,

    /// Backend version to launch
    #[arg(id = "backend_version", long = "backend-version")]
    pub version: Option<String>,

    /// Leave the session running and exit after printing the link
    #[arg(long)]
    pub detach: bool,
}

fn parse_gpu(value: &str) -> Result<bool, String> {
    parse_flag("gpu", value).map_err(|e| e.to_string())
}

impl UpArgs {
    /// Whether any request field was left for a prompt.
    #[must_use]
    pub fn needs_prompt(&self) -> bool {
        self.hours.is_none()
            || self.partition.is_none()
            || self.cpus.is_none()
            || self.ram.is_none()
            || self.gpu.is_none()
            || self.remote_port.is_none()
            || self.local_port.is_none()
            || self.image.is_none()
            || self.version.is_none()
    }

    /// Copy every value given on the command line onto `request`.
    pub fn overlay(&self, request: &mut SessionRequest) {
        if let Some(v) = self.hours {
            request.hours = v;
        }
        if let Some(v) = &self.partition {
            request.partition.clone_from(v);
        }
        if let Some(v) = self.cpus {
            request.cpus = v;
        }
        if let Some(v) = self.ram {
            request.ram_gb = v;
        }
        if let Some(v) = self.gpu {
            request.gpu = v;
        }
        if let Some(v) = self.remote_port {
            request.remote_port = v;
        }
        if let Some(v) = self.local_port {
            request.local_port = v;
        }
        if let Some(v) = &self.image {
            request.image.clone_from(v);
        }
        if let Some(v) = &self.version {
            request.version.clone_from(v);
        }
    }
}

/// Defaults, then config, then saved preferences, then flags.
fn base_request(args: &UpArgs, image: &str, prefs: &Preferences) -> (SessionRequest, Option<String>) {
    let mut request = SessionRequest {
        image: image.to_string(),
        ..SessionRequest::default()
    };
    let mut ignored = None;
    let mut with_prefs = request.clone();
    match prefs.apply(&mut with_prefs) {
        Ok(()) => request = with_prefs,
        Err(e) => ignored = Some(e.to_string()),
    }
    args.overlay(&mut request);
    (request, ignored)
}

fn prompt_missing(args: &UpArgs, app: &AppContext, request: &mut SessionRequest) -> Result<()> {
    if args.hours.is_none() {
        request.hours = app.input("Hours", request.hours)?;
    }
    if args.partition.is_none() {
        request.partition = app.input("Partition", request.partition.clone())?;
    }
    if args.cpus.is_none() {
        request.cpus = app.input("CPUs", request.cpus)?;
    }
    if args.ram.is_none() {
        request.ram_gb = app.input("Memory (GiB)", request.ram_gb)?;
    }
    if args.gpu.is_none() {
        request.gpu = app.confirm("Request a GPU?", request.gpu)?;
    }
    if args.remote_port.is_none() {
        request.remote_port = app.input("Remote port", request.remote_port)?;
    }
    if args.local_port.is_none() {
        request.local_port = app.input("Local port", request.local_port)?;
    }
    if args.image.is_none() {
        request.image = app.input("Container image", request.image.clone())?;
    }
    if args.version.is_none() {
        request.version = app.input("Backend version", request.version.clone())?;
    }
    Ok(())
}

/// Run `burrow up`.
///
/// # Errors
///
/// Returns `SessionError::NoInteractiveInput` if a prompt is needed without a
/// terminal, or the failing stage's error after cleanup has run.
pub async fn run(args: &UpArgs, app: &AppContext) -> Result<ExitCode> {
    if args.needs_prompt() {
        app.ensure_can_prompt()?;
    }

    let prefs = app.cluster.load().await.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "no saved preferences");
        Preferences::default()
    });
    let (mut request, ignored) = base_request(args, &app.config.backend.image, &prefs);
    if let Some(reason) = ignored {
        app.output.warn(&format!("Ignoring saved preferences: {reason}"));
    }
    prompt_missing(args, app, &mut request)?;

    let cancel = cancel_on_signal();
    let reporter = app.terminal_reporter();
    let env = app.session_env(&reporter);
    let outcome = env
        .run(
            &app.config,
            &request,
            fresh_job_name(),
            Budgets::default(),
            &cancel,
        )
        .await?;
    let rendered = app.renderer().render_outcome(&outcome, args.detach);
    if let Err(e) = &rendered {
        tracing::warn!(error = %e, "could not render session summary");
        app.output.warn(&format!("Could not show the session summary: {e:#}"));
    }

    match after_up(rendered.is_ok(), args.detach) {
        AfterUp::Detach => Ok(ExitCode::SUCCESS),
        AfterUp::Hold => {
            let report = env.hold(request.local_port, &cancel).await;
            app.renderer().render_cleanup(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        AfterUp::TearDown => {
            let report = env.teardown(request.local_port).await;
            app.renderer().render_cleanup(&report)?;
            rendered.map(|()| ExitCode::SUCCESS)
        }
    }
}

/// What happens to an established session once its summary was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterUp {
    /// Stay in the foreground until Ctrl-C, then tear down.
    Hold,
    /// Leave the session running and exit.
    Detach,
    /// Nobody saw the link and nothing would own the session.
    TearDown,
}

fn after_up(rendered: bool, detach: bool) -> AfterUp {
    match (rendered, detach) {
        (_, false) => AfterUp::Hold,
        (true, true) => AfterUp::Detach,
        (false, true) => AfterUp::TearDown,
    }
}
