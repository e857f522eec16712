//! Application service: backend launch supervision.
//!
//! Starts the backend inside the granted allocation, then waits for the
//! detached watcher's durable signals: the `join_url` key or the `ready`
//! marker. The backend log is scraped as a fallback so a watcher that has not
//! caught up yet does not delay readiness.

use anyhow::{Context, Result};

use crate::application::ports::{Clock, Cluster, ProgressReporter, SessionRecordStore};
use crate::domain::config::BackendConfig;
use crate::domain::endpoint::{REMOTE_LOOPBACK, find_join_url};
use crate::domain::error::SessionError;
use crate::domain::launch::{LaunchPlan, backend_path, render_backend_args};
use crate::domain::retry::{BACKEND_LOG_LINES, JOIN_URL_GRACE_TICKS, PollBudget};
use crate::domain::{Endpoint, JoinUrl, Session, SessionRequest, SessionState, StateKey};

/// What to launch and how long to wait for it.
#[derive(Debug, Clone, Copy)]
pub struct LaunchOptions<'a> {
    pub request: &'a SessionRequest,
    pub backend: &'a BackendConfig,
    pub budget: PollBudget,
}

/// Start the backend on the session's node and wait until it is ready.
///
/// # Errors
///
/// - `SessionError::BackendMissing` if the version directory has no binary.
/// - `SessionError::BackendNotReady` if neither readiness signal appears
///   within the budget (carries launcher and backend log tails).
/// - `SessionError::NoJoinLink` if the port is listening but no join URL
///   shows up within the grace period.
pub async fn start_backend(
    cluster: &impl Cluster,
    clock: &impl Clock,
    records: &impl SessionRecordStore,
    reporter: &impl ProgressReporter,
    session: &mut Session,
    opts: LaunchOptions<'_>,
) -> Result<Endpoint> {
    let LaunchOptions {
        request,
        backend,
        budget,
    } = opts;
    let (Some(node), Some(job_id)) = (session.node.clone(), session.job_id.clone()) else {
        return Err(SessionError::Invariant(format!(
            "backend launch for {} before a node was assigned",
            session.job_name
        ))
        .into());
    };

    let path = backend_path(&backend.install_root, &request.version, &backend.binary);
    reporter.step(&format!("Checking backend {} on {node}...", request.version));
    let present = cluster
        .backend_present(&node, &path)
        .await
        .with_context(|| format!("checking {path} on {node}"))?;
    if !present {
        return Err(SessionError::BackendMissing {
            version: request.version.clone(),
            path,
            node,
        }
        .into());
    }

    let plan = LaunchPlan {
        job_id,
        node: node.clone(),
        image: request.image.clone(),
        backend_path: path,
        backend_args: render_backend_args(&backend.args, request.remote_port),
        port: request.remote_port,
        gpu: request.gpu,
    };
    reporter.step(&format!("Starting backend on {node}..."));
    cluster.launch(&plan).await.context("starting backend")?;
    session.advance(SessionState::BackendStarted)?;
    records
        .save_async(session)
        .await
        .context("saving session record")?;
    tracing::info!(node = %node, port = plan.port, gpu = plan.gpu, "backend launched");

    let join_url = await_ready(cluster, clock, reporter, budget).await?;
    session.join_url = Some(join_url.to_string());
    session.advance(SessionState::BackendReady)?;
    records
        .save_async(session)
        .await
        .context("saving session record")?;
    reporter.success(&format!("Backend ready on {node}:{}", plan.port));

    Ok(Endpoint {
        node,
        host: REMOTE_LOOPBACK.to_string(),
        port: plan.port,
        join_url,
    })
}

/// Poll for a join URL; fall back to the `ready` marker plus a grace period.
async fn await_ready(
    cluster: &impl Cluster,
    clock: &impl Clock,
    reporter: &impl ProgressReporter,
    budget: PollBudget,
) -> Result<JoinUrl> {
    reporter.step("Waiting for backend to become ready...");
    let mut ready_at: Option<u32> = None;

    for tick in 1..=budget.ticks {
        if let Some(url) = poll_join_url(cluster).await {
            tracing::info!(tick, url = %url, "join url captured");
            return Ok(url);
        }

        if ready_at.is_none() && matches!(cluster.poll(StateKey::Ready).await, Ok(Some(_))) {
            tracing::debug!(tick, "ready marker present, waiting for join url");
            ready_at = Some(tick);
        }
        if let Some(since) = ready_at {
            if tick - since >= JOIN_URL_GRACE_TICKS {
                let backend_log = cluster
                    .tail(StateKey::BackendLog, BACKEND_LOG_LINES)
                    .await
                    .unwrap_or_default();
                return Err(SessionError::NoJoinLink { backend_log }.into());
            }
        }

        if tick < budget.ticks {
            clock.sleep(budget.interval).await;
        }
    }

    let launcher_log = cluster
        .tail(StateKey::LauncherLog, BACKEND_LOG_LINES)
        .await
        .unwrap_or_default();
    let backend_log = cluster
        .tail(StateKey::BackendLog, BACKEND_LOG_LINES)
        .await
        .unwrap_or_default();
    Err(SessionError::BackendNotReady {
        ticks: budget.ticks,
        launcher_log,
        backend_log,
    }
    .into())
}

/// The stored `join_url`, or one scraped from the backend log. Both go
/// through the same grammar. A scraped URL is written back so later phases
/// read the same value.
async fn poll_join_url(cluster: &impl Cluster) -> Option<JoinUrl> {
    if let Ok(Some(raw)) = cluster.poll(StateKey::JoinUrl).await {
        match find_join_url(&raw) {
            Some(url) => return Some(url),
            None => tracing::debug!(raw = %raw, "ignoring malformed join_url"),
        }
    }
    let log = cluster
        .tail(StateKey::BackendLog, BACKEND_LOG_LINES)
        .await
        .ok()?;
    let url = find_join_url(&log)?;
    if let Err(e) = cluster.write(StateKey::JoinUrl, &url.to_string()).await {
        tracing::debug!(error = %e, "could not persist scraped join url");
    }
    Some(url)
}
