//! Application service: allocation request and node polling.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::application::ports::{
    Clock, ProgressReporter, Scheduler, SessionRecordStore, SessionStore,
};
use crate::domain::error::SessionError;
use crate::domain::retry::{ALLOCATION_LOG_LINES, PollBudget};
use crate::domain::scheduler::{first_node, marker_matches, parse_granted_job_id, qualify_node};
use crate::domain::{JobName, Session, SessionRequest, StateKey};

/// A job name unique to this invocation: wall-clock seconds, process id and
/// a random suffix.
#[must_use]
pub fn fresh_job_name() -> JobName {
    JobName::new(Utc::now().timestamp(), std::process::id(), rand::random())
}

/// Submit the allocation and return the new session record.
///
/// The job name is persisted locally before anything touches the cluster.
/// A failed remote write or submission is reported but not fatal: the
/// poller decides whether the job ever reached the queue.
///
/// # Errors
///
/// Returns an error only if the local session record cannot be written.
pub async fn submit(
    cluster: &(impl Scheduler + SessionStore),
    records: &impl SessionRecordStore,
    reporter: &impl ProgressReporter,
    request: &SessionRequest,
    job_name: JobName,
) -> Result<Session> {
    let session = Session::submitted(job_name, request);
    records
        .save_async(&session)
        .await
        .context("saving session record")?;

    if let Err(e) = cluster.write(StateKey::JobName, session.job_name.as_str()).await {
        tracing::warn!(error = %e, "could not record job name remotely");
        reporter.warn(&format!("Could not record job name remotely: {e}"));
    }

    reporter.step(&format!("Requesting allocation {}...", session.job_name));
    match cluster.submit(request, &session.job_name).await {
        Ok(()) => tracing::info!(job = %session.job_name, "allocation submitted"),
        Err(e) => {
            tracing::warn!(job = %session.job_name, error = %e, "submission failed");
            reporter.warn(&format!("Submission reported an error, polling anyway: {e}"));
        }
    }
    Ok(session)
}

/// Polling parameters for [`await_node`].
#[derive(Debug, Clone, Copy)]
pub struct PollOptions<'a> {
    pub budget: PollBudget,
    pub domain_suffix: &'a str,
}

/// Poll until the scheduler assigns a node, returning its qualified name.
///
/// A failed or empty queue query keeps the last observed state; the loop
/// ends the moment a node name is known and the job id is confirmed.
///
/// # Errors
///
/// `SessionError::NoNodeAssigned` when the budget runs out, or
/// `SessionError::JobVanished` when the job never appeared in the queue.
/// Both carry the tail of `salloc.out`.
pub async fn await_node(
    cluster: &(impl Scheduler + SessionStore),
    clock: &impl Clock,
    records: &impl SessionRecordStore,
    reporter: &impl ProgressReporter,
    session: &mut Session,
    opts: PollOptions<'_>,
) -> Result<String> {
    let mut last_label = String::new();

    for tick in 1..=opts.budget.ticks {
        let marker = cluster.poll(StateKey::Node).await.unwrap_or_else(|e| {
            tracing::debug!(tick, error = %e, "node marker read failed");
            None
        });

        let status = match cluster.query(&session.job_name).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(tick, error = %e, "queue query failed, keeping last state");
                None
            }
        };
        session.observe(status.as_ref());

        let marker_node = marker.as_deref().and_then(first_node).filter(|node| {
            let current = marker_matches(node, status.as_ref());
            if !current {
                tracing::debug!(tick, node = %node, "node marker disagrees with queue, ignoring");
            }
            current
        });
        let node = marker_node.or_else(|| status.as_ref().and_then(|s| first_node(&s.nodes)));

        if let Some(node) = node {
            if session.job_id.is_none() {
                confirm_job_id(cluster, session).await;
            }
            if session.job_id.is_some() {
                let node = qualify_node(&node, opts.domain_suffix);
                session.assign_node(&node)?;
                records
                    .save_async(session)
                    .await
                    .context("saving session record")?;
                tracing::info!(tick, node = %node, job_id = ?session.job_id, "node assigned");
                reporter.success(&format!("Allocated node {node}"));
                return Ok(node);
            }
            tracing::debug!(tick, node = %node, "node known but job id not confirmed yet");
        }

        let label = session.status_label();
        if label != last_label {
            reporter.step(&format!("Waiting for allocation: {label}"));
            last_label = label;
        }

        if tick < opts.budget.ticks {
            clock.sleep(opts.budget.interval).await;
        }
    }

    let log = cluster
        .tail(StateKey::SallocOut, ALLOCATION_LOG_LINES)
        .await
        .unwrap_or_default();

    if session.job_id.is_none() && session.observed.is_none() {
        return Err(SessionError::JobVanished {
            job_name: session.job_name.to_string(),
            log,
        }
        .into());
    }
    Err(SessionError::NoNodeAssigned {
        ticks: opts.budget.ticks,
        last_state: session.status_label(),
        log,
    }
    .into())
}

/// Recover the job id from the `job_id` marker or the scheduler log when the
/// queue query has not reported it.
async fn confirm_job_id(cluster: &impl SessionStore, session: &mut Session) {
    if let Ok(Some(id)) = cluster.poll(StateKey::JobId).await {
        if session.record_job_id(&id) {
            return;
        }
    }
    if let Ok(log) = cluster.tail(StateKey::SallocOut, ALLOCATION_LOG_LINES).await {
        if let Some(id) = parse_granted_job_id(&log) {
            session.record_job_id(&id);
        }
    }
}
