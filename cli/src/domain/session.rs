//! Session domain types: the resource request, the lifecycle record and its
//! state transitions.
//!
//! Pure data and validation only. Components mutate a `Session` through the
//! methods here so the ordering invariants hold everywhere.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ConfigError, SessionError};
use crate::domain::scheduler::{ANY_PARTITION, JobStatus};

// ── Request ───────────────────────────────────────────────────────────────────

/// Resources and backend selection for one session. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Wall-clock duration in hours.
    pub hours: u32,
    /// Partition name, or `any` to let the scheduler choose.
    pub partition: String,
    pub cpus: u32,
    /// Memory in GiB.
    pub ram_gb: u32,
    pub gpu: bool,
    /// Port the backend listens on (node loopback).
    pub remote_port: u16,
    /// Port the tunnel listens on locally.
    pub local_port: u16,
    /// Container image path on the cluster filesystem.
    pub image: String,
    /// Backend version tag, selects the install directory.
    pub version: String,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            hours: 2,
            partition: ANY_PARTITION.to_string(),
            cpus: 4,
            ram_gb: 16,
            gpu: false,
            remote_port: 12345,
            local_port: 5555,
            image: String::new(),
            version: "latest".to_string(),
        }
    }
}

impl SessionRequest {
    /// Validate field ranges and the characters allowed in values that end
    /// up in remote shell commands.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=168).contains(&self.hours) {
            return Err(invalid("hours", &self.hours.to_string(), "Must be between 1 and 168."));
        }
        if self.cpus == 0 {
            return Err(invalid("cpus", "0", "Must be at least 1."));
        }
        if self.ram_gb == 0 {
            return Err(invalid("ram", "0", "Must be at least 1 GiB."));
        }
        if self.remote_port == 0 {
            return Err(invalid("remote_port", "0", "Must be a non-zero port."));
        }
        if self.local_port == 0 {
            return Err(invalid("local_port", "0", "Must be a non-zero port."));
        }
        if !is_token(&self.partition) {
            return Err(invalid(
                "partition",
                &self.partition,
                "Use letters, digits, '-', '_' or '.' (or 'any').",
            ));
        }
        if !is_token(&self.version) {
            return Err(invalid(
                "version",
                &self.version,
                "Use letters, digits, '-', '_' or '.'.",
            ));
        }
        if self.image.trim().is_empty() {
            return Err(invalid(
                "image",
                "",
                "Set backend.image in the config file or pass --image.",
            ));
        }
        Ok(())
    }
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn invalid(key: &str, value: &str, hint: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    }
    .into()
}

// ── Job name ──────────────────────────────────────────────────────────────────

/// Scheduler job name, unique per invocation.
///
/// Format: `sess-<unix seconds>-<pid>-<4 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    /// Build a job name from its three entropy sources.
    #[must_use]
    pub fn new(timestamp: i64, pid: u32, suffix: u16) -> Self {
        Self(format!("sess-{timestamp}-{pid}-{suffix:04x}"))
    }

    /// Parse a persisted job name, rejecting anything not produced by `new`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not have the expected shape.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let mut parts = value.splitn(4, '-');
        let ok = parts.next() == Some("sess")
            && parts.next().is_some_and(|p| p.parse::<i64>().is_ok())
            && parts.next().is_some_and(|p| p.parse::<u32>().is_ok())
            && parts
                .next()
                .is_some_and(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_hexdigit()));
        anyhow::ensure!(ok, "invalid job name: {value:?}");
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Lifecycle state. Ordered: later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Submitted,
    NodeAssigned,
    BackendStarted,
    BackendReady,
    TunnelOpen,
    TornDown,
}

impl SessionState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::NodeAssigned => "node assigned",
            Self::BackendStarted => "backend started",
            Self::BackendReady => "backend ready",
            Self::TunnelOpen => "tunnel open",
            Self::TornDown => "torn down",
        }
    }
}

/// Last scheduler state/reason pair seen for the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub state: String,
    pub reason: String,
}

/// One session, from submission to teardown.
///
/// Persisted to `~/.burrow/session.json` after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub job_name: JobName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<Observation>,
    pub local_port: u16,
    pub remote_port: u16,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_url: Option<String>,
}

impl Session {
    /// Start a session record for a freshly submitted job.
    #[must_use]
    pub fn submitted(job_name: JobName, request: &SessionRequest) -> Self {
        Self {
            job_name,
            job_id: None,
            node: None,
            state: SessionState::Submitted,
            observed: None,
            local_port: request.local_port,
            remote_port: request.remote_port,
            created_at: Utc::now(),
            join_url: None,
        }
    }

    /// Record the scheduler job id. Empty values are ignored and an id that
    /// is already set is never replaced.
    ///
    /// Returns `true` when the id was newly recorded.
    pub fn record_job_id(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.job_id.is_some() {
            return false;
        }
        self.job_id = Some(id.to_string());
        true
    }

    /// Merge one status poll. `None` (failed or empty query) keeps the last
    /// observation.
    pub fn observe(&mut self, status: Option<&JobStatus>) {
        let Some(status) = status else {
            return;
        };
        self.record_job_id(&status.job_id);
        if !status.state.is_empty() {
            self.observed = Some(Observation {
                state: status.state.clone(),
                reason: status.reason.clone(),
            });
        }
    }

    /// Assign the allocated node and move to `NodeAssigned`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invariant` if no job id has been recorded yet
    /// or the node name is empty.
    pub fn assign_node(&mut self, node: &str) -> Result<()> {
        let node = node.trim();
        if self.job_id.is_none() {
            return Err(SessionError::Invariant(format!(
                "node {node} reported before job id for {}",
                self.job_name
            ))
            .into());
        }
        if node.is_empty() {
            return Err(SessionError::Invariant("empty node name".to_string()).into());
        }
        if self.node.is_none() {
            self.node = Some(node.to_string());
        }
        self.advance(SessionState::NodeAssigned)
    }

    /// Move forward to `next`. Re-entering the current state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invariant` on a backwards transition, or when
    /// a post-allocation state is entered without an assigned node.
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        if next < self.state {
            return Err(SessionError::Invariant(format!(
                "cannot move session from {} back to {}",
                self.state.label(),
                next.label()
            ))
            .into());
        }
        if next >= SessionState::NodeAssigned && next != SessionState::TornDown && self.node.is_none()
        {
            return Err(SessionError::Invariant(format!(
                "cannot enter {} without an assigned node",
                next.label()
            ))
            .into());
        }
        self.state = next;
        Ok(())
    }

    /// Status text for the operator: the last scheduler observation, or
    /// `starting` if the scheduler has not reported the job yet.
    #[must_use]
    pub fn status_label(&self) -> String {
        match &self.observed {
            Some(obs) if obs.reason.is_empty() || obs.reason == "None" => obs.state.clone(),
            Some(obs) => format!("{} ({})", obs.state, obs.reason),
            None => "starting".to_string(),
        }
    }
}
