//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::launch::LaunchPlan;
use crate::domain::prefs::Preferences;
use crate::domain::{JobName, JobStatus, Session, SessionRequest, StateKey, TunnelSpec};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
}

/// Abstracts waiting so polling loops can run instantly under test.
#[allow(async_fn_in_trait)]
pub trait Clock {
    async fn sleep(&self, duration: Duration);
}

// ── Remote Executor Port ──────────────────────────────────────────────────────

/// Runs shell scripts on the cluster login host.
///
/// All three methods return stdout of a zero exit. A non-zero exit, spawn
/// failure or timeout is an error.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run an idempotent script, retrying with backoff. Exhausted retries
    /// surface as `SessionError::Transport`.
    async fn run(&self, script: &str) -> Result<String>;
    /// Run a non-idempotent script exactly once.
    async fn run_once(&self, script: &str) -> Result<String>;
    /// Single attempt for polling loops, where the loop itself retries.
    async fn probe(&self, script: &str) -> Result<String>;
}

// ── Cluster Ports ─────────────────────────────────────────────────────────────

/// Scheduler operations against the cluster.
#[allow(async_fn_in_trait)]
pub trait Scheduler {
    /// Background-submit the allocation for `job_name`. Returns as soon as
    /// the submission is issued, not when the allocation is granted.
    async fn submit(&self, request: &SessionRequest, job_name: &JobName) -> Result<()>;
    /// Query the queue for `job_name`. `Ok(None)` means the job is not listed.
    async fn query(&self, job_name: &JobName) -> Result<Option<JobStatus>>;
    /// Cancel every job owned by the user.
    async fn cancel_user_jobs(&self) -> Result<()>;
    /// Kill lingering allocation clients owned by the user.
    async fn kill_allocation_clients(&self) -> Result<()>;
}

/// Durable per-session key-value store shared with the detached remote work.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    /// Read a value. Missing or empty keys read as `None`.
    async fn read(&self, key: StateKey) -> Result<Option<String>>;
    /// Single attempt read for polling loops.
    async fn poll(&self, key: StateKey) -> Result<Option<String>>;
    async fn write(&self, key: StateKey, value: &str) -> Result<()>;
    /// Last `lines` lines of a log key, empty if missing.
    async fn tail(&self, key: StateKey, lines: usize) -> Result<String>;
    /// Remove and recreate the state directory.
    async fn reset(&self) -> Result<()>;
}

/// Operations on the allocated compute node.
#[allow(async_fn_in_trait)]
pub trait NodeRuntime {
    /// Whether `path` exists on `node`.
    async fn backend_present(&self, node: &str, path: &str) -> Result<bool>;
    /// Start the backend detached inside the granted allocation.
    async fn launch(&self, plan: &LaunchPlan) -> Result<()>;
}

/// Remote preference persistence.
#[allow(async_fn_in_trait)]
pub trait PreferenceStore {
    async fn load(&self) -> Result<Preferences>;
    async fn save(&self, prefs: &Preferences) -> Result<()>;
}

/// Composite trait: everything the orchestrator needs from the cluster.
pub trait Cluster: Scheduler + SessionStore + NodeRuntime {}

/// Blanket implementation: any type implementing all three sub-traits is a `Cluster`.
impl<T> Cluster for T where T: Scheduler + SessionStore + NodeRuntime {}

// ── Local Host Ports ──────────────────────────────────────────────────────────

/// Checks whether a local port is accepting connections.
#[allow(async_fn_in_trait)]
pub trait PortProbe {
    async fn is_listening(&self, port: u16) -> bool;
}

/// Opens a detached port forward.
#[allow(async_fn_in_trait)]
pub trait TunnelLauncher {
    /// Open the forward, failing if it cannot bind.
    async fn open(&self, spec: &TunnelSpec) -> Result<()>;
}

/// Kills local processes left behind by a session.
#[allow(async_fn_in_trait)]
pub trait LocalProcesses {
    /// Kill processes whose command line matches `pattern`. Returns whether
    /// anything matched.
    async fn kill_matching(&self, pattern: &str) -> Result<bool>;
    /// Kill processes holding `port` open. Returns whether anything was killed.
    async fn kill_port_holders(&self, port: u16) -> Result<bool>;
}

/// Composite trait: everything the orchestrator needs from the local machine.
pub trait LocalHost: PortProbe + TunnelLauncher + LocalProcesses {}

/// Blanket implementation: any type implementing all three sub-traits is a `LocalHost`.
impl<T> LocalHost for T where T: PortProbe + TunnelLauncher + LocalProcesses {}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Synchronous.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── State Port ────────────────────────────────────────────────────────────────

/// Abstracts local session record persistence.
#[allow(async_fn_in_trait)]
pub trait SessionRecordStore {
    /// Load the current session record, returning `None` if none exists.
    async fn load_async(&self) -> Result<Option<Session>>;
    /// Persist the given session record.
    async fn save_async(&self, session: &Session) -> Result<()>;
    /// Remove the session record if present.
    async fn clear_async(&self) -> Result<()>;
}
