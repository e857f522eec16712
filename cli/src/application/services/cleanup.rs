//! Application service: session teardown.
//!
//! Every step is best effort and attempted regardless of earlier failures.
//! Runs are serialized, so a teardown triggered by a signal while another
//! is in flight waits for it and then finds nothing left to do.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::application::ports::{
    Clock, LocalHost, ProgressReporter, Scheduler, SessionRecordStore, SessionStore,
};
use crate::domain::endpoint::forward_pattern;

/// Pause after killing allocation clients so they release their files.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Result of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step ran and changed something (or could not tell).
    Done,
    /// There was nothing to clean up.
    Nothing,
    /// The step failed; later steps still ran.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupStep {
    pub name: &'static str,
    pub outcome: StepOutcome,
}

/// Per-step outcomes of one teardown run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    fn record(&mut self, name: &'static str, outcome: StepOutcome) {
        if let StepOutcome::Failed(detail) = &outcome {
            tracing::warn!(step = name, error = %detail, "cleanup step failed");
        } else {
            tracing::debug!(step = name, ?outcome, "cleanup step");
        }
        self.steps.push(CleanupStep { name, outcome });
    }

    /// `true` when no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }
}

fn done(result: anyhow::Result<()>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Done,
        Err(e) => StepOutcome::Failed(format!("{e:#}")),
    }
}

fn killed(result: anyhow::Result<bool>) -> StepOutcome {
    match result {
        Ok(true) => StepOutcome::Done,
        Ok(false) => StepOutcome::Nothing,
        Err(e) => StepOutcome::Failed(format!("{e:#}")),
    }
}

/// Idempotent teardown of everything a session may have left behind.
pub struct CleanupController<'a, C, L, S, K> {
    cluster: &'a C,
    local: &'a L,
    records: &'a S,
    clock: &'a K,
    lock: Mutex<()>,
}

impl<'a, C, L, S, K> CleanupController<'a, C, L, S, K>
where
    C: Scheduler + SessionStore,
    L: LocalHost,
    S: SessionRecordStore,
    K: Clock,
{
    pub fn new(cluster: &'a C, local: &'a L, records: &'a S, clock: &'a K) -> Self {
        Self {
            cluster,
            local,
            records,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Tear down jobs, remote state, tunnels on `local_port` and the local
    /// record. Never fails; inspect the report for step failures.
    pub async fn run(&self, local_port: u16, reporter: &impl ProgressReporter) -> CleanupReport {
        let _guard = self.lock.lock().await;
        reporter.step("Cleaning up session resources...");
        let mut report = CleanupReport::default();

        report.record("cancel scheduler jobs", done(self.cluster.cancel_user_jobs().await));
        report.record(
            "kill allocation clients",
            done(self.cluster.kill_allocation_clients().await),
        );
        self.clock.sleep(SETTLE_DELAY).await;
        report.record("reset remote state", done(self.cluster.reset().await));
        report.record(
            "kill tunnel processes",
            killed(self.local.kill_matching(&forward_pattern(local_port)).await),
        );
        let holders = if self.local.is_listening(local_port).await {
            killed(self.local.kill_port_holders(local_port).await)
        } else {
            StepOutcome::Nothing
        };
        report.record("free local port", holders);
        report.record("clear session record", done(self.records.clear_async().await));

        if report.is_clean() {
            reporter.success("Session resources released");
        } else {
            for step in report.failures() {
                if let StepOutcome::Failed(detail) = &step.outcome {
                    reporter.warn(&format!("Cleanup step '{}' failed: {detail}", step.name));
                }
            }
        }
        report
    }
}
