//! Application service: the session lifecycle.
//!
//! Sequences submission, allocation polling, backend launch and the tunnel,
//! with the cleanup controller run before the first stage and after any
//! failure or interruption.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    Clock, Cluster, LocalHost, PreferenceStore, ProgressReporter, SessionRecordStore,
};
use crate::application::services::allocation::{self, PollOptions};
use crate::application::services::cleanup::{CleanupController, CleanupReport};
use crate::application::services::launch::{self, LaunchOptions};
use crate::application::services::tunnel;
use crate::domain::config::BurrowConfig;
use crate::domain::error::SessionError;
use crate::domain::prefs::Preferences;
use crate::domain::retry::PollBudget;
use crate::domain::{Endpoint, JobName, Session, SessionRequest, TunnelHandle};

/// Ports the lifecycle runs against.
///
/// One cleanup controller is shared by `run`, `hold` and `teardown`, so a
/// signal-driven teardown waits for any cleanup already in flight.
pub struct SessionEnv<'a, C, L, S, K, R> {
    cluster: &'a C,
    local: &'a L,
    records: &'a S,
    clock: &'a K,
    reporter: &'a R,
    cleanup: CleanupController<'a, C, L, S, K>,
}

/// Everything a successful `up` produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session: Session,
    pub endpoint: Endpoint,
    pub tunnel: TunnelHandle,
    /// Join link rewritten for the local tunnel.
    pub link: String,
}

/// Polling budgets for the two waiting stages.
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub allocation: PollBudget,
    pub readiness: PollBudget,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            allocation: PollBudget::ALLOCATION,
            readiness: PollBudget::READINESS,
        }
    }
}

impl<'a, C, L, S, K, R> SessionEnv<'a, C, L, S, K, R>
where
    C: Cluster + PreferenceStore,
    L: LocalHost,
    S: SessionRecordStore,
    K: Clock,
    R: ProgressReporter,
{
    pub fn new(
        cluster: &'a C,
        local: &'a L,
        records: &'a S,
        clock: &'a K,
        reporter: &'a R,
    ) -> Self {
        Self {
            cluster,
            local,
            records,
            clock,
            reporter,
            cleanup: CleanupController::new(cluster, local, records, clock),
        }
    }

    /// Bring a session up: clean slate, submit, wait for a node, start the
    /// backend and open the tunnel.
    ///
    /// Cancelling `cancel` aborts the current stage at its next await point.
    /// On failure or cancellation the cleanup controller runs before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns the stage's `SessionError` (or `SessionError::Interrupted`)
    /// after cleanup has been attempted.
    pub async fn run(
        &self,
        config: &BurrowConfig,
        request: &SessionRequest,
        job_name: JobName,
        budgets: Budgets,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        request.validate()?;
        self.cleanup.run(request.local_port, self.reporter).await;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Interrupted.into()),
            outcome = self.establish(config, request, job_name, budgets) => outcome,
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "session failed, cleaning up");
            if let Some(stage) = e.downcast_ref::<SessionError>().and_then(SessionError::stage) {
                self.reporter.warn(&format!("Stage '{stage}' failed"));
            }
            self.cleanup.run(request.local_port, self.reporter).await;
        }
        result
    }

    async fn establish(
        &self,
        config: &BurrowConfig,
        request: &SessionRequest,
        job_name: JobName,
        budgets: Budgets,
    ) -> Result<SessionOutcome> {
        let mut session =
            allocation::submit(self.cluster, self.records, self.reporter, request, job_name)
                .await?;

        if let Err(e) = self.cluster.save(&Preferences::from_request(request)).await {
            tracing::debug!(error = %e, "could not save preferences");
        }

        allocation::await_node(
            self.cluster,
            self.clock,
            self.records,
            self.reporter,
            &mut session,
            PollOptions {
                budget: budgets.allocation,
                domain_suffix: &config.cluster.domain_suffix,
            },
        )
        .await?;

        let endpoint = launch::start_backend(
            self.cluster,
            self.clock,
            self.records,
            self.reporter,
            &mut session,
            LaunchOptions {
                request,
                backend: &config.backend,
                budget: budgets.readiness,
            },
        )
        .await?;

        let opened = tunnel::open_tunnel(
            self.local,
            self.records,
            self.reporter,
            &mut session,
            &config.cluster.login_host,
            &endpoint,
        )
        .await?;

        Ok(SessionOutcome {
            session,
            endpoint,
            tunnel: opened.handle,
            link: opened.link,
        })
    }

    /// Keep an established session until `cancel` fires, then tear it down.
    pub async fn hold(&self, local_port: u16, cancel: &CancellationToken) -> CleanupReport {
        cancel.cancelled().await;
        tracing::info!("shutdown requested, tearing session down");
        self.cleanup.run(local_port, self.reporter).await
    }

    /// Explicit teardown, as used by `down`.
    pub async fn teardown(&self, local_port: u16) -> CleanupReport {
        self.cleanup.run(local_port, self.reporter).await
    }
}
