//! Application service: session status and verification.
//!
//! Both reads are infallible: unreachable hosts show up as absent fields,
//! never as errors, so `status` still prints something useful offline.

use serde::Serialize;

use crate::application::ports::{PortProbe, Scheduler, SessionRecordStore, SessionStore};
use crate::domain::endpoint::rewrite_join_url;
use crate::domain::{JobName, JobStatus, Session, StateKey};

/// Values currently in the remote state directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteState {
    pub job_name: Option<String>,
    pub job_id: Option<String>,
    pub node: Option<String>,
    pub ready: bool,
    pub join_url: Option<String>,
}

/// Combined local and remote view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session: Option<Session>,
    /// `None` when the login host could not be reached.
    pub remote: Option<RemoteState>,
    pub scheduler: Option<JobStatus>,
    pub local_port: u16,
    pub tunnel_listening: bool,
    /// Join link rewritten for the local tunnel.
    pub link: Option<String>,
}

/// Outcome of the verification phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub ready: bool,
    pub join_url: Option<String>,
    pub tunnel_listening: bool,
    pub link: Option<String>,
}

impl VerifyReport {
    #[must_use]
    pub fn verified(&self) -> bool {
        self.ready && self.link.is_some() && self.tunnel_listening
    }
}

async fn remote_state(store: &impl SessionStore) -> Option<RemoteState> {
    // One read proves reachability; later misses are treated as empty.
    let job_name = match store.read(StateKey::JobName).await {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "remote state unreachable");
            return None;
        }
    };
    Some(RemoteState {
        job_name,
        job_id: read_or_none(store, StateKey::JobId).await,
        node: read_or_none(store, StateKey::Node).await,
        ready: read_or_none(store, StateKey::Ready).await.is_some(),
        join_url: read_or_none(store, StateKey::JoinUrl).await,
    })
}

async fn read_or_none(store: &impl SessionStore, key: StateKey) -> Option<String> {
    store.read(key).await.ok().flatten()
}

fn local_link(join_url: Option<&str>, local_port: u16) -> Option<String> {
    rewrite_join_url(join_url?, local_port).ok()
}

/// Gather the local record, remote state directory and queue entry.
pub async fn gather_status(
    cluster: &(impl Scheduler + SessionStore),
    local: &impl PortProbe,
    records: &impl SessionRecordStore,
    default_local_port: u16,
) -> StatusReport {
    let session = records.load_async().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read session record");
        None
    });
    let local_port = session.as_ref().map_or(default_local_port, |s| s.local_port);
    let remote = remote_state(cluster).await;

    let job_name = remote
        .as_ref()
        .and_then(|r| r.job_name.as_deref())
        .and_then(|n| JobName::parse(n).ok())
        .or_else(|| session.as_ref().map(|s| s.job_name.clone()));
    let scheduler = match (&remote, job_name) {
        (Some(_), Some(name)) => cluster.query(&name).await.ok().flatten(),
        _ => None,
    };

    let join_url = remote
        .as_ref()
        .and_then(|r| r.join_url.clone())
        .or_else(|| session.as_ref().and_then(|s| s.join_url.clone()));

    StatusReport {
        link: local_link(join_url.as_deref(), local_port),
        tunnel_listening: local.is_listening(local_port).await,
        session,
        remote,
        scheduler,
        local_port,
    }
}

/// Check the durable readiness signals and the local end of the tunnel.
pub async fn verify(
    store: &impl SessionStore,
    local: &impl PortProbe,
    local_port: u16,
) -> VerifyReport {
    let ready = read_or_none(store, StateKey::Ready).await.is_some();
    let join_url = read_or_none(store, StateKey::JoinUrl).await;
    VerifyReport {
        ready,
        link: local_link(join_url.as_deref(), local_port),
        join_url,
        tunnel_listening: local.is_listening(local_port).await,
    }
}
