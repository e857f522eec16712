//! Application service: local tunnel to the backend.

use anyhow::{Context, Result};

use crate::application::ports::{
    PortProbe, ProgressReporter, SessionRecordStore, TunnelLauncher,
};
use crate::domain::error::SessionError;
use crate::domain::{Endpoint, Session, SessionState, TunnelHandle, TunnelSpec};

/// An open tunnel and the join link rewritten to go through it.
#[derive(Debug, Clone)]
pub struct TunnelOutcome {
    pub handle: TunnelHandle,
    pub link: String,
}

/// Forward `session.local_port` to the backend, reusing a listener that is
/// already there.
///
/// # Errors
///
/// Returns `SessionError::TunnelFailed` if the forward cannot be opened or
/// the local port is still closed afterwards.
pub async fn open_tunnel(
    local: &(impl PortProbe + TunnelLauncher),
    records: &impl SessionRecordStore,
    reporter: &impl ProgressReporter,
    session: &mut Session,
    login_host: &str,
    endpoint: &Endpoint,
) -> Result<TunnelOutcome> {
    let local_port = session.local_port;
    let reused = local.is_listening(local_port).await;

    if reused {
        tracing::info!(local_port, "local port already listening, reusing tunnel");
        reporter.success(&format!("Reusing existing tunnel on port {local_port}"));
    } else {
        let spec = TunnelSpec {
            login_host: login_host.to_string(),
            node: endpoint.node.clone(),
            local_port,
            remote_port: endpoint.port,
        };
        reporter.step(&format!(
            "Opening tunnel {local_port} -> {}:{}...",
            endpoint.node, endpoint.port
        ));
        let failed = |detail: String| SessionError::TunnelFailed {
            local_port,
            node: endpoint.node.clone(),
            remote_port: endpoint.port,
            detail,
        };
        local
            .open(&spec)
            .await
            .map_err(|e| failed(format!("{e:#}")))?;
        if !local.is_listening(local_port).await {
            return Err(failed("forward started but the local port is not listening".to_string()).into());
        }
        tracing::info!(local_port, node = %endpoint.node, remote_port = endpoint.port, "tunnel opened");
        reporter.success(&format!("Tunnel open on port {local_port}"));
    }

    session.advance(SessionState::TunnelOpen)?;
    records
        .save_async(session)
        .await
        .context("saving session record")?;

    Ok(TunnelOutcome {
        handle: TunnelHandle {
            local_port,
            remote_port: endpoint.port,
            target_host: endpoint.node.clone(),
            reused,
        },
        link: endpoint.join_url.through_tunnel(local_port).to_string(),
    })
}
