//! Command implementations

pub mod down;
pub mod status;
pub mod up;
pub mod verify;
pub mod version;

use clap::Args;

use crate::app::AppContext;
use crate::application::ports::SessionRecordStore;
use crate::domain::SessionRequest;

/// Arguments shared by commands that act on the local tunnel port.
#[derive(Args, Default)]
pub struct PortArgs {
    /// Local tunnel port (default: from the session record)
    #[arg(long)]
    pub port: Option<u16>,
}

impl PortArgs {
    /// The explicit port, else the recorded session's, else the default.
    pub async fn resolve(&self, app: &AppContext) -> u16 {
        if let Some(port) = self.port {
            return port;
        }
        match app.state_mgr.load_async().await {
            Ok(Some(session)) => session.local_port,
            Ok(None) => SessionRequest::default().local_port,
            Err(e) => {
                tracing::warn!(error = %e, "could not read session record");
                SessionRequest::default().local_port
            }
        }
    }
}
