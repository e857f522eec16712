//! Domain layer: pure session logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod launch;
pub mod prefs;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod shell;
pub mod store;

pub use config::{BurrowConfig, validate_config};
pub use endpoint::{Endpoint, JoinUrl, TunnelHandle, TunnelSpec, rewrite_join_url};
pub use error::{ConfigError, EndpointError, SessionError, Stage};
pub use scheduler::JobStatus;
pub use session::{JobName, Session, SessionRequest, SessionState};
pub use store::{StateKey, StateLayout};
