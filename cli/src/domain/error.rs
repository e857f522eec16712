//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

/// Exit code for a fatal stage failure.
pub const EXIT_STAGE_FAILURE: i32 = 1;

/// Exit code when input is required but no interactive channel exists.
pub const EXIT_NO_INPUT: i32 = 2;

/// Exit code after an interrupt or termination signal.
pub const EXIT_INTERRUPTED: i32 = 130;

// ── Session errors ────────────────────────────────────────────────────────────

/// Lifecycle stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submit,
    Allocation,
    Launch,
    Readiness,
    Tunnel,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submit => "submit",
            Self::Allocation => "allocation",
            Self::Launch => "backend launch",
            Self::Readiness => "backend readiness",
            Self::Tunnel => "tunnel",
        };
        f.write_str(name)
    }
}

/// Errors raised by the session lifecycle.
///
/// Stage failures carry the tail of the most relevant remote log so the
/// operator sees why the stage failed without logging in.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("remote command failed after {attempts} attempts: {detail}")]
    Transport { attempts: u32, detail: String },

    #[error("no node assigned after {ticks} polls (last state: {last_state})\n\n{log}")]
    NoNodeAssigned {
        ticks: u32,
        last_state: String,
        log: String,
    },

    #[error("job '{job_name}' is not in the queue after submission\n\n{log}")]
    JobVanished { job_name: String, log: String },

    #[error("backend version '{version}' not found at {path} on {node}")]
    BackendMissing {
        version: String,
        path: String,
        node: String,
    },

    #[error(
        "backend did not become ready after {ticks} polls\n\n\
         launcher log:\n{launcher_log}\n\nbackend log:\n{backend_log}"
    )]
    BackendNotReady {
        ticks: u32,
        launcher_log: String,
        backend_log: String,
    },

    #[error("backend is listening but advertised no join link\n\nbackend log:\n{backend_log}")]
    NoJoinLink { backend_log: String },

    #[error("could not open tunnel {local_port} -> {node}:{remote_port}: {detail}")]
    TunnelFailed {
        local_port: u16,
        node: String,
        remote_port: u16,
        detail: String,
    },

    #[error("{0}")]
    Invariant(String),

    #[error("input required but no interactive terminal is available (pass --yes to use defaults)")]
    NoInteractiveInput,

    #[error("interrupted")]
    Interrupted,
}

impl SessionError {
    /// Stage the error belongs to, if it is a stage failure.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::JobVanished { .. } => Some(Stage::Submit),
            Self::NoNodeAssigned { .. } => Some(Stage::Allocation),
            Self::BackendMissing { .. } => Some(Stage::Launch),
            Self::BackendNotReady { .. } | Self::NoJoinLink { .. } => Some(Stage::Readiness),
            Self::TunnelFailed { .. } => Some(Stage::Tunnel),
            Self::Transport { .. }
            | Self::Invariant(_)
            | Self::NoInteractiveInput
            | Self::Interrupted => None,
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoInteractiveInput => EXIT_NO_INPUT,
            Self::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_STAGE_FAILURE,
        }
    }
}

/// Resolve the process exit code for any error in an `anyhow` chain.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<SessionError>())
        .map_or(EXIT_STAGE_FAILURE, SessionError::exit_code)
}

// ── Endpoint errors ───────────────────────────────────────────────────────────

/// Errors from parsing a join URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("missing '://' in join URL: {0}")]
    MissingScheme(String),

    #[error("invalid scheme in join URL: {0}")]
    InvalidScheme(String),

    #[error("missing host in join URL: {0}")]
    MissingHost(String),

    #[error("missing or invalid port in join URL: {0}")]
    InvalidPort(String),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration and request validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: String,
        value: String,
        hint: String,
    },

    #[error("Unknown preference: {0}")]
    UnknownPreference(String),
}
