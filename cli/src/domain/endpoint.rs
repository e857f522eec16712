//! Join URL grammar, the backend endpoint, and the local tunnel.
//!
//! A join URL is `scheme://host:port[rest]` where `rest` is empty or starts
//! with `/`, `?` or `#`. Parsing is strict so rewriting never guesses.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::EndpointError;

/// Host the backend binds to on the node.
pub const REMOTE_LOOPBACK: &str = "127.0.0.1";

/// Host the rewritten join URL points at.
pub const LOCAL_HOST: &str = "localhost";

// ── Join URL ──────────────────────────────────────────────────────────────────

/// A parsed join URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinUrl {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path, query and fragment, verbatim. Empty or starts with `/`, `?`, `#`.
    pub rest: String,
}

impl FromStr for JoinUrl {
    type Err = EndpointError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (scheme, after) = raw
            .split_once("://")
            .ok_or_else(|| EndpointError::MissingScheme(raw.to_string()))?;

        let mut chars = scheme.chars();
        let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(EndpointError::InvalidScheme(raw.to_string()));
        }

        let authority_end = after.find(['/', '?', '#']).unwrap_or(after.len());
        let (authority, rest) = after.split_at(authority_end);
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::InvalidPort(raw.to_string()))?;
        if host.is_empty() {
            return Err(EndpointError::MissingHost(raw.to_string()));
        }
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(EndpointError::InvalidPort(raw.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(raw.to_string()))?;

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            rest: rest.to_string(),
        })
    }
}

impl std::fmt::Display for JoinUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.rest)
    }
}

impl JoinUrl {
    /// Point the URL at the local end of the tunnel.
    ///
    /// Only URLs whose host is the remote loopback are rewritten; any other
    /// host is returned unchanged.
    #[must_use]
    pub fn through_tunnel(&self, local_port: u16) -> Self {
        if self.host != REMOTE_LOOPBACK {
            return self.clone();
        }
        Self {
            host: LOCAL_HOST.to_string(),
            port: local_port,
            ..self.clone()
        }
    }
}

/// Rewrite a raw join URL for the local tunnel.
///
/// # Errors
///
/// Returns an `EndpointError` if `raw` does not follow the join URL grammar.
pub fn rewrite_join_url(raw: &str, local_port: u16) -> Result<String, EndpointError> {
    Ok(raw.parse::<JoinUrl>()?.through_tunnel(local_port).to_string())
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://[^\s'\x22<>()\[\]]+").expect("valid regex")
});

/// Find the most recent valid join URL in backend output.
///
/// Candidates are located by shape, then each one must parse under the
/// grammar; trailing sentence punctuation is dropped.
#[must_use]
pub fn find_join_url(text: &str) -> Option<JoinUrl> {
    CANDIDATE_RE
        .find_iter(text)
        .filter_map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';'])
                .parse::<JoinUrl>()
                .ok()
        })
        .last()
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// Where the backend listens on the node, and the link it advertised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub host: String,
    pub port: u16,
    pub join_url: JoinUrl,
}

// ── Tunnel ────────────────────────────────────────────────────────────────────

/// Parameters of one local port forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub login_host: String,
    pub node: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl TunnelSpec {
    /// The `-L` forward argument.
    #[must_use]
    pub fn forward(&self) -> String {
        format!("{}:{REMOTE_LOOPBACK}:{}", self.local_port, self.remote_port)
    }

    /// `ssh` arguments for a backgrounded forward that fails fast when the
    /// local port cannot be bound.
    #[must_use]
    pub fn ssh_args(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            "-N".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=6".to_string(),
            "-J".to_string(),
            self.login_host.clone(),
            "-L".to_string(),
            self.forward(),
            self.node.clone(),
        ]
    }
}

/// `pkill -f` pattern matching tunnel processes for a local port.
#[must_use]
pub fn forward_pattern(local_port: u16) -> String {
    format!("ssh.*-L {local_port}:{REMOTE_LOOPBACK}:")
}

/// An open (or reused) forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelHandle {
    pub local_port: u16,
    pub remote_port: u16,
    pub target_host: String,
    /// `true` when an existing listener was reused instead of opening one.
    pub reused: bool,
}
