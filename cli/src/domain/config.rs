//! Domain types and validators for Burrow configuration.
//!
//! Pure functions only. No I/O or async.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.burrow/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BurrowConfig {
    /// Cluster access settings.
    pub cluster: ClusterConfig,
    /// Backend install and launch settings.
    pub backend: BackendConfig,
}

/// Cluster access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// SSH destination of the login host (alias or `user@host`).
    pub login_host: String,
    /// Domain appended to bare node names, e.g. `hpc.example.org`.
    pub domain_suffix: String,
    /// Remote root holding the state directory and preferences.
    pub remote_root: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            login_host: "login".to_string(),
            domain_suffix: String::new(),
            remote_root: "$HOME/.burrow".to_string(),
        }
    }
}

/// Backend install and launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Default container image path.
    pub image: String,
    /// Directory holding one subdirectory per backend version.
    pub install_root: String,
    /// Binary path relative to the version directory.
    pub binary: String,
    /// Argument template; `{host}` and `{port}` are substituted.
    pub args: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            install_root: "/opt/backend".to_string(),
            binary: "bin/server".to_string(),
            args: "--host {host} --port {port}".to_string(),
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates values that are interpolated into remote scripts.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for the first unsafe value.
pub fn validate_config(config: &BurrowConfig) -> Result<()> {
    let login = config.cluster.login_host.trim();
    if login.is_empty() || login.starts_with('-') || login.contains(char::is_whitespace) {
        return Err(invalid(
            "cluster.login_host",
            login,
            "Set it to an SSH host alias or user@host.",
        ));
    }
    if !config
        .cluster
        .domain_suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
    {
        return Err(invalid(
            "cluster.domain_suffix",
            &config.cluster.domain_suffix,
            "Use a DNS domain such as hpc.example.org.",
        ));
    }
    // The remote root is placed inside double quotes so `$HOME` expands.
    let root = &config.cluster.remote_root;
    if root.trim().is_empty() || root.contains(['"', '`', '\\', '\n', '\'']) {
        return Err(invalid(
            "cluster.remote_root",
            root,
            "Use a plain path; $HOME is allowed, quotes and backslashes are not.",
        ));
    }
    if config.backend.args.contains(['`', ';', '|', '&', '\n', '$']) {
        return Err(invalid(
            "backend.args",
            &config.backend.args,
            "Arguments may not contain shell operators or substitutions.",
        ));
    }
    Ok(())
}

fn invalid(key: &str, value: &str, hint: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    }
    .into()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
