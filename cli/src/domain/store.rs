//! Remote state directory layout.
//!
//! The state directory is the only channel between this process and the
//! detached remote processes (allocation holder, backend, readiness
//! watcher). Each key maps to one file under `<remote_root>/session`.

use serde::Serialize;

/// Directory name under the remote root that holds per-session files.
pub const SESSION_DIR: &str = "session";

/// Preferences file name under the remote root.
pub const PREFS_FILE: &str = "prefs";

/// One file in the remote state directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateKey {
    JobName,
    JobId,
    Node,
    Ready,
    JoinUrl,
    BackendPid,
    SallocOut,
    BackendLog,
    LauncherLog,
    TaskScript,
}

impl StateKey {
    /// All keys, in the order `status` reports them.
    pub const ALL: [StateKey; 10] = [
        Self::JobName,
        Self::JobId,
        Self::Node,
        Self::Ready,
        Self::JoinUrl,
        Self::BackendPid,
        Self::SallocOut,
        Self::BackendLog,
        Self::LauncherLog,
        Self::TaskScript,
    ];

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::JobName => "job_name",
            Self::JobId => "job_id",
            Self::Node => "node",
            Self::Ready => "ready",
            Self::JoinUrl => "join_url",
            Self::BackendPid => "backend.pid",
            Self::SallocOut => "salloc.out",
            Self::BackendLog => "backend.log",
            Self::LauncherLog => "start_backend.launcher.log",
            Self::TaskScript => "backend_task.sh",
        }
    }
}

/// Paths of the remote state directory, rendered for use inside
/// double-quoted shell words so `$HOME` in the root still expands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: String,
}

impl StateLayout {
    #[must_use]
    pub fn new(remote_root: &str) -> Self {
        Self {
            root: remote_root.trim_end_matches('/').to_string(),
        }
    }

    /// Quoted state directory path.
    #[must_use]
    pub fn dir(&self) -> String {
        format!("\"{}/{SESSION_DIR}\"", self.root)
    }

    /// Quoted path of one key's file.
    #[must_use]
    pub fn path(&self, key: StateKey) -> String {
        format!("\"{}/{SESSION_DIR}/{}\"", self.root, key.file_name())
    }

    /// Quoted preferences file path (outside the state directory so
    /// cleanup does not remove it).
    #[must_use]
    pub fn prefs(&self) -> String {
        format!("\"{}/{PREFS_FILE}\"", self.root)
    }

    /// Read one key; prints nothing if the file is missing.
    #[must_use]
    pub fn read_script(&self, key: StateKey) -> String {
        format!("cat {} 2>/dev/null || true", self.path(key))
    }

    /// Overwrite one key with `value` (passed through `printf`).
    #[must_use]
    pub fn write_script(&self, key: StateKey, value: &str) -> String {
        format!(
            "mkdir -p {} && printf '%s\\n' {} > {}",
            self.dir(),
            crate::domain::shell::quote(value),
            self.path(key)
        )
    }

    /// Last `lines` lines of one key.
    #[must_use]
    pub fn tail_script(&self, key: StateKey, lines: usize) -> String {
        format!("tail -n {lines} {} 2>/dev/null || true", self.path(key))
    }

    /// Remove and recreate the state directory.
    #[must_use]
    pub fn reset_script(&self) -> String {
        format!("rm -rf {dir} && mkdir -p {dir}", dir = self.dir())
    }

    #[must_use]
    pub fn prefs_read_script(&self) -> String {
        format!("cat {} 2>/dev/null || true", self.prefs())
    }

    /// Replace the preferences file with `text`.
    #[must_use]
    pub fn prefs_write_script(&self, text: &str) -> String {
        format!(
            "mkdir -p \"{}\" && printf '%s' {} > {}",
            self.root,
            crate::domain::shell::quote(text),
            self.prefs()
        )
    }
}
