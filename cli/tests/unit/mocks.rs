//! Shared fakes for the unit harness.
//!
//! [`SimulatedLoginHost`] answers the scripts `SlurmCluster` renders the
//! way a login host would, keeping the state directory in memory. Tests
//! therefore drive the real cluster adapter end to end without ssh.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use burrow_cli::application::ports::{
    Clock, LocalProcesses, PortProbe, ProgressReporter, RemoteShell, TunnelLauncher,
};
use burrow_cli::domain::endpoint::forward_pattern;
use burrow_cli::domain::scheduler::{CANCEL_USER_JOBS, KILL_ALLOCATION_CLIENTS};
use burrow_cli::domain::{StateKey, StateLayout, TunnelSpec};
use burrow_cli::infra::cluster::SlurmCluster;

pub const REMOTE_ROOT: &str = "$HOME/.burrow";

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Returns immediately and counts how often it was asked to wait.
#[derive(Default)]
pub struct InstantClock {
    sleeps: AtomicU32,
}

impl InstantClock {
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for InstantClock {
    async fn sleep(&self, _: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Login host ────────────────────────────────────────────────────────────────

/// In-memory login host behind the `RemoteShell` port.
pub struct SimulatedLoginHost {
    layout: StateLayout,
    job_id: &'static str,
    node: &'static str,
    /// Queue queries that report the job pending before it is granted.
    pending_queries: u32,
    /// Raw URL the backend prints once launched; `None` keeps it silent.
    join_url: Option<&'static str>,
    backend_installed: bool,
    reachable: AtomicBool,
    queued: AtomicBool,
    queries: AtomicU32,
    files: Mutex<HashMap<StateKey, String>>,
    prefs: Mutex<Option<String>>,
    ops: Mutex<Vec<&'static str>>,
}

impl SimulatedLoginHost {
    pub fn granting(job_id: &'static str, node: &'static str) -> Self {
        Self {
            layout: StateLayout::new(REMOTE_ROOT),
            job_id,
            node,
            pending_queries: 0,
            join_url: None,
            backend_installed: true,
            reachable: AtomicBool::new(true),
            queued: AtomicBool::new(false),
            queries: AtomicU32::new(0),
            files: Mutex::new(HashMap::new()),
            prefs: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn pending_for(mut self, queries: u32) -> Self {
        self.pending_queries = queries;
        self
    }

    #[must_use]
    pub fn serving(mut self, join_url: &'static str) -> Self {
        self.join_url = Some(join_url);
        self
    }

    #[must_use]
    pub fn without_backend(mut self) -> Self {
        self.backend_installed = false;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_prefs(&self, text: &str) {
        *self.prefs.lock().unwrap() = Some(text.to_string());
    }

    pub fn prefs(&self) -> Option<String> {
        self.prefs.lock().unwrap().clone()
    }

    pub fn file(&self, key: StateKey) -> Option<String> {
        self.files.lock().unwrap().get(&key).cloned()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| **o == op).count()
    }

    fn log(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }

    fn answer(&self, script: &str) -> Result<String> {
        if !self.reachable.load(Ordering::SeqCst) {
            anyhow::bail!("ssh: connect to host login.hpc port 22: Connection refused");
        }

        if script == CANCEL_USER_JOBS {
            self.log("cancel");
            self.queued.store(false, Ordering::SeqCst);
            return Ok(String::new());
        }
        if script == KILL_ALLOCATION_CLIENTS {
            self.log("kill_clients");
            return Ok(String::new());
        }
        if script == self.layout.reset_script() {
            self.log("reset");
            self.files.lock().unwrap().clear();
            return Ok(String::new());
        }
        if script == self.layout.prefs_read_script() {
            return Ok(self.prefs().unwrap_or_default());
        }
        if let Some(rest) = script.strip_prefix(&format!("mkdir -p \"{REMOTE_ROOT}\" && printf '%s' ")) {
            self.log("save_prefs");
            let quoted = rest
                .strip_suffix(&format!(" > {}", self.layout.prefs()))
                .unwrap_or(rest);
            self.set_prefs(&unquote(quoted));
            return Ok(String::new());
        }
        if script.contains("nohup salloc ") {
            self.log("submit");
            let mut files = self.files.lock().unwrap();
            for key in [StateKey::JobId, StateKey::Node, StateKey::Ready, StateKey::JoinUrl] {
                files.remove(&key);
            }
            drop(files);
            self.queued.store(true, Ordering::SeqCst);
            return Ok("submitted\n".to_string());
        }
        if script.starts_with("squeue ") {
            return Ok(self.queue_row());
        }
        if script.starts_with("ssh -o BatchMode=yes") {
            self.log("presence");
            let answer = if self.backend_installed { "present" } else { "missing" };
            return Ok(format!("{answer}\n"));
        }
        if script.contains("srun --jobid=") {
            self.log("launch");
            if let Some(url) = self.join_url {
                let mut files = self.files.lock().unwrap();
                files.insert(StateKey::BackendLog, format!("listening\njoin at {url}\n"));
                files.insert(StateKey::Ready, "1700000000".to_string());
            }
            return Ok("launched\n".to_string());
        }
        for key in StateKey::ALL {
            if let Some(answer) = self.answer_store(key, script) {
                return Ok(answer);
            }
        }
        anyhow::bail!("unexpected script: {script}")
    }

    fn answer_store(&self, key: StateKey, script: &str) -> Option<String> {
        let path = self.layout.path(key);
        if script == self.layout.read_script(key) {
            return Some(self.file(key).unwrap_or_default());
        }
        if script.starts_with("tail -n ") && script.ends_with(&format!("{path} 2>/dev/null || true")) {
            return Some(self.file(key).unwrap_or_default());
        }
        let write_prefix = format!("mkdir -p {} && printf '%s\\n' ", self.layout.dir());
        if let Some(rest) = script.strip_prefix(&write_prefix) {
            let quoted = rest.strip_suffix(&format!(" > {path}"))?;
            self.files
                .lock()
                .unwrap()
                .insert(key, format!("{}\n", unquote(quoted)));
            return Some(String::new());
        }
        None
    }

    /// One `squeue` row: pending until the grant, then running on the node.
    /// The grant also lands the allocation holder's markers.
    fn queue_row(&self) -> String {
        if !self.queued.load(Ordering::SeqCst) {
            return String::new();
        }
        let seen = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if seen <= self.pending_queries {
            return format!("{}|PENDING|Resources|\n", self.job_id);
        }
        let mut files = self.files.lock().unwrap();
        files.insert(StateKey::JobId, format!("{}\n", self.job_id));
        files.insert(StateKey::Node, format!("{}\n", self.node));
        files.insert(
            StateKey::SallocOut,
            format!("salloc: Granted job allocation {}\n", self.job_id),
        );
        format!("{}|RUNNING|None|{}\n", self.job_id, self.node)
    }
}

fn unquote(word: &str) -> String {
    word.strip_prefix('\'')
        .and_then(|w| w.strip_suffix('\''))
        .unwrap_or(word)
        .to_string()
}

impl RemoteShell for &SimulatedLoginHost {
    async fn run(&self, script: &str) -> Result<String> {
        self.answer(script)
    }
    async fn run_once(&self, script: &str) -> Result<String> {
        self.answer(script)
    }
    async fn probe(&self, script: &str) -> Result<String> {
        self.answer(script)
    }
}

/// The production cluster adapter wired to a simulated host.
pub fn cluster(host: &SimulatedLoginHost) -> SlurmCluster<&SimulatedLoginHost> {
    SlurmCluster::new(host, REMOTE_ROOT)
}

// ── Local machine ─────────────────────────────────────────────────────────────

/// Local ports and forwards, without spawning anything.
#[derive(Default)]
pub struct LoopbackHost {
    pub(crate) listening: Mutex<HashSet<u16>>,
    pub(crate) tunnels: Mutex<Vec<TunnelSpec>>,
    pub(crate) opens: AtomicU32,
    /// Forwards "start" but never bind, like ssh failing after fork.
    pub silent_forwards: bool,
}

impl LoopbackHost {
    pub fn listening_on(port: u16) -> Self {
        let host = Self::default();
        host.listening.lock().unwrap().insert(port);
        host
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.listening.lock().unwrap().contains(&port)
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn tunnels(&self) -> Vec<TunnelSpec> {
        self.tunnels.lock().unwrap().clone()
    }
}

impl PortProbe for LoopbackHost {
    async fn is_listening(&self, port: u16) -> bool {
        self.is_open(port)
    }
}

impl TunnelLauncher for LoopbackHost {
    async fn open(&self, spec: &TunnelSpec) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.tunnels.lock().unwrap().push(spec.clone());
        if !self.silent_forwards {
            self.listening.lock().unwrap().insert(spec.local_port);
        }
        Ok(())
    }
}

impl LocalProcesses for LoopbackHost {
    async fn kill_matching(&self, pattern: &str) -> Result<bool> {
        let mut tunnels = self.tunnels.lock().unwrap();
        let mut listening = self.listening.lock().unwrap();
        let before = tunnels.len();
        tunnels.retain(|t| {
            let hit = forward_pattern(t.local_port) == pattern;
            if hit {
                listening.remove(&t.local_port);
            }
            !hit
        });
        Ok(tunnels.len() != before)
    }

    async fn kill_port_holders(&self, port: u16) -> Result<bool> {
        Ok(self.listening.lock().unwrap().remove(&port))
    }
}

// ── Reporter ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn warned(&self, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|l| l.starts_with("warn: ") && l.contains(needle))
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ok: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn: {message}"));
    }
}
