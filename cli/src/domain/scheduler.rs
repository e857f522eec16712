//! Slurm command rendering and output parsing.
//!
//! Pure functions: scripts are returned as strings for the remote executor,
//! and scheduler output is parsed from strings.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::session::{JobName, SessionRequest};
use crate::domain::shell::quote;
use crate::domain::store::{StateKey, StateLayout};

/// Partition sentinel meaning "let the scheduler choose".
pub const ANY_PARTITION: &str = "any";

/// One row of `squeue` output for our job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    /// State token, e.g. `PENDING`, `RUNNING`.
    pub state: String,
    /// Free-text reason, e.g. `Resources`, `Priority`, `None`.
    pub reason: String,
    /// Allocated node list, empty while pending.
    pub nodes: String,
}

/// `salloc` resource flags for a request.
///
/// Memory is converted from GiB to MiB, the scheduler's default unit. The
/// partition flag is omitted for the `any` sentinel.
#[must_use]
pub fn allocation_flags(request: &SessionRequest, job_name: &JobName) -> Vec<String> {
    let mut flags = vec![
        format!("--job-name={job_name}"),
        "--nodes=1".to_string(),
        "--ntasks=1".to_string(),
        format!("--cpus-per-task={}", request.cpus),
        format!("--mem={}M", u64::from(request.ram_gb) * 1024),
        format!("--time={:02}:00:00", request.hours),
    ];
    let partition = request.partition.trim();
    if !partition.is_empty() && !partition.eq_ignore_ascii_case(ANY_PARTITION) {
        flags.push(format!("--partition={partition}"));
    }
    if request.gpu {
        flags.push("--gres=gpu:1".to_string());
    }
    flags
}

/// Script that submits the allocation in the background.
///
/// The allocation holder records `job_id` and `node` in the state directory
/// once the scheduler grants the allocation, then sleeps to keep it alive.
/// All scheduler output lands in `salloc.out`.
#[must_use]
pub fn submit_script(layout: &StateLayout, request: &SessionRequest, job_name: &JobName) -> String {
    let flags = allocation_flags(request, job_name).join(" ");
    let job_id = layout.path(StateKey::JobId);
    let node = layout.path(StateKey::Node);
    let holder = format!(
        "echo \"$SLURM_JOB_ID\" > {job_id}; \
         echo \"$SLURM_JOB_NODELIST\" > {node}; \
         exec sleep infinity"
    );
    format!(
        "mkdir -p {dir} && cd {dir} && \
         rm -f {job_id} {node} {ready} {join} && \
         nohup salloc {flags} bash -c {holder} > {out} 2>&1 < /dev/null & \
         echo submitted",
        dir = layout.dir(),
        holder = quote(&holder),
        out = layout.path(StateKey::SallocOut),
        ready = layout.path(StateKey::Ready),
        join = layout.path(StateKey::JoinUrl),
    )
}

/// Script that lists our job in the queue as `id|state|reason|nodes`.
#[must_use]
pub fn squeue_script(job_name: &JobName) -> String {
    format!(
        "squeue -u \"$USER\" --noheader --name={job_name} --format='%i|%T|%r|%N' 2>/dev/null || true"
    )
}

/// Cancel every job owned by the user.
pub const CANCEL_USER_JOBS: &str = "scancel -u \"$USER\" 2>/dev/null || true";

/// Kill lingering allocation clients owned by the user.
pub const KILL_ALLOCATION_CLIENTS: &str = "pkill -9 -u \"$USER\" -x salloc 2>/dev/null || true";

/// Parse `squeue` output. Returns `None` for empty output or a malformed row.
#[must_use]
pub fn parse_squeue(output: &str) -> Option<JobStatus> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split('|').map(str::trim);
    let job_id = fields.next()?.to_string();
    let state = fields.next()?.to_string();
    let reason = fields.next().unwrap_or_default().to_string();
    let nodes = fields.next().unwrap_or_default().to_string();
    if job_id.is_empty() || !job_id.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return None;
    }
    Some(JobStatus {
        job_id,
        state,
        reason,
        nodes,
    })
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static GRANTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Granted job allocation (\d+)").expect("valid regex"));

/// Job id from an `salloc` log line like `salloc: Granted job allocation 123`.
#[must_use]
pub fn parse_granted_job_id(log: &str) -> Option<String> {
    GRANTED_RE
        .captures_iter(log)
        .last()
        .map(|caps| caps[1].to_string())
}

/// First host of a Slurm node list (`cn42`, `cn42,cn43`, `cn[42-43]`).
#[must_use]
pub fn first_node(nodes: &str) -> Option<String> {
    let nodes = nodes.trim();
    if nodes.is_empty() || nodes == "(null)" {
        return None;
    }
    let first = if let Some(open) = nodes.find('[') {
        let prefix = &nodes[..open];
        let inner = nodes[open + 1..].split([',', '-', ']']).next().unwrap_or_default();
        format!("{prefix}{inner}")
    } else {
        nodes.split(',').next().unwrap_or_default().to_string()
    };
    (!first.is_empty()).then_some(first)
}

/// Whether a `node` marker read from the state directory belongs to the
/// job described by `status`.
///
/// With no queue row the marker is trusted. Otherwise the job must have been
/// granted and, if the row lists nodes, list the marker's node first.
#[must_use]
pub fn marker_matches(marker_node: &str, status: Option<&JobStatus>) -> bool {
    let Some(status) = status else {
        return true;
    };
    if !matches!(status.state.as_str(), "RUNNING" | "CONFIGURING") {
        return false;
    }
    first_node(&status.nodes).is_none_or(|listed| listed == marker_node)
}

/// Fully qualify a node name with the cluster domain suffix.
///
/// Names that already carry the suffix are returned verbatim.
#[must_use]
pub fn qualify_node(node: &str, domain_suffix: &str) -> String {
    let node = node.trim();
    let suffix = domain_suffix.trim().trim_start_matches('.');
    if suffix.is_empty() || node.ends_with(&format!(".{suffix}")) || node == suffix {
        return node.to_string();
    }
    format!("{node}.{suffix}")
}
