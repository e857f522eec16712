//! Backend launch scripts.
//!
//! The backend runs as a step of the already-granted allocation
//! (`srun --jobid … --overlap`) inside `apptainer exec`. A watcher loop next
//! to it writes the `ready` marker once the port listens or a URL shows up in
//! the log, so readiness survives a dropped SSH connection. The URL itself is
//! extracted locally by `endpoint::find_join_url`, never by the watcher.

use crate::domain::endpoint::REMOTE_LOOPBACK;
use crate::domain::shell::quote;
use crate::domain::store::{StateKey, StateLayout};

/// Everything needed to start the backend on the assigned node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub job_id: String,
    pub node: String,
    pub image: String,
    pub backend_path: String,
    /// Backend arguments with `{port}` and `{host}` already substituted.
    pub backend_args: String,
    pub port: u16,
    pub gpu: bool,
}

/// Version-keyed backend path: `<install_root>/<version>/<binary>`.
#[must_use]
pub fn backend_path(install_root: &str, version: &str, binary: &str) -> String {
    format!(
        "{}/{version}/{}",
        install_root.trim_end_matches('/'),
        binary.trim_start_matches('/')
    )
}

/// Substitute `{port}` and `{host}` in the configured argument template.
#[must_use]
pub fn render_backend_args(template: &str, port: u16) -> String {
    template
        .replace("{port}", &port.to_string())
        .replace("{host}", REMOTE_LOOPBACK)
}

/// Script run on the login host that checks the backend binary on the node.
///
/// Prints `present` or `missing`; exits 255 when the node is unreachable so
/// the executor retries instead of reporting a missing backend.
#[must_use]
pub fn presence_script(node: &str, path: &str) -> String {
    let remote = format!("test -e {}", quote(path));
    format!(
        "ssh -o BatchMode=yes -o ConnectTimeout=6 {node} {remote}; rc=$?; \
         if [ $rc -eq 0 ]; then echo present; \
         elif [ $rc -eq 255 ]; then exit 255; \
         else echo missing; fi",
        node = quote(node),
        remote = quote(&remote),
    )
}

impl LaunchPlan {
    /// Script executed on the node by `srun`: backend plus readiness watcher.
    #[must_use]
    pub fn task_script(&self, layout: &StateLayout) -> String {
        let nv = if self.gpu { " --nv" } else { "" };
        format!(
            r#"#!/bin/bash
apptainer exec{nv} {image} {backend} {args} > {log} 2>&1 &
BACKEND=$!
echo "$BACKEND" > {pid}
while kill -0 "$BACKEND" 2>/dev/null; do
  if ss -ltn 2>/dev/null | grep -q ":{port} " || grep -qE '[A-Za-z][A-Za-z0-9+.-]*://' {log} 2>/dev/null; then
    date +%s > {ready}
    break
  fi
  sleep 1
done
wait "$BACKEND"
"#,
            image = quote(&self.image),
            backend = quote(&self.backend_path),
            args = self.backend_args,
            log = layout.path(StateKey::BackendLog),
            pid = layout.path(StateKey::BackendPid),
            ready = layout.path(StateKey::Ready),
            port = self.port,
        )
    }

    /// Script run once on the login host: writes the task script and starts
    /// it detached as a step of the allocation.
    #[must_use]
    pub fn launch_script(&self, layout: &StateLayout) -> String {
        let task = layout.path(StateKey::TaskScript);
        format!(
            "mkdir -p {dir} && cat > {task} <<'BURROW_TASK'\n{body}BURROW_TASK\n\
             chmod +x {task} && \
             nohup srun --jobid={job} --overlap --nodes=1 --ntasks=1 \
             bash {task} > {launcher} 2>&1 < /dev/null &\n\
             echo launched\n",
            dir = layout.dir(),
            body = self.task_script(layout),
            job = quote(&self.job_id),
            launcher = layout.path(StateKey::LauncherLog),
        )
    }
}
