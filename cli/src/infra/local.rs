//! Local machine adapter: port probing, the SSH tunnel process, and killing
//! leftovers. Implements the `LocalHost` ports.

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, LocalProcesses, PortProbe, TunnelLauncher};
use crate::domain::TunnelSpec;
use crate::infra::network::{parse_pids, ss_lists_port, tcp_listening};

pub struct LocalMachine<R> {
    runner: R,
}

impl<R: CommandRunner> LocalMachine<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// PIDs listening on `port` according to `lsof`. `None` if `lsof` is
    /// unavailable.
    async fn listener_pids(&self, port: u16) -> Option<Vec<u32>> {
        let filter = format!("-iTCP:{port}");
        let out = self
            .runner
            .run("lsof", &["-nP", "-t", &filter, "-sTCP:LISTEN"])
            .await
            .ok()?;
        // lsof exits 1 when nothing matches.
        match out.status.code() {
            Some(0 | 1) => Some(parse_pids(&String::from_utf8_lossy(&out.stdout))),
            _ => None,
        }
    }

    async fn ss_listening(&self, port: u16) -> Option<bool> {
        let out = self.runner.run("ss", &["-ltnH"]).await.ok()?;
        out.status
            .success()
            .then(|| ss_lists_port(&String::from_utf8_lossy(&out.stdout), port))
    }
}

impl<R: CommandRunner> PortProbe for LocalMachine<R> {
    async fn is_listening(&self, port: u16) -> bool {
        match tcp_listening(port).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => tracing::debug!(port, error = %e, "socket probe failed"),
        }
        // A listener that refuses loopback connects still holds the port.
        if let Some(pids) = self.listener_pids(port).await {
            return !pids.is_empty();
        }
        self.ss_listening(port).await.unwrap_or(false)
    }
}

impl<R: CommandRunner> TunnelLauncher for LocalMachine<R> {
    async fn open(&self, spec: &TunnelSpec) -> Result<()> {
        let args = spec.ssh_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(forward = %spec.forward(), node = %spec.node, "opening tunnel");
        let out = self.runner.run("ssh", &args).await.context("starting ssh")?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("ssh exited with {}: {}", out.status, stderr.trim());
        }
        Ok(())
    }
}

impl<R: CommandRunner> LocalProcesses for LocalMachine<R> {
    async fn kill_matching(&self, pattern: &str) -> Result<bool> {
        let out = self
            .runner
            .run("pkill", &["-f", pattern])
            .await
            .context("running pkill")?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => anyhow::bail!(
                "pkill failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        }
    }

    async fn kill_port_holders(&self, port: u16) -> Result<bool> {
        if let Some(pids) = self.listener_pids(port).await {
            let mut killed = false;
            for pid in pids {
                let pid = pid.to_string();
                let out = self.runner.run("kill", &["-9", &pid]).await?;
                killed |= out.status.success();
            }
            return Ok(killed);
        }
        let target = format!("{port}/tcp");
        let out = self
            .runner
            .run("fuser", &["-k", &target])
            .await
            .context("neither lsof nor fuser is available")?;
        Ok(out.status.success())
    }
}
