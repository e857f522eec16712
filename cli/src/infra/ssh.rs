//! Infrastructure implementation of the `RemoteShell` port.
//!
//! Scripts are fed to `bash -s` on the login host over stdin, so they need
//! no extra layer of quoting and do not depend on the user's login shell.

use anyhow::Result;

use crate::application::ports::{Clock, CommandRunner, RemoteShell};
use crate::domain::error::SessionError;
use crate::domain::retry::RetryPolicy;

/// Per-attempt SSH connect timeout, in seconds.
pub const CONNECT_TIMEOUT_SECS: u32 = 6;

/// Runs scripts on the login host through the system `ssh` client.
pub struct SshShell<R, K> {
    runner: R,
    clock: K,
    destination: String,
    policy: RetryPolicy,
}

impl<R: CommandRunner, K: Clock> SshShell<R, K> {
    #[must_use]
    pub fn new(runner: R, clock: K, destination: &str) -> Self {
        Self {
            runner,
            clock,
            destination: destination.to_string(),
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            self.destination.clone(),
            "--".to_string(),
            "bash".to_string(),
            "-s".to_string(),
        ]
    }

    async fn exec(&self, script: &str, policy: RetryPolicy) -> Result<String> {
        let args = self.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut detail = String::new();

        for attempt in 1..=policy.max_attempts {
            match self.runner.run_with_stdin("ssh", &args, script.as_bytes()).await {
                Ok(out) if out.status.success() => {
                    return Ok(String::from_utf8_lossy(&out.stdout).into_owned());
                }
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    detail = match out.status.code() {
                        Some(code) => format!("exit {code}: {}", stderr.trim()),
                        None => format!("killed by signal: {}", stderr.trim()),
                    };
                }
                Err(e) => detail = format!("{e:#}"),
            }
            tracing::debug!(attempt, max = policy.max_attempts, error = %detail, "remote command failed");
            if attempt < policy.max_attempts {
                self.clock.sleep(policy.delay_after(attempt)).await;
            }
        }

        Err(SessionError::Transport {
            attempts: policy.max_attempts,
            detail,
        }
        .into())
    }
}

impl<R: CommandRunner, K: Clock> RemoteShell for SshShell<R, K> {
    async fn run(&self, script: &str) -> Result<String> {
        self.exec(script, self.policy).await
    }

    async fn run_once(&self, script: &str) -> Result<String> {
        self.exec(script, RetryPolicy::once()).await
    }

    async fn probe(&self, script: &str) -> Result<String> {
        self.exec(script, RetryPolicy::once()).await
    }
}
