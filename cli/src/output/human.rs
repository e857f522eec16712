//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use crate::application::services::cleanup::{CleanupReport, StepOutcome};
use crate::application::services::session::SessionOutcome;
use crate::application::services::status::{StatusReport, VerifyReport};
use crate::output::OutputContext;

/// Renders results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if !self.ctx.quiet {
            println!("burrow {version}");
        }
    }

    /// Render the result of `up`. The link is printed even when quiet so it
    /// can be captured by scripts.
    pub fn render_outcome(&self, outcome: &SessionOutcome, detached: bool) {
        if self.ctx.quiet {
            println!("{}", outcome.link);
            return;
        }
        println!();
        self.ctx.kv("Job:", outcome.session.job_name.as_str());
        if let Some(id) = &outcome.session.job_id {
            self.ctx.kv("Job id:", id);
        }
        self.ctx.kv("Node:", &outcome.endpoint.node);
        let tunnel = format!(
            "localhost:{} -> {}:{}{}",
            outcome.tunnel.local_port,
            outcome.tunnel.target_host,
            outcome.tunnel.remote_port,
            if outcome.tunnel.reused { " (reused)" } else { "" }
        );
        self.ctx.kv("Tunnel:", &tunnel);
        println!();
        println!("  {}", outcome.link.style(self.ctx.styles.link));
        println!();
        if detached {
            self.ctx.info("Session left running. Tear it down with: burrow down");
        } else {
            self.ctx.info("Press Ctrl-C to end the session.");
        }
    }

    /// Render the combined local and remote view.
    pub fn render_status(&self, report: &StatusReport) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.header("Local");
        match &report.session {
            Some(session) => {
                self.ctx.kv("Job:", session.job_name.as_str());
                self.ctx.kv("State:", session.state.label());
                self.ctx.kv(
                    "Started:",
                    &session.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                );
            }
            None => self.ctx.kv("Session:", "none recorded"),
        }
        self.ctx.kv(
            "Tunnel:",
            &format!(
                "localhost:{} {}",
                report.local_port,
                if report.tunnel_listening {
                    "listening"
                } else {
                    "closed"
                }
            ),
        );

        println!();
        self.ctx.header("Cluster");
        let Some(remote) = &report.remote else {
            self.ctx.warn("Login host unreachable");
            return;
        };
        let dash = "-".to_string();
        self.ctx
            .kv("Job:", remote.job_name.as_ref().unwrap_or(&dash));
        self.ctx.kv("Job id:", remote.job_id.as_ref().unwrap_or(&dash));
        self.ctx.kv("Node:", remote.node.as_ref().unwrap_or(&dash));
        let queue = report.scheduler.as_ref().map_or_else(
            || "not queued".to_string(),
            |s| {
                if s.reason.is_empty() || s.reason == "None" {
                    s.state.clone()
                } else {
                    format!("{} ({})", s.state, s.reason)
                }
            },
        );
        self.ctx.kv("Queue:", &queue);
        self.ctx.kv("Ready:", yes_no(remote.ready));
        if let Some(link) = &report.link {
            println!();
            println!("  {}", link.style(self.ctx.styles.link));
        }
    }

    /// Render the verification checks.
    pub fn render_verify(&self, report: &VerifyReport) {
        if self.ctx.quiet {
            return;
        }
        self.check(report.ready, "Backend ready marker present");
        self.check(report.join_url.is_some(), "Join URL recorded");
        self.check(report.tunnel_listening, "Local tunnel listening");
        println!();
        match (&report.link, report.verified()) {
            (Some(link), true) => self.ctx.success(&format!("Verified: {link}")),
            _ => self.ctx.error("Session not verified"),
        }
    }

    /// Render a teardown summary.
    pub fn render_cleanup(&self, report: &CleanupReport) {
        if self.ctx.quiet {
            return;
        }
        for step in &report.steps {
            match &step.outcome {
                StepOutcome::Done => self.ctx.success(step.name),
                StepOutcome::Nothing => self
                    .ctx
                    .kv(step.name, &"nothing to do".style(self.ctx.styles.dim).to_string()),
                StepOutcome::Failed(detail) => self.ctx.warn(&format!("{}: {detail}", step.name)),
            }
        }
        if report.is_clean() {
            self.ctx.success("Session torn down");
        } else {
            self.ctx.warn("Teardown finished with errors");
        }
    }

    fn check(&self, ok: bool, label: &str) {
        if ok {
            self.ctx.success(label);
        } else {
            self.ctx.warn(label);
        }
    }
}
