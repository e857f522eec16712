//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the output context, the loaded config and the concrete
//! adapters, so command signatures stay `(args, &AppContext)`.

use std::str::FromStr;

use anyhow::Result;

use crate::application::ports::ProgressReporter;
use crate::application::services::session::SessionEnv;
use crate::domain::config::BurrowConfig;
use crate::domain::error::SessionError;
use crate::infra::clock::TokioClock;
use crate::infra::cluster::SlurmCluster;
use crate::infra::command_runner::{
    DEFAULT_CMD_TIMEOUT, DEFAULT_REMOTE_TIMEOUT, TokioCommandRunner,
};
use crate::infra::config::YamlConfigStore;
use crate::infra::local::LocalMachine;
use crate::infra::ssh::SshShell;
use crate::infra::state::StateManager;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `BURROW_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// The cluster adapter as wired in production.
pub type ProdCluster = SlurmCluster<SshShell<TokioCommandRunner, TokioClock>>;

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Loaded and validated configuration.
    pub config: BurrowConfig,
    /// Scheduler, remote store and node runtime over SSH.
    pub cluster: ProdCluster,
    /// Local ports, tunnel process and process cleanup.
    pub local: LocalMachine<TokioCommandRunner>,
    /// Local session record.
    pub state_mgr: StateManager,
    pub clock: TokioClock,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `BURROW_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or invalid, or the
    /// home directory cannot be determined.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("BURROW_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        // Progress lines would corrupt the JSON document on stdout.
        let quiet = flags.output.quiet || flags.output.json;

        let config = YamlConfigStore.load()?;
        let shell = SshShell::new(
            TokioCommandRunner::new(DEFAULT_REMOTE_TIMEOUT),
            TokioClock,
            &config.cluster.login_host,
        );
        let cluster = SlurmCluster::new(shell, &config.cluster.remote_root);

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, quiet),
            mode,
            cluster,
            local: LocalMachine::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT)),
            state_mgr: StateManager::new()?,
            clock: TokioClock,
            config,
            non_interactive,
        })
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter for application services.
    #[must_use]
    pub fn terminal_reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// Bundle the production adapters for the session lifecycle.
    #[must_use]
    pub fn session_env<'a, R: ProgressReporter>(
        &'a self,
        reporter: &'a R,
    ) -> SessionEnv<'a, ProdCluster, LocalMachine<TokioCommandRunner>, StateManager, TokioClock, R>
    {
        SessionEnv::new(&self.cluster, &self.local, &self.state_mgr, &self.clock, reporter)
    }

    /// Fail early when a prompt would be needed but nobody can answer it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoInteractiveInput` when prompts are enabled and
    /// no terminal is attached.
    pub fn ensure_can_prompt(&self) -> Result<()> {
        if self.non_interactive || console::user_attended_stderr() {
            Ok(())
        } else {
            Err(SessionError::NoInteractiveInput.into())
        }
    }

    /// Ask for a value, offering `default`.
    ///
    /// When `non_interactive` is `true`, returns `default` immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoInteractiveInput` without a terminal, or an
    /// error if the prompt itself fails.
    pub fn input<T>(&self, prompt: &str, default: T) -> Result<T>
    where
        T: Clone + ToString + FromStr,
        <T as FromStr>::Err: ToString,
    {
        if self.non_interactive {
            return Ok(default);
        }
        self.ensure_can_prompt()?;
        let value = dialoguer::Input::<T>::new()
            .with_prompt(prompt)
            .default(default)
            .interact_text()?;
        Ok(value)
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true`, returns `default` immediately without
    /// prompting.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoInteractiveInput` without a terminal, or an
    /// error if the prompt itself fails.
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        self.ensure_can_prompt()?;
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
