//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer};

/// Ephemeral cluster sessions reachable through a local tunnel
#[derive(Parser)]
#[command(
    name = "burrow",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Accept defaults instead of prompting
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Log diagnostics to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Allocate a node, start the backend and open the tunnel
    Up(commands::up::UpArgs),

    /// Tear the session down (jobs, remote state, tunnel)
    Down(commands::PortArgs),

    /// Show the local record and the cluster-side session state
    Status(commands::PortArgs),

    /// Check the ready marker, join URL and local tunnel
    Verify(commands::PortArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            verbose,
            command,
        } = self;
        crate::logging::init(verbose);

        let flags = AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        };

        match command {
            Command::Version => {
                let output = OutputContext::new(no_color, quiet);
                let renderer = if json {
                    Renderer::Json(JsonRenderer)
                } else {
                    Renderer::Human(HumanRenderer::new(&output))
                };
                commands::version::run(&renderer)
            }
            Command::Up(args) => commands::up::run(&args, &AppContext::new(&flags)?).await,
            Command::Down(args) => commands::down::run(&args, &AppContext::new(&flags)?).await,
            Command::Status(args) => commands::status::run(&args, &AppContext::new(&flags)?).await,
            Command::Verify(args) => commands::verify::run(&args, &AppContext::new(&flags)?).await,
        }
    }
}
