//! Burrow CLI - ephemeral cluster sessions with a local tunnel

use std::process::ExitCode;

use burrow_cli::cli::Cli;
use burrow_cli::domain::error::exit_code;
use burrow_cli::output::{OutputContext, json};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (as_json, no_color) = (cli.json, cli.no_color);
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code(&e);
            let message = format!("{e:#}");
            match json::format_error(&message, code) {
                Ok(obj) if as_json => println!("{obj}"),
                _ => OutputContext::new(no_color, false).error(&message),
            }
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
