//! assistant-support command-line tool
//!
//! Inspects and edits the layered assistant configuration and per-skill
//! settings documents.

use anyhow::Result;
use assistant_support::cli::config::run_config;
use assistant_support::cli::settings::run_settings;
use assistant_support::cli::{Cli, Command};
use assistant_support::config::ConfigStack;
use assistant_support::logging::{LogTarget, init_logging};
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    match cli.command {
        Command::Config(args) => {
            let mut stack = ConfigStack::load();
            if let Some(default_config) = &cli.default_config {
                stack.set_default_root(default_config);
            }
            debug!(layers = ?stack.layer_files(), "Configuration stack loaded");
            run_config(&mut stack, args).await?;
        }
        Command::Settings(args) => {
            run_settings(args)?;
        }
    }

    Ok(())
}
