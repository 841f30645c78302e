//! `config` subcommand: show, query and update the configuration stack.

use super::parse_value;
use crate::config::watcher::{WatchPaths, WatcherConfig, start_layer_watcher};
use crate::config::{ConfigStack, LayerOrigin, to_pretty_json};
use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde_json::Map;
use std::path::PathBuf;
use tracing::info;

/// Which view `config show` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LayerView {
    Default,
    System,
    User,
    /// Merged view of all layers (default)
    #[default]
    Effective,
}

/// Arguments for the config subcommand
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print a layer or the merged configuration
    Show {
        #[arg(long, value_enum, default_value_t = LayerView::Effective)]
        layer: LayerView,
    },

    /// Print the effective value at a dotted key such as `tts.module`
    Get { key: String },

    /// Merge `key = value` into the user configuration and store it
    Set {
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
        /// Write to this file instead of the user configuration
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,
    },

    /// Print the effective configuration every time a layer file changes
    Watch,
}

/// Run the config subcommand against `stack`.
pub async fn run_config(stack: &mut ConfigStack, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show { layer } => {
            let tree = match layer {
                LayerView::Default => stack.layer(LayerOrigin::Default).tree().clone(),
                LayerView::System => stack.layer(LayerOrigin::System).tree().clone(),
                LayerView::User => stack.layer(LayerOrigin::User).tree().clone(),
                LayerView::Effective => stack.effective(),
            };
            println!("{}", to_pretty_json(&tree)?);
        }
        ConfigCommand::Get { key } => match stack.lookup(&key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("key not found: {key}"),
        },
        ConfigCommand::Set { key, value, path } => {
            let mut tree = Map::new();
            tree.insert(key.clone(), parse_value(&value));
            let written = stack
                .update_user(tree, path.as_deref())
                .with_context(|| format!("failed to store {key}"))?;
            println!("Stored {} in {}", key, written.display());
        }
        ConfigCommand::Watch => watch(stack).await?,
    }
    Ok(())
}

async fn watch(stack: &mut ConfigStack) -> Result<()> {
    let mut handle = start_layer_watcher(WatchPaths::from_stack(stack), WatcherConfig::default())?;
    println!("{}", to_pretty_json(&stack.effective())?);

    while let Some(event) = handle.wait_for_change().await {
        if !event.requires_reload() {
            continue;
        }
        event.apply(stack);
        info!(origins = ?event.origins(), "Configuration reloaded");
        println!("{}", to_pretty_json(&stack.effective())?);
    }
    Ok(())
}

