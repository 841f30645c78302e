//! `settings` subcommand: inspect and edit a skill's private settings.

use super::parse_value;
use crate::config::to_pretty_json;
use crate::settings::{SkillSettings, settings_root};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for the settings subcommand
#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Settings root (default: $XDG_CACHE_HOME/json_database)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print a skill's settings document
    Show { skill_id: String },

    /// Set one key and store the document
    Set {
        skill_id: String,
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
    },

    /// Print the settings-meta form descriptor
    Meta { skill_id: String },
}

/// Run the settings subcommand.
pub fn run_settings(args: SettingsArgs) -> Result<()> {
    let root = args.root.unwrap_or_else(settings_root);
    match args.command {
        SettingsCommand::Show { skill_id } => {
            let settings = SkillSettings::open_in(&root, &skill_id)?;
            println!("{}", to_pretty_json(settings.data())?);
        }
        SettingsCommand::Set {
            skill_id,
            key,
            value,
        } => {
            let mut scoped = SkillSettings::scoped_in(&root, &skill_id)?;
            scoped.set(key.clone(), parse_value(&value));
            let path = scoped.path().to_path_buf();
            scoped
                .finish()
                .with_context(|| format!("failed to store settings for {skill_id}"))?;
            println!("Stored {} in {}", key, path.display());
        }
        SettingsCommand::Meta { skill_id } => {
            let settings = SkillSettings::open_in(&root, &skill_id)?;
            println!("{}", serde_json::to_string_pretty(&settings.settingsmeta())?);
        }
    }
    Ok(())
}
