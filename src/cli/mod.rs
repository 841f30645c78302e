//! CLI command definitions for assistant-support
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod config;
pub mod settings;

use clap::{Parser, Subcommand};
use config::ConfigArgs;
use serde_json::Value;
use settings::SettingsArgs;

/// Inspect and edit layered assistant configuration and skill settings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this file as the default configuration layer
    #[arg(long, global = true, value_name = "FILE")]
    pub default_config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Layered configuration (default, system, user)
    Config(ConfigArgs),

    /// Per-skill private settings
    Settings(SettingsArgs),
}

/// Parse a command-line value as JSON, falling back to a plain string.
///
/// `true`, `3` and `{"a":1}` keep their JSON types; `hello` becomes `"hello"`.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
