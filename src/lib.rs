//! Assistant Support Library
//!
//! Layered configuration, per-skill private settings and process status
//! tracking for voice-assistant services.

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod settings;
pub mod status;

pub use error::{ConfigError, ConfigResult};
