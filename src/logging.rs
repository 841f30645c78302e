//! Logging setup for the command-line tool.
//!
//! Library code only emits `tracing` events; installing a subscriber is up to
//! the host. The binary uses [`init_logging`].

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// Parse `0/off`, `1/stdout`, `2/stderr`, or treat anything else as a filename.
    pub fn parse(value: &str) -> Self {
        match value {
            "0" | "off" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            filename => LogTarget::File(PathBuf::from(filename)),
        }
    }
}

/// Build the filter: `RUST_LOG` if set, otherwise `debug` or `info`.
fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install a global fmt subscriber writing to `target`.
pub fn init_logging(target: &LogTarget, verbose: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(verbose));
    match target {
        LogTarget::Off => {}
        LogTarget::Stdout => {
            tracing::subscriber::set_global_default(
                builder.with_writer(std::io::stdout).finish(),
            )?;
        }
        LogTarget::Stderr => {
            tracing::subscriber::set_global_default(
                builder.with_writer(std::io::stderr).finish(),
            )?;
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing::subscriber::set_global_default(
                builder.with_writer(file).with_ansi(false).finish(),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(LogTarget::parse("0"), LogTarget::Off);
        assert_eq!(LogTarget::parse("off"), LogTarget::Off);
        assert_eq!(LogTarget::parse("1"), LogTarget::Stdout);
        assert_eq!(LogTarget::parse("stderr"), LogTarget::Stderr);
        assert_eq!(
            LogTarget::parse("/tmp/assistant.log"),
            LogTarget::File(PathBuf::from("/tmp/assistant.log"))
        );
    }
}
