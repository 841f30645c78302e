//! Layered configuration.
//!
//! Resolves an effective configuration from an ordered stack of layers:
//! 1. **Default** - factory defaults found by probing installation roots
//! 2. **System** - `/etc/mycroft/mycroft.conf` (read-only)
//! 3. **User** - `~/.mycroft/mycroft.conf` (writable)
//! 4. **Overrides** - in-memory, never persisted on their own
//!
//! ## Merge Strategy
//! Mappings merge recursively; every other value (lists included) is
//! replaced by the later layer.
//!
//! ## File Format
//! JSON with `//` line comments and trailing commas tolerated on read.
//! Written back as UTF-8 JSON with 4-space indentation.
//!
//! ## Environment Variables
//! - `MYCROFT_SYSTEM_CONFIG` - System layer file
//! - `MYCROFT_USER_CONFIG` - User layer file
//! - `MYCROFT_DEFAULT_CONFIG` - Probed before the built-in default locations

mod layer;
mod loader;
mod merge;
pub mod parse;
pub mod watcher;

pub use layer::{ConfigLayer, LayerOrigin, expand_home, to_pretty_json};
pub(crate) use layer::write_tree;
pub use loader::{ConfigStack, DEFAULT_CONFIG_CANDIDATES, DEFAULT_PRODUCT, LayerPaths};
pub use merge::{deep_merge, deep_merge_all, merge_into};
pub use parse::{parse_config_file, parse_config_str};
