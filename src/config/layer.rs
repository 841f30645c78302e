//! A single configuration layer: a keyed tree backed by an optional file.
//!
//! Writability is a flag on the record, not a separate type. Every mutating
//! operation goes through [`ConfigLayer::ensure_writable`], so a read-only
//! layer rejects `set`, `remove`, `merge` and `store` while still allowing
//! `reload`.

use super::merge::merge_into;
use super::parse::parse_config_tree;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Where a layer sits in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerOrigin {
    /// Factory defaults shipped with the installation (lowest priority)
    Default,
    /// Machine-wide configuration under `/etc`
    System,
    /// Per-user configuration under `$HOME`
    User,
    /// In-memory layer with no backing file of its own
    Ephemeral,
}

impl LayerOrigin {
    /// Whether layers of this origin accept writes unless told otherwise.
    pub fn writable_by_default(self) -> bool {
        matches!(self, LayerOrigin::User | LayerOrigin::Ephemeral)
    }
}

impl std::fmt::Display for LayerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerOrigin::Default => write!(f, "default"),
            LayerOrigin::System => write!(f, "system"),
            LayerOrigin::User => write!(f, "user"),
            LayerOrigin::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Outcome of reading a layer file from disk.
enum LoadOutcome {
    Loaded(Map<String, Value>),
    Missing,
    Failed,
}

/// A configuration tree plus where it came from and whether it may change.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    path: Option<PathBuf>,
    origin: LayerOrigin,
    writable: bool,
    tree: Map<String, Value>,
}

impl ConfigLayer {
    /// Open a layer backed by `path`.
    ///
    /// `~` is expanded to the home directory. Missing files and parse
    /// failures are logged and produce an empty tree; construction never
    /// fails.
    pub fn open(path: impl AsRef<Path>, origin: LayerOrigin) -> Self {
        let path = expand_home(path.as_ref());
        let tree = match load_tree(&path) {
            LoadOutcome::Loaded(tree) => tree,
            LoadOutcome::Missing | LoadOutcome::Failed => Map::new(),
        };
        Self {
            path: Some(path),
            origin,
            writable: origin.writable_by_default(),
            tree,
        }
    }

    /// Open a layer if a path is given, otherwise return an empty one.
    pub fn open_optional(path: Option<&Path>, origin: LayerOrigin) -> Self {
        match path {
            Some(path) => Self::open(path, origin),
            None => Self::empty(origin),
        }
    }

    /// Empty layer of the given origin with no backing file.
    pub fn empty(origin: LayerOrigin) -> Self {
        Self {
            path: None,
            origin,
            writable: origin.writable_by_default(),
            tree: Map::new(),
        }
    }

    /// Empty, writable layer with no backing file.
    pub fn ephemeral() -> Self {
        Self::from_tree(Map::new())
    }

    /// Writable ephemeral layer holding `tree`.
    pub fn from_tree(tree: Map<String, Value>) -> Self {
        Self {
            path: None,
            origin: LayerOrigin::Ephemeral,
            writable: true,
            tree,
        }
    }

    /// Override the writability implied by the origin.
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Re-read the backing file, replacing the tree.
    ///
    /// Permitted on read-only layers. A parse failure keeps the previous
    /// tree; a file that has disappeared leaves the layer empty.
    pub fn reload(&mut self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match load_tree(path) {
            LoadOutcome::Loaded(tree) => self.tree = tree,
            LoadOutcome::Missing => self.tree.clear(),
            LoadOutcome::Failed => {}
        }
    }

    /// Fail with `NotWritable` unless this layer accepts writes.
    pub fn ensure_writable(&self) -> ConfigResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(ConfigError::not_writable(self.origin, self.path.clone()))
        }
    }

    /// Assign a top-level key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> ConfigResult<()> {
        self.ensure_writable()?;
        self.tree.insert(key.into(), value);
        Ok(())
    }

    /// Remove a top-level key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> ConfigResult<Option<Value>> {
        self.ensure_writable()?;
        Ok(self.tree.shift_remove(key))
    }

    /// Deep-merge `other` into this layer's tree.
    pub fn merge(&mut self, other: Map<String, Value>) -> ConfigResult<&mut Self> {
        self.ensure_writable()?;
        merge_into(&mut self.tree, other);
        Ok(self)
    }

    /// Write the tree to `path`, or to this layer's own path.
    ///
    /// Output is UTF-8 JSON with 4-space indentation and non-ASCII characters
    /// written literally. Parent directories are created as needed. Returns
    /// the path written.
    pub fn store(&self, path: Option<&Path>) -> ConfigResult<PathBuf> {
        self.ensure_writable()?;
        let target = match path {
            Some(path) => expand_home(path),
            None => self.path.clone().ok_or(ConfigError::NoUserLayer)?,
        };
        write_tree(&target, &self.tree)?;
        debug!(path = %target.display(), origin = %self.origin, "Stored configuration layer");
        Ok(target)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }

    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    pub fn into_tree(self) -> Map<String, Value> {
        self.tree
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn origin(&self) -> LayerOrigin {
        self.origin
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Point the layer at a different file and load it.
    pub(crate) fn repoint(&mut self, path: Option<PathBuf>) {
        self.path = path.map(|p| expand_home(&p));
        match self.path.as_deref().map(load_tree) {
            Some(LoadOutcome::Loaded(tree)) => self.tree = tree,
            _ => self.tree.clear(),
        }
    }
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

/// Serialize a tree as 4-space indented JSON and write it, creating parents.
pub(crate) fn write_tree(path: &Path, tree: &Map<String, Value>) -> ConfigResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }
    let content = to_pretty_json(tree)?;
    std::fs::write(path, content).map_err(|e| ConfigError::io(path, e))
}

/// Render a tree with 4-space indentation.
pub fn to_pretty_json(tree: &Map<String, Value>) -> ConfigResult<String> {
    use serde::Serialize;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    tree.serialize(&mut ser)?;
    // serde_json only ever emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn load_tree(path: &Path) -> LoadOutcome {
    if !path.is_file() {
        debug!(path = %path.display(), "Configuration file not found");
        return LoadOutcome::Missing;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read configuration file");
            return LoadOutcome::Failed;
        }
    };
    match parse_config_tree(&content) {
        Ok(tree) => {
            debug!(path = %path.display(), keys = tree.len(), "Loaded configuration file");
            LoadOutcome::Loaded(tree)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to parse configuration file");
            LoadOutcome::Failed
        }
    }
}
