//! Layer discovery and the configuration stack.
//!
//! The effective configuration is DEFAULT ← SYSTEM ← USER ← overrides, merged
//! field-by-field in that fixed order.

use super::layer::{ConfigLayer, LayerOrigin, expand_home};
use super::merge::deep_merge_all;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Product name used to build the canonical layer paths.
pub const DEFAULT_PRODUCT: &str = "mycroft";

/// Installation roots probed, in order, for the factory-default file.
pub const DEFAULT_CONFIG_CANDIDATES: &[&str] = &[
    "/opt/venvs/mycroft-core/lib/python3.7/site-packages/mycroft/configuration/mycroft.conf",
    "/opt/venvs/mycroft-core/lib/python3.4/site-packages/mycroft/configuration/mycroft.conf",
    "/home/pi/mycroft-core/mycroft/configuration/mycroft.conf",
];

/// Locations of each on-disk layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    /// Machine-wide configuration file
    pub system: Option<PathBuf>,
    /// Per-user configuration file
    pub user: Option<PathBuf>,
    /// Factory-default candidates; the first existing file wins
    pub default_candidates: Vec<PathBuf>,
}

impl Default for LayerPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl LayerPaths {
    /// Canonical paths for `mycroft`, with environment overrides applied.
    ///
    /// - `MYCROFT_SYSTEM_CONFIG` replaces the system file
    /// - `MYCROFT_USER_CONFIG` replaces the user file
    /// - `MYCROFT_DEFAULT_CONFIG` is probed before the built-in candidates
    pub fn discover() -> Self {
        let mut paths = Self::for_product(DEFAULT_PRODUCT);

        if let Ok(system) = std::env::var("MYCROFT_SYSTEM_CONFIG") {
            paths.system = Some(expand_home(Path::new(&system)));
        }
        if let Ok(user) = std::env::var("MYCROFT_USER_CONFIG") {
            paths.user = Some(expand_home(Path::new(&user)));
        }
        if let Ok(default) = std::env::var("MYCROFT_DEFAULT_CONFIG") {
            paths.default_candidates.insert(0, expand_home(Path::new(&default)));
        }

        paths
    }

    /// `/etc/<product>/<product>.conf` and `~/.<product>/<product>.conf`.
    pub fn for_product(product: &str) -> Self {
        let file_name = format!("{product}.conf");
        let system = PathBuf::from("/etc").join(product).join(&file_name);
        let user = dirs::home_dir().map(|home| home.join(format!(".{product}")).join(&file_name));

        Self {
            system: Some(system),
            user,
            default_candidates: DEFAULT_CONFIG_CANDIDATES.iter().map(PathBuf::from).collect(),
        }
    }

    /// Explicit paths, mostly for tests and embedding. `~` is expanded.
    pub fn with_files(
        default_candidates: Vec<PathBuf>,
        system: Option<PathBuf>,
        user: Option<PathBuf>,
    ) -> Self {
        Self {
            system: system.map(|p| expand_home(&p)),
            user: user.map(|p| expand_home(&p)),
            default_candidates: default_candidates.iter().map(|p| expand_home(p)).collect(),
        }
    }

    /// First default candidate that exists as a regular file, with `~` expanded.
    pub fn resolve_default(&self) -> Option<PathBuf> {
        self.default_candidates
            .iter()
            .map(|path| expand_home(path))
            .find(|path| path.is_file())
    }
}

/// The ordered set of layers that make up the effective configuration.
#[derive(Debug, Clone)]
pub struct ConfigStack {
    default: ConfigLayer,
    system: ConfigLayer,
    user: ConfigLayer,
    overrides: ConfigLayer,
}

impl ConfigStack {
    /// Load every layer from the discovered canonical paths.
    pub fn load() -> Self {
        Self::load_with_paths(&LayerPaths::discover())
    }

    /// Load every layer from explicit paths.
    pub fn load_with_paths(paths: &LayerPaths) -> Self {
        let default = match paths.resolve_default() {
            Some(path) => {
                info!(path = %path.display(), "Using default configuration");
                ConfigLayer::open(path, LayerOrigin::Default)
            }
            None => {
                warn!(
                    candidates = paths.default_candidates.len(),
                    "No default configuration found"
                );
                ConfigLayer::empty(LayerOrigin::Default)
            }
        };

        let system = read_only(ConfigLayer::open_optional(
            paths.system.as_deref(),
            LayerOrigin::System,
        ));
        let user = ConfigLayer::open_optional(paths.user.as_deref(), LayerOrigin::User);

        Self {
            default: read_only(default),
            system,
            user,
            overrides: ConfigLayer::ephemeral(),
        }
    }

    /// Build a stack from layers that are already loaded.
    pub fn from_layers(default: ConfigLayer, system: ConfigLayer, user: ConfigLayer) -> Self {
        Self {
            default,
            system,
            user,
            overrides: ConfigLayer::ephemeral(),
        }
    }

    /// The merged view of DEFAULT, SYSTEM, USER and in-memory overrides.
    pub fn effective(&self) -> Map<String, Value> {
        deep_merge_all([
            self.default.tree().clone(),
            self.system.tree().clone(),
            self.user.tree().clone(),
            self.overrides.tree().clone(),
        ])
    }

    /// The merged view wrapped as a writable ephemeral layer.
    ///
    /// Pass it to [`ConfigStack::store`] without a path to persist it into
    /// the USER layer.
    pub fn effective_layer(&self) -> ConfigLayer {
        ConfigLayer::from_tree(self.effective())
    }

    /// Top-level value from the effective view.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.effective().shift_remove(key)
    }

    /// Value at a dotted path such as `tts.module`.
    pub fn lookup(&self, dotted: &str) -> Option<Value> {
        let effective = Value::Object(self.effective());
        let mut node = &effective;
        for part in dotted.split('.') {
            node = node.as_object()?.get(part)?;
        }
        Some(node.clone())
    }

    /// Persist `layer` to `path`, or to its own path.
    ///
    /// A layer without any path is redirected: its content is merged into
    /// the USER layer, which is then stored.
    pub fn store(&mut self, layer: &ConfigLayer, path: Option<&Path>) -> ConfigResult<PathBuf> {
        layer.ensure_writable()?;
        if path.is_some() || layer.path().is_some() {
            return layer.store(path);
        }

        if self.user.path().is_none() {
            return Err(ConfigError::NoUserLayer);
        }
        debug!("Redirecting store of path-less layer to user configuration");
        self.user.merge(layer.tree().clone())?;
        self.user.store(None)
    }

    /// Merge `tree` into the USER layer, or into the file at `path`, and store it.
    pub fn update_user(
        &mut self,
        tree: Map<String, Value>,
        path: Option<&Path>,
    ) -> ConfigResult<PathBuf> {
        match path {
            None => {
                self.user.merge(tree)?;
                self.user.store(None)
            }
            Some(path) => {
                let mut layer = ConfigLayer::open(path, LayerOrigin::Ephemeral);
                layer.merge(tree)?;
                layer.store(None)
            }
        }
    }

    /// Point the DEFAULT layer at `path` and reload it.
    pub fn set_default_root(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "Replacing default configuration root");
        self.default.repoint(Some(path));
    }

    /// Assign an in-memory override applied after the USER layer.
    pub fn set_override(&mut self, key: impl Into<String>, value: Value) -> ConfigResult<()> {
        self.overrides.set(key, value)
    }

    pub fn clear_overrides(&mut self) {
        self.overrides = ConfigLayer::ephemeral();
    }

    /// Reload every on-disk layer.
    pub fn reload(&mut self) {
        self.default.reload();
        self.system.reload();
        self.user.reload();
    }

    /// Reload a single layer.
    pub fn reload_origin(&mut self, origin: LayerOrigin) {
        match origin {
            LayerOrigin::Default => self.default.reload(),
            LayerOrigin::System => self.system.reload(),
            LayerOrigin::User => self.user.reload(),
            LayerOrigin::Ephemeral => {}
        }
        debug!(origin = %origin, "Reloaded configuration layer");
    }

    /// Borrow a layer by origin. `Ephemeral` yields the overrides layer.
    pub fn layer(&self, origin: LayerOrigin) -> &ConfigLayer {
        match origin {
            LayerOrigin::Default => &self.default,
            LayerOrigin::System => &self.system,
            LayerOrigin::User => &self.user,
            LayerOrigin::Ephemeral => &self.overrides,
        }
    }

    /// Mutable access to a layer. Read-only layers still reject writes.
    pub fn layer_mut(&mut self, origin: LayerOrigin) -> &mut ConfigLayer {
        match origin {
            LayerOrigin::Default => &mut self.default,
            LayerOrigin::System => &mut self.system,
            LayerOrigin::User => &mut self.user,
            LayerOrigin::Ephemeral => &mut self.overrides,
        }
    }

    /// Files currently backing the on-disk layers, with their origins.
    pub fn layer_files(&self) -> Vec<(LayerOrigin, PathBuf)> {
        [&self.default, &self.system, &self.user]
            .into_iter()
            .filter_map(|layer| layer.path().map(|p| (layer.origin(), p.to_path_buf())))
            .collect()
    }
}

fn read_only(layer: ConfigLayer) -> ConfigLayer {
    layer.with_writable(false)
}
