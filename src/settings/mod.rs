//! Per-skill private settings.
//!
//! Each skill owns one JSON document at
//! `${XDG_CACHE_HOME:-$HOME/.cache}/json_database/<skill_id>.json`. The store
//! is the sole writer of that file within a process; nothing coordinates
//! writers across processes, so the last one to store wins.
//!
//! For scoped use, [`ScopedSettings`] stores the document when it goes out
//! of scope, including during panic unwinding.

pub mod meta;

pub use meta::{FieldType, MetaField, MetaSection, SettingsMeta, SkillMetadata};

use crate::config::write_tree;
use crate::config::parse::parse_config_tree;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Directory under the cache root that holds settings documents.
pub const SETTINGS_NAMESPACE: &str = "json_database";

/// Root directory for settings documents.
///
/// `ASSISTANT_SETTINGS_DIR` wins; otherwise `<xdg cache>/json_database`.
pub fn settings_root() -> PathBuf {
    if let Ok(dir) = std::env::var("ASSISTANT_SETTINGS_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(SETTINGS_NAMESPACE)
}

/// A skill's private settings document.
#[derive(Debug, Clone)]
pub struct SkillSettings {
    skill_id: String,
    path: PathBuf,
    data: Map<String, Value>,
}

impl SkillSettings {
    /// Open the settings for `skill_id` under the default root.
    pub fn open(skill_id: &str) -> ConfigResult<Self> {
        Self::open_in(settings_root(), skill_id)
    }

    /// Open the settings for `skill_id` under `root`.
    ///
    /// A missing or unreadable document opens empty.
    pub fn open_in(root: impl AsRef<Path>, skill_id: &str) -> ConfigResult<Self> {
        validate_skill_id(skill_id)?;
        let path = root.as_ref().join(format!("{skill_id}.json"));
        let data = load_document(&path).unwrap_or_default();
        Ok(Self {
            skill_id: skill_id.to_string(),
            path,
            data,
        })
    }

    /// Open scoped settings that store themselves when dropped.
    pub fn scoped(skill_id: &str) -> ConfigResult<ScopedSettings> {
        Self::open(skill_id).map(ScopedSettings::new)
    }

    pub fn scoped_in(root: impl AsRef<Path>, skill_id: &str) -> ConfigResult<ScopedSettings> {
        Self::open_in(root, skill_id).map(ScopedSettings::new)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn skill_id(&self) -> &str {
        &self.skill_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the document, creating parent directories on demand.
    pub fn store(&self) -> ConfigResult<()> {
        write_tree(&self.path, &self.data)?;
        debug!(skill_id = %self.skill_id, path = %self.path.display(), "Stored skill settings");
        Ok(())
    }

    /// Replace in-memory data with the document on disk.
    pub fn reload(&mut self) {
        self.data = load_document(&self.path).unwrap_or_default();
    }

    /// Form descriptor for the current values.
    pub fn settingsmeta(&self) -> SettingsMeta {
        SettingsMeta::describe(&self.data)
    }
}

/// Settings that are stored when they go out of scope.
///
/// Dropping cannot report errors, so a failed store on drop is logged. Call
/// [`ScopedSettings::finish`] to store and see the error instead.
#[derive(Debug)]
pub struct ScopedSettings {
    settings: SkillSettings,
    released: bool,
}

impl ScopedSettings {
    fn new(settings: SkillSettings) -> Self {
        Self {
            settings,
            released: false,
        }
    }

    /// Store now and release the scope.
    pub fn finish(mut self) -> ConfigResult<()> {
        self.released = true;
        self.settings.store()
    }
}

impl Deref for ScopedSettings {
    type Target = SkillSettings;

    fn deref(&self) -> &SkillSettings {
        &self.settings
    }
}

impl DerefMut for ScopedSettings {
    fn deref_mut(&mut self) -> &mut SkillSettings {
        &mut self.settings
    }
}

impl Drop for ScopedSettings {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.settings.store() {
            error!(
                skill_id = %self.settings.skill_id,
                error = %e,
                "Failed to store skill settings on scope exit"
            );
        }
    }
}

/// Run `f` against the settings for `skill_id` and store them afterwards,
/// whether `f` succeeded or not.
///
/// The closure's error takes precedence over a store error.
pub fn with_settings<T, E, F>(root: impl AsRef<Path>, skill_id: &str, f: F) -> Result<T, E>
where
    F: FnOnce(&mut SkillSettings) -> Result<T, E>,
    E: From<ConfigError>,
{
    let mut settings = SkillSettings::open_in(root, skill_id)?;
    let outcome = f(&mut settings);
    let stored = settings.store();
    let value = outcome?;
    stored?;
    Ok(value)
}

fn validate_skill_id(skill_id: &str) -> ConfigResult<()> {
    let invalid = skill_id.is_empty()
        || skill_id == "."
        || skill_id.contains("..")
        || skill_id.contains('/')
        || skill_id.contains('\\');
    if invalid {
        return Err(ConfigError::InvalidSkillId(skill_id.to_string()));
    }
    Ok(())
}

fn load_document(path: &Path) -> Option<Map<String, Value>> {
    if !path.is_file() {
        debug!(path = %path.display(), "Skill settings not found, starting empty");
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read skill settings");
            return None;
        }
    };
    match parse_config_tree(&content) {
        Ok(data) => Some(data),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to parse skill settings");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let settings = SkillSettings::open_in(temp.path(), "test.author").unwrap();
        assert!(settings.is_empty());
        assert_eq!(settings.path(), temp.path().join("test.author.json"));
    }

    #[test]
    fn test_store_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache/json_database");
        let mut settings = SkillSettings::open_in(&root, "weather.someone").unwrap();
        settings.set("units", json!("metric"));
        settings.store().unwrap();

        let reopened = SkillSettings::open_in(&root, "weather.someone").unwrap();
        assert_eq!(reopened.get("units"), Some(&json!("metric")));
    }

    #[test]
    fn test_remove_and_contains() {
        let temp = TempDir::new().unwrap();
        let mut settings = SkillSettings::open_in(temp.path(), "a.b").unwrap();
        settings.set("k", json!(1));
        assert!(settings.contains_key("k"));
        assert_eq!(settings.remove("k"), Some(json!(1)));
        assert!(!settings.contains_key("k"));
    }

    #[test]
    fn test_invalid_skill_ids_rejected() {
        let temp = TempDir::new().unwrap();
        for id in ["", ".", "../escape", "a/b", "a\\b"] {
            assert!(
                matches!(
                    SkillSettings::open_in(temp.path(), id),
                    Err(ConfigError::InvalidSkillId(_))
                ),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_scope_exit_stores() {
        let temp = TempDir::new().unwrap();
        {
            let mut scoped = SkillSettings::scoped_in(temp.path(), "test.author").unwrap();
            scoped.set("k", json!("v"));
        }
        let reopened = SkillSettings::open_in(temp.path(), "test.author").unwrap();
        assert_eq!(reopened.get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_scope_exit_on_panic_stores() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let mut scoped = SkillSettings::scoped_in(&root, "panicky.skill").unwrap();
            scoped.set("k", json!(7));
            panic!("boom");
        });
        assert!(result.is_err());

        let reopened = SkillSettings::open_in(temp.path(), "panicky.skill").unwrap();
        assert_eq!(reopened.get("k"), Some(&json!(7)));
    }

    #[test]
    fn test_finish_stores() {
        let temp = TempDir::new().unwrap();
        let mut scoped = SkillSettings::scoped_in(temp.path(), "x.y").unwrap();
        scoped.set("n", json!(2));
        scoped.finish().unwrap();

        let reopened = SkillSettings::open_in(temp.path(), "x.y").unwrap();
        assert_eq!(reopened.get("n"), Some(&json!(2)));
    }

    #[test]
    fn test_with_settings_stores_on_error() {
        let temp = TempDir::new().unwrap();
        let result: Result<(), anyhow::Error> = with_settings(temp.path(), "err.skill", |s| {
            s.set("k", json!(true));
            anyhow::bail!("failed midway")
        });
        assert!(result.is_err());

        let reopened = SkillSettings::open_in(temp.path(), "err.skill").unwrap();
        assert_eq!(reopened.get("k"), Some(&json!(true)));
    }

    #[test]
    fn test_reload_picks_up_external_write() {
        let temp = TempDir::new().unwrap();
        let mut settings = SkillSettings::open_in(temp.path(), "r.s").unwrap();
        std::fs::write(settings.path(), r#"{"a": 1}"#).unwrap();
        settings.reload();
        assert_eq!(settings.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_settingsmeta_from_store() {
        let temp = TempDir::new().unwrap();
        let mut settings = SkillSettings::open_in(temp.path(), "m.s").unwrap();
        settings.set("enabled", json!(false));
        let meta = settings.settingsmeta();
        let field = meta.fields().next().unwrap();
        assert_eq!(field.field_type, FieldType::Checkbox);
        assert_eq!(field.value, "false");
        assert_eq!(field.label, "Enabled");
    }
}
