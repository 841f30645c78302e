//! Settings-meta descriptors for rendering a skill's settings as a form.

use heck::ToTitleCase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the single section emitted for a settings document.
pub const SETTINGS_SECTION: &str = "settings";

/// Form widget used to edit a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Checkbox,
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSection {
    pub name: String,
    pub fields: Vec<MetaField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub sections: Vec<MetaSection>,
}

/// Top-level descriptor: `{"skillMetadata": {"sections": [...]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsMeta {
    #[serde(rename = "skillMetadata")]
    pub skill_metadata: SkillMetadata,
}

impl SettingsMeta {
    /// Describe every public top-level key of `data`.
    ///
    /// Keys starting with `_` are private and skipped. Booleans become
    /// checkboxes, strings text fields and integers number fields; floats,
    /// lists, mappings and null have no widget and are omitted.
    pub fn describe(data: &Map<String, Value>) -> Self {
        let fields = data
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter_map(|(key, value)| field_for(key, value))
            .collect();

        Self {
            skill_metadata: SkillMetadata {
                sections: vec![MetaSection {
                    name: SETTINGS_SECTION.to_string(),
                    fields,
                }],
            },
        }
    }

    /// All fields across sections, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &MetaField> {
        self.skill_metadata
            .sections
            .iter()
            .flat_map(|section| section.fields.iter())
    }
}

fn field_for(key: &str, value: &Value) -> Option<MetaField> {
    let (field_type, rendered) = match value {
        Value::Bool(b) => (FieldType::Checkbox, b.to_string()),
        Value::String(s) => (FieldType::Text, s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => (FieldType::Number, n.to_string()),
        _ => return None,
    };
    Some(MetaField {
        name: key.to_string(),
        field_type,
        label: label_for(key),
        value: rendered,
    })
}

/// `wake_word-sound` → `Wake Word Sound`.
pub fn label_for(key: &str) -> String {
    key.replace(['_', '-'], " ").to_title_case()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_field_types_and_order() {
        let data = obj(json!({
            "flag": true,
            "name": "x",
            "count": 3,
            "_hidden": 1,
            "ratio": 0.5
        }));
        let meta = SettingsMeta::describe(&data);
        let fields: Vec<&MetaField> = meta.fields().collect();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "flag");
        assert_eq!(fields[0].field_type, FieldType::Checkbox);
        assert_eq!(fields[0].value, "true");
        assert_eq!(fields[1].name, "name");
        assert_eq!(fields[1].field_type, FieldType::Text);
        assert_eq!(fields[2].name, "count");
        assert_eq!(fields[2].field_type, FieldType::Number);
        assert_eq!(fields[2].value, "3");
    }

    #[test]
    fn test_lists_maps_and_null_omitted() {
        let data = obj(json!({"l": [1], "m": {"a": 1}, "n": null}));
        assert_eq!(SettingsMeta::describe(&data).fields().count(), 0);
    }

    #[test]
    fn test_labels() {
        assert_eq!(label_for("k"), "K");
        assert_eq!(label_for("wake_word"), "Wake Word");
        assert_eq!(label_for("volume-level"), "Volume Level");
    }

    #[test]
    fn test_serialized_shape() {
        let meta = SettingsMeta::describe(&obj(json!({"k": "v"})));
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"skillMetadata": {"sections": [{
                "name": "settings",
                "fields": [{"name": "k", "type": "text", "label": "K", "value": "v"}]
            }]}})
        );
    }
}
