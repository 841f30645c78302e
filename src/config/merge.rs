//! Deep merge for configuration trees.
//!
//! Later layers override earlier ones field-by-field. Lists are replaced
//! entirely, not concatenated.

use serde_json::{Map, Value};

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans and nulls in overlay replace base
///
/// # Example
/// ```
/// use serde_json::json;
/// use assistant_support::config::deep_merge;
///
/// let base = json!({"a": {"x": 1, "y": 2}, "list": [1, 2]});
/// let overlay = json!({"a": {"x": 9}, "list": [3]});
/// let result = deep_merge(base, overlay);
/// assert_eq!(result, json!({"a": {"x": 9, "y": 2}, "list": [3]}));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            merge_into(&mut base_map, overlay_map);
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge `overlay` into `base` in place.
///
/// Existing keys keep their position; new keys are appended.
pub fn merge_into(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(&key), overlay_value) {
            (Some(Value::Object(base_child)), Value::Object(overlay_child)) => {
                merge_into(base_child, overlay_child);
            }
            (Some(slot), overlay_value) => *slot = overlay_value,
            (None, overlay_value) => {
                base.insert(key, overlay_value);
            }
        }
    }
}

/// Merge multiple trees in order, with later trees taking precedence.
pub fn deep_merge_all<I>(trees: I) -> Map<String, Value>
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    trees.into_iter().fold(Map::new(), |mut acc, tree| {
        merge_into(&mut acc, tree);
        acc
    })
}
