//! Integration tests for the layered configuration stack.
//!
//! Covers overlay order, read-only enforcement, reload of read-only layers,
//! store round-trips, comment tolerance and store redirection.

use assistant_support::config::{
    ConfigLayer, ConfigStack, LayerOrigin, LayerPaths, deep_merge, parse_config_file,
    parse_config_str,
};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Layer paths rooted in a temp directory: (default, system, user).
fn layer_paths(temp: &TempDir) -> (LayerPaths, PathBuf, PathBuf, PathBuf) {
    let default = temp.path().join("opt/mycroft/mycroft.conf");
    let system = temp.path().join("etc/mycroft/mycroft.conf");
    let user = temp.path().join("home/.mycroft/mycroft.conf");
    let paths = LayerPaths::with_files(
        vec![default.clone()],
        Some(system.clone()),
        Some(user.clone()),
    );
    (paths, default, system, user)
}

#[test]
fn effective_view_default_overlaid_by_user() {
    let temp = TempDir::new().unwrap();
    let (paths, default, _system, user) = layer_paths(&temp);
    write(&default, r#"{"lang":"en-us","tts":{"module":"a","rate":100}}"#);
    write(&user, r#"{"tts":{"module":"b"}}"#);

    let stack = ConfigStack::load_with_paths(&paths);

    assert_eq!(
        Value::Object(stack.effective()),
        json!({"lang":"en-us","tts":{"module":"b","rate":100}})
    );
}

#[test]
fn effective_view_equals_positional_fold() {
    let temp = TempDir::new().unwrap();
    let (paths, default, system, user) = layer_paths(&temp);
    let a = json!({"x": {"p": 1, "q": [1, 2]}, "y": 1});
    let b = json!({"x": {"q": [3]}, "z": true});
    let c = json!({"x": {"p": 2}, "y": null});
    write(&default, &a.to_string());
    write(&system, &b.to_string());
    write(&user, &c.to_string());

    let stack = ConfigStack::load_with_paths(&paths);
    let expected = deep_merge(deep_merge(a, b), c);

    assert_eq!(Value::Object(stack.effective()), expected);
    assert_eq!(expected["x"]["q"], json!([3]));
}

#[test]
fn read_only_layers_reject_every_mutation() {
    let temp = TempDir::new().unwrap();
    let (paths, default, system, _user) = layer_paths(&temp);
    write(&default, r#"{"d": 1}"#);
    write(&system, r#"{"s": 1}"#);
    let mut stack = ConfigStack::load_with_paths(&paths);

    for origin in [LayerOrigin::Default, LayerOrigin::System] {
        let before = stack.layer(origin).clone();
        let layer = stack.layer_mut(origin);

        assert!(layer.set("x", json!(1)).unwrap_err().is_not_writable());
        assert!(layer.merge(obj(json!({"x": 1}))).unwrap_err().is_not_writable());
        assert!(layer.remove("d").unwrap_err().is_not_writable());
        assert!(layer.store(None).unwrap_err().is_not_writable());

        assert_eq!(stack.layer(origin), &before);
    }

    assert_eq!(fs::read_to_string(&default).unwrap(), r#"{"d": 1}"#);
    assert_eq!(fs::read_to_string(&system).unwrap(), r#"{"s": 1}"#);
}

#[test]
fn system_layer_merge_fails_and_keeps_tree() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("etc/mycroft.conf");
    write(&path, r#"{"a": 1}"#);
    let mut system = ConfigLayer::open(&path, LayerOrigin::System);

    let err = system.merge(obj(json!({"x": 1}))).unwrap_err();

    assert!(err.is_not_writable());
    assert_eq!(system.tree(), &obj(json!({"a": 1})));
}

#[test]
fn reload_on_read_only_layer_sees_out_of_band_update() {
    let temp = TempDir::new().unwrap();
    let (paths, _default, system, _user) = layer_paths(&temp);
    write(&system, r#"{"lang": "en-us"}"#);
    let mut stack = ConfigStack::load_with_paths(&paths);

    write(&system, r#"{"lang": "es-es"}"#);
    stack.layer_mut(LayerOrigin::System).reload();

    assert_eq!(stack.get("lang"), Some(json!("es-es")));
}

#[test]
fn stack_reload_sees_every_layer_change() {
    let temp = TempDir::new().unwrap();
    let (paths, default, system, user) = layer_paths(&temp);
    write(&default, r#"{"d": 1, "shared": "default"}"#);
    write(&system, r#"{"s": 1, "shared": "system"}"#);
    write(&user, r#"{"u": 1, "shared": "user"}"#);
    let mut stack = ConfigStack::load_with_paths(&paths);

    write(&default, r#"{"d": 2, "shared": "default"}"#);
    write(&system, r#"{"s": 2}"#);
    fs::remove_file(&user).unwrap();
    stack.reload();

    assert_eq!(
        Value::Object(stack.effective()),
        json!({"d": 2, "shared": "default", "s": 2})
    );
    assert!(stack.layer(LayerOrigin::User).is_empty());
}

#[test]
fn store_then_open_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("round/trip.conf");
    let tree = obj(json!({
        "s": "olá 🌍",
        "n": 3,
        "f": 1.5,
        "b": false,
        "z": null,
        "l": [1, "two", {"three": 3}],
        "m": {"nested": {"deep": []}}
    }));

    let mut layer = ConfigLayer::open(&path, LayerOrigin::User);
    layer.merge(tree.clone()).unwrap();
    layer.store(None).unwrap();

    let reopened = ConfigLayer::open(&path, LayerOrigin::User);
    assert_eq!(reopened.tree(), &tree);
}

#[test]
fn writable_layer_at_nested_missing_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("q/w/e.json");

    let mut layer = ConfigLayer::open(&path, LayerOrigin::User);
    layer.set("x", json!(1)).unwrap();
    layer.store(None).unwrap();

    let stored = parse_config_file(&path).unwrap();
    assert_eq!(stored, obj(json!({"x": 1})));
}

#[test]
fn comment_lines_are_ignored() {
    let temp = TempDir::new().unwrap();
    let commented = temp.path().join("commented.conf");
    let plain = temp.path().join("plain.conf");
    write(
        &commented,
        "// header comment\n{\n    // the language\n    \"lang\": \"en-us\",\n    \"url\": \"http://x//y\"\n}\n",
    );
    write(&plain, "{\n    \"lang\": \"en-us\",\n    \"url\": \"http://x//y\"\n}\n");

    let a = ConfigLayer::open(&commented, LayerOrigin::User);
    let b = ConfigLayer::open(&plain, LayerOrigin::User);
    assert_eq!(a.tree(), b.tree());
    assert_eq!(parse_config_str("// a comment\n{\"a\":1}\n").unwrap(), json!({"a": 1}));
}

#[test]
fn store_of_merged_view_redirects_to_user() {
    let temp = TempDir::new().unwrap();
    let (paths, default, system, user) = layer_paths(&temp);
    write(&default, r#"{"a": 1}"#);
    write(&system, r#"{"b": 2}"#);
    let mut stack = ConfigStack::load_with_paths(&paths);

    let mut merged = stack.effective_layer();
    merged.set("c", json!(3)).unwrap();
    let written = stack.store(&merged, None).unwrap();

    assert_eq!(written, user);
    assert_eq!(fs::read_to_string(&default).unwrap(), r#"{"a": 1}"#);
    assert_eq!(fs::read_to_string(&system).unwrap(), r#"{"b": 2}"#);
    let stored = parse_config_file(&user).unwrap();
    assert_eq!(stored.get("c"), Some(&json!(3)));
}

#[test]
fn missing_files_yield_empty_layers() {
    let temp = TempDir::new().unwrap();
    let (paths, _, _, _) = layer_paths(&temp);

    let stack = ConfigStack::load_with_paths(&paths);

    assert!(stack.effective().is_empty());
    assert!(stack.layer(LayerOrigin::Default).path().is_none());
}

#[test]
fn malformed_user_file_does_not_fail_construction() {
    let temp = TempDir::new().unwrap();
    let (paths, default, _, user) = layer_paths(&temp);
    write(&default, r#"{"a": 1}"#);
    write(&user, "{ this is not json");

    let stack = ConfigStack::load_with_paths(&paths);

    assert!(stack.layer(LayerOrigin::User).is_empty());
    assert_eq!(stack.get("a"), Some(json!(1)));
}
