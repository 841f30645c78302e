//! Comment-tolerant JSON parsing for configuration files.
//!
//! Configuration files are plain JSON with two relaxations: `//` line comments
//! may appear anywhere outside string literals, and a trailing comma before a
//! closing `}` or `]` is accepted. Both are stripped before structural parsing.

use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;

/// Remove `//` comments that occur outside string literals.
///
/// The newline ending a comment is kept so that line numbers in parse errors
/// still point at the right place.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Skip to end of line
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Remove commas that follow a value and directly precede a closing `}` or `]`.
///
/// A comma with no value before it (`{,}`, `[1,,]`) is left for the parser to
/// reject.
pub fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    // Last significant character written outside whitespace
    let mut prev: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            prev = Some(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' && prev.is_some_and(ends_value) {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
        if !c.is_whitespace() {
            prev = Some(c);
        }
    }

    out
}

fn ends_value(c: char) -> bool {
    !matches!(c, '{' | '[' | ',' | ':')
}

/// Parse configuration text into a JSON value.
pub fn parse_config_str(input: &str) -> Result<Value, serde_json::Error> {
    let cleaned = strip_trailing_commas(&strip_comments(input));
    serde_json::from_str(&cleaned)
}

/// Parse configuration text that must hold a top-level mapping.
///
/// Blank input (or input that is only comments) yields an empty mapping.
pub fn parse_config_tree(input: &str) -> Result<Map<String, Value>, serde_json::Error> {
    let cleaned = strip_trailing_commas(&strip_comments(input));
    if cleaned.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&cleaned)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::de::Error::custom(format!(
            "expected a JSON object at top level, found {}",
            value_kind(&other)
        ))),
    }
}

/// Read and parse a configuration file, surfacing every failure.
pub fn parse_config_file(path: &Path) -> ConfigResult<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    parse_config_tree(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
