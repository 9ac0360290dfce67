//! YAML emitter for compiled models
//!
//! `serde_yaml` writes every sequence one element per line, which turns a
//! few hundred bins into a few hundred lines. This emitter walks the
//! `serde_yaml::Value` tree instead and writes:
//!
//! - numeric (and boolean) sequences inline: `values: [10.0, 12.0]`
//! - mappings in insertion order, so struct field order is kept
//! - no `null` entries
//!
//! Scalars are formatted by `serde_yaml` itself (quoting rules included);
//! multi-line strings become JSON-style double-quoted scalars so every
//! value stays on its key's line.

use flowsim_templates::TemplateError;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

const INDENT: usize = 2;

/// Serialize `value` as YAML in the model's output format
pub fn to_yaml<T: Serialize>(value: &T) -> Result<String, TemplateError> {
    let value = serde_yaml::to_value(value)?;
    let mut out = String::new();
    match &value {
        Value::Mapping(map) => write_mapping(&mut out, map, 0)?,
        Value::Sequence(items) if !is_inline(items) => write_sequence(&mut out, items, 0)?,
        other => {
            out.push_str(&inline_value(other)?);
            out.push('\n');
        }
    }
    Ok(out)
}

fn write_mapping(out: &mut String, map: &Mapping, indent: usize) -> Result<(), TemplateError> {
    let pad = " ".repeat(indent);
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let key = scalar(key)?;
        match value {
            Value::Mapping(inner) if !inner.is_empty() && has_entries(inner) => {
                out.push_str(&format!("{}{}:\n", pad, key));
                write_mapping(out, inner, indent + INDENT)?;
            }
            Value::Sequence(items) if !is_inline(items) => {
                out.push_str(&format!("{}{}:\n", pad, key));
                write_sequence(out, items, indent)?;
            }
            other => {
                out.push_str(&format!("{}{}: {}\n", pad, key, inline_value(other)?));
            }
        }
    }
    Ok(())
}

/// Block sequence; items sit at the parent key's indent
fn write_sequence(out: &mut String, items: &[Value], indent: usize) -> Result<(), TemplateError> {
    let pad = " ".repeat(indent);
    for item in items {
        match item {
            Value::Mapping(map) if has_entries(map) => {
                // Write the mapping one level deeper, then hang its first
                // line on the dash
                let mut body = String::new();
                write_mapping(&mut body, map, indent + INDENT)?;
                let first_key = indent + INDENT;
                out.push_str(&format!("{}- {}", pad, &body[first_key..]));
            }
            Value::Sequence(inner) if !is_inline(inner) => {
                out.push_str(&format!("{}-\n", pad));
                write_sequence(out, inner, indent + INDENT)?;
            }
            other => {
                out.push_str(&format!("{}- {}\n", pad, inline_value(other)?));
            }
        }
    }
    Ok(())
}

/// A mapping with at least one non-null entry
fn has_entries(map: &Mapping) -> bool {
    map.values().any(|v| !v.is_null())
}

/// Empty, or all numbers/booleans
fn is_inline(items: &[Value]) -> bool {
    items
        .iter()
        .all(|v| matches!(v, Value::Number(_) | Value::Bool(_)))
}

/// Single-line form of a value that does not need its own block
fn inline_value(value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::Sequence(items) => {
            let parts = items
                .iter()
                .map(inline_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", parts.join(", ")))
        }
        Value::Mapping(map) if !has_entries(map) => Ok("{}".to_string()),
        Value::Mapping(map) => {
            let parts = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| Ok(format!("{}: {}", scalar(k)?, inline_value(v)?)))
                .collect::<Result<Vec<_>, TemplateError>>()?;
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        Value::Tagged(tagged) => Ok(format!("{} {}", tagged.tag, inline_value(&tagged.value)?)),
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if s.contains('\n') => {
            Ok(serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s)))
        }
        other => {
            let text = serde_yaml::to_string(other)?;
            Ok(text.trim_end_matches('\n').to_string())
        }
    }
}
