//! Parameter Substitution
//!
//! Expands `${name}` placeholders in raw template text. Substitution is
//! purely textual: before expansion the text is often not valid YAML
//! (`values: [10, 20, ${peak}]`), so no document structure is consulted.
//!
//! ## Passes
//!
//! 1. Caller-supplied values
//! 2. Declared defaults for anything still unresolved
//!
//! A placeholder left after both passes fails naming the parameter.
//!
//! ## Quoting
//!
//! Array values replace both `${name}` and `"${name}"` (or `'${name}'`),
//! so quoting a placeholder to keep the raw text YAML-parseable still
//! yields a sequence. A scalar inside quotes is escaped for that quote
//! style instead of being quoted again. A placeholder that is only part
//! of a longer plain scalar gets the bare value, never added quotes.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::definition::TemplateParameter;
use crate::error::{TemplateError, ValidationEntity, ValidationReport};
use crate::params::{ParamMap, ParamValue};

/// `${name}` with optional surrounding quote characters
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["']?)\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}(["']?)"#).unwrap()
});

/// Names of every `${name}` placeholder in `text`
pub fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|cap| cap[2].to_string())
        .collect()
}

/// `${name}` alone, with optional quotes, as a whole value
static SOLE_PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(["']?)\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}(["']?)$"#).unwrap()
});

/// Parameter name when `value` is exactly one placeholder
pub fn sole_placeholder(value: &str) -> Option<&str> {
    let cap = SOLE_PLACEHOLDER_RE.captures(value.trim())?;
    if cap[1] != cap[3] {
        return None;
    }
    cap.get(2).map(|m| m.as_str())
}

/// Whether any `${...}` token remains, including malformed ones
pub fn has_placeholders(text: &str) -> bool {
    text.contains("${")
}

/// Substitute caller values, then declared defaults
///
/// `values` are expected to be normalized already (see
/// [`ParamValue::coerce`]); declared defaults are normalized here.
pub fn substitute(
    text: &str,
    values: &ParamMap,
    declared: &[TemplateParameter],
) -> Result<String, TemplateError> {
    let after_values = replace_known(text, values);

    let mut defaults = ParamMap::new();
    for name in placeholders(&after_values) {
        if let Some(param) = declared.iter().find(|p| p.name == name) {
            if let Some(default) = param.default_value()? {
                defaults.insert(name, default);
            }
        }
    }
    if !defaults.is_empty() {
        debug!(
            "Substituting defaults for {:?}",
            defaults.keys().collect::<Vec<_>>()
        );
    }
    let result = replace_known(&after_values, &defaults);

    let unresolved = placeholders(&result);
    if !unresolved.is_empty() {
        let mut report = ValidationReport::new();
        for name in unresolved {
            let message = if declared.iter().any(|p| p.name == name) {
                "no value supplied and no default declared"
            } else {
                "referenced by the template but not declared or supplied"
            };
            report.push(ValidationEntity::parameter(name), message);
        }
        return Err(TemplateError::Validation(report));
    }

    if has_placeholders(&result) {
        return Err(TemplateError::Parse {
            context: "template".to_string(),
            message: "malformed ${...} placeholder".to_string(),
        });
    }

    Ok(result)
}

fn replace_known(text: &str, values: &ParamMap) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |cap: &Captures<'_>| {
            let Some(value) = values.get(&cap[2]) else {
                return cap[0].to_string();
            };
            let Some(span) = cap.get(0).map(|m| m.range()) else {
                return cap[0].to_string();
            };
            let line_start = text[..span.start].rfind('\n').map_or(0, |i| i + 1);
            let line_end = text[span.end..]
                .find('\n')
                .map_or(text.len(), |i| span.end + i);
            render(
                value,
                &text[line_start..span.start],
                &cap[1],
                &cap[3],
                &text[span.end..line_end],
            )
        })
        .into_owned()
}

/// Text for one placeholder given the rest of its line
///
/// `prefix` and `suffix` are the line text before and after the match;
/// `open` and `close` are the quote characters captured next to it.
fn render(value: &ParamValue, prefix: &str, open: &str, close: &str, suffix: &str) -> String {
    if let Some(quote) = open_quote(prefix) {
        // Somewhere inside a quoted scalar that began earlier on the line
        return format!("{}{}{}", open, value.to_quoted_text(quote), close);
    }

    if let Some(quote) = open.chars().next().filter(|_| starts_value(prefix)) {
        if open == close && value.is_structured() && is_whole_value(prefix, suffix) {
            return value.to_template_text();
        }
        return format!("{}{}{}", open, value.to_quoted_text(quote), close);
    }

    if open.is_empty() && close.is_empty() && is_whole_value(prefix, suffix) {
        value.to_template_text()
    } else {
        // Part of a longer plain scalar: no quotes of our own
        format!("{}{}{}", open, value.to_plain_string(), close)
    }
}

/// Quote character of a quoted scalar still open at the end of `prefix`
fn open_quote(prefix: &str) -> Option<char> {
    let mut open: Option<char> = None;
    let mut chars = prefix.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match open {
            Some('"') => match c {
                '\\' => {
                    chars.next();
                }
                '"' => open = None,
                _ => {}
            },
            Some(_) if c == '\'' => {
                if chars.peek().is_some_and(|(_, next)| *next == '\'') {
                    chars.next();
                } else {
                    open = None;
                }
            }
            Some(_) => {}
            None => {
                let before = &prefix[..i];
                if c == '#' && (before.is_empty() || before.ends_with(char::is_whitespace)) {
                    return None;
                }
                if matches!(c, '"' | '\'') && starts_value(before) {
                    open = Some(c);
                }
            }
        }
    }
    open
}

/// Whether a scalar may start right after `before` on its line
fn starts_value(before: &str) -> bool {
    let before = before.trim_end();
    before.is_empty() || before.ends_with([':', '-', '[', '{', ',', '?'])
}

/// The placeholder is a complete mapping value or sequence element
fn is_whole_value(prefix: &str, suffix: &str) -> bool {
    let rest = suffix.trim_start();
    starts_value(prefix) && (rest.is_empty() || rest.starts_with([',', ']', '}', '#']))
}
