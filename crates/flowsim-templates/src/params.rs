//! Parameter Value Model
//!
//! Callers hand parameters over as native values, JSON-like values or
//! strings. Each source has one normalization function; all of them end in
//! [`ParamValue::coerce`], which applies the declared parameter type.
//!
//! ## Coercion rules
//!
//! - Numeric strings parse locale-independently (`"0.9"`, never `"0,9"`)
//! - Boolean strings are case-insensitive `true` / `false`
//! - `array` parameters accept sequences or a bracketed literal string
//!   (`"[1, 2, 3]"`); elements are `int` only for `arrayOf: int`
//! - Floats become integers only within [`INTEGER_TOLERANCE`]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::definition::{ArrayElementType, ParamType, TemplateParameter};
use crate::error::{TemplateError, ValidationEntity, ValidationReport};

/// Maximum distance from an integer for a float to convert to one
pub const INTEGER_TOLERANCE: f64 = 1e-9;

/// Parameter values keyed by parameter name
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Canonical parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::IntArray(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::FloatArray(v)
    }
}

impl ParamValue {
    // =========================================================================
    // Normalization, one function per source representation
    // =========================================================================

    /// Normalize a string-encoded value
    pub fn parse_str(
        name: &str,
        text: &str,
        param: Option<&TemplateParameter>,
    ) -> Result<Self, TemplateError> {
        ParamValue::Str(text.to_string()).coerce(name, param)
    }

    /// Normalize a JSON-like value
    pub fn from_json(
        name: &str,
        value: &serde_json::Value,
        param: Option<&TemplateParameter>,
    ) -> Result<Self, TemplateError> {
        use serde_json::Value;

        let raw = match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().ok_or_else(|| {
                    TemplateError::validation(
                        ValidationEntity::parameter(name),
                        format!("number {} is not representable", n),
                    )
                })?),
            },
            Value::String(s) => ParamValue::Str(s.clone()),
            Value::Array(items) => {
                let elements = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => Some(Element::Int(i)),
                            None => n.as_f64().map(Element::Float),
                        },
                        Value::String(s) => Some(Element::Text(s.clone())),
                        _ => None,
                    })
                    .collect();
                numeric_sequence(name, elements)?
            }
            Value::Object(_) => {
                return Err(TemplateError::validation(
                    ValidationEntity::parameter(name),
                    "object values are not supported",
                ))
            }
        };
        raw.coerce(name, param)
    }

    /// Normalize a YAML value (declared defaults, base parameters)
    pub fn from_yaml(
        name: &str,
        value: &serde_yaml::Value,
        param: Option<&TemplateParameter>,
    ) -> Result<Self, TemplateError> {
        use serde_yaml::Value;

        let raw = match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => yaml_number(name, n)?,
            Value::String(s) => ParamValue::Str(s.clone()),
            Value::Sequence(items) => {
                let elements = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => Some(Element::Int(i)),
                            None => n.as_f64().map(Element::Float),
                        },
                        Value::String(s) => Some(Element::Text(s.clone())),
                        _ => None,
                    })
                    .collect();
                numeric_sequence(name, elements)?
            }
            Value::Tagged(tagged) => return ParamValue::from_yaml(name, &tagged.value, param),
            Value::Mapping(_) => {
                return Err(TemplateError::validation(
                    ValidationEntity::parameter(name),
                    "mapping values are not supported",
                ))
            }
        };
        raw.coerce(name, param)
    }

    /// Apply the declared type of `param`; undeclared values pass through
    pub fn coerce(
        self,
        name: &str,
        param: Option<&TemplateParameter>,
    ) -> Result<Self, TemplateError> {
        let Some(param) = param else {
            return Ok(self);
        };

        match param.param_type {
            ParamType::String => match self {
                ParamValue::Null | ParamValue::Str(_) => Ok(self),
                ParamValue::Bool(_) | ParamValue::Int(_) | ParamValue::Float(_) => {
                    Ok(ParamValue::Str(self.to_plain_string()))
                }
                other => Err(type_error(name, param.param_type, &other)),
            },
            ParamType::Number => match self {
                ParamValue::Null => Ok(self),
                ParamValue::Int(i) => Ok(ParamValue::Float(i as f64)),
                ParamValue::Float(f) => finite(name, None, f).map(ParamValue::Float),
                ParamValue::Str(s) => parse_number(name, None, &s).map(ParamValue::Float),
                other => Err(type_error(name, param.param_type, &other)),
            },
            ParamType::Integer => match self {
                ParamValue::Null | ParamValue::Int(_) => Ok(self),
                ParamValue::Float(f) => to_integer(name, None, f).map(ParamValue::Int),
                ParamValue::Str(s) => {
                    let f = parse_number(name, None, &s)?;
                    to_integer(name, None, f).map(ParamValue::Int)
                }
                other => Err(type_error(name, param.param_type, &other)),
            },
            ParamType::Boolean => match self {
                ParamValue::Null | ParamValue::Bool(_) => Ok(self),
                ParamValue::Str(s) => parse_bool(&s)
                    .map(ParamValue::Bool)
                    .ok_or_else(|| type_error(name, param.param_type, &ParamValue::Str(s))),
                other => Err(type_error(name, param.param_type, &other)),
            },
            ParamType::Array => {
                let element = param.element_type();
                match self {
                    ParamValue::Null => Ok(self),
                    ParamValue::Str(s) => {
                        let trimmed = s.trim();
                        if trimmed.starts_with('[') && trimmed.ends_with(']') {
                            let items = parse_array_literal(name, trimmed)?;
                            convert_elements(name, element, items)
                        } else {
                            Err(TemplateError::validation(
                                ValidationEntity::parameter(name),
                                format!("expected array, got bare string '{}'", s),
                            ))
                        }
                    }
                    ParamValue::IntArray(items) if element == ArrayElementType::Int => {
                        Ok(ParamValue::IntArray(items))
                    }
                    ParamValue::IntArray(items) => convert_elements(
                        name,
                        element,
                        items.into_iter().map(|i| i as f64).collect(),
                    ),
                    ParamValue::FloatArray(items) => convert_elements(name, element, items),
                    other => Err(type_error(name, param.param_type, &other)),
                }
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Str(_) => "string",
            ParamValue::IntArray(_) => "int[]",
            ParamValue::FloatArray(_) => "double[]",
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParamValue::IntArray(_) | ParamValue::FloatArray(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Elements of an array value as floats
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            ParamValue::IntArray(v) => Some(v.iter().map(|i| *i as f64).collect()),
            ParamValue::FloatArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    // =========================================================================
    // Formatting for substitution
    // =========================================================================

    /// Render as YAML text for a bare `${name}` placeholder
    pub fn to_template_text(&self) -> String {
        match self {
            ParamValue::Str(s) => quote_if_needed(s),
            ParamValue::IntArray(items) => format_list(items.iter().map(|i| i.to_string())),
            ParamValue::FloatArray(items) => format_list(items.iter().map(|f| format_number(*f))),
            scalar => scalar.to_plain_string(),
        }
    }

    /// Render for a placeholder already wrapped in `quote` characters
    pub fn to_quoted_text(&self, quote: char) -> String {
        let raw = self.to_plain_string();
        match quote {
            '\'' => raw.replace('\'', "''"),
            _ => {
                let escaped = serde_json::to_string(&raw).unwrap_or_else(|_| raw.clone());
                escaped[1..escaped.len() - 1].to_string()
            }
        }
    }

    /// Unquoted textual form
    pub fn to_plain_string(&self) -> String {
        match self {
            ParamValue::Null => "null".to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => format_number(*f),
            ParamValue::Str(s) => s.clone(),
            ParamValue::IntArray(_) | ParamValue::FloatArray(_) => self.to_template_text(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_template_text())
    }
}

// =============================================================================
// BOUNDS
// =============================================================================

/// Check `min`/`max`, per element for arrays; every offending element is
/// reported before failing
pub fn check_bounds(param: &TemplateParameter, value: &ParamValue) -> Result<(), TemplateError> {
    let mut report = ValidationReport::new();
    let in_range =
        |v: f64| param.min.map_or(true, |m| v >= m) && param.max.map_or(true, |m| v <= m);

    match value {
        ParamValue::Int(_) | ParamValue::Float(_) => {
            if let Some(v) = value.as_f64().filter(|v| !in_range(*v)) {
                report.push(
                    ValidationEntity::parameter(&param.name),
                    format!("value {} is outside {}", format_number(v), describe_bounds(param)),
                );
            }
        }
        ParamValue::IntArray(_) | ParamValue::FloatArray(_) => {
            let items = value.to_f64_vec().unwrap_or_default();
            for (index, v) in items.into_iter().enumerate() {
                if !in_range(v) {
                    report.push(
                        ValidationEntity::parameter_element(&param.name, index),
                        format!(
                            "element {} is outside {}",
                            format_number(v),
                            describe_bounds(param)
                        ),
                    );
                }
            }
        }
        _ => {}
    }

    report.into_result()
}

fn describe_bounds(param: &TemplateParameter) -> String {
    match (param.min, param.max) {
        (Some(min), Some(max)) => format!("[{}, {}]", format_number(min), format_number(max)),
        (Some(min), None) => format!("minimum {}", format_number(min)),
        (None, Some(max)) => format!("maximum {}", format_number(max)),
        (None, None) => "bounds".to_string(),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

enum Element {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Build an array value from sequence elements; `None` marks a non-numeric
fn numeric_sequence(name: &str, elements: Vec<Option<Element>>) -> Result<ParamValue, TemplateError> {
    let mut report = ValidationReport::new();
    let mut ints = Vec::with_capacity(elements.len());
    let mut floats = Vec::with_capacity(elements.len());
    let mut all_int = true;

    for (index, element) in elements.into_iter().enumerate() {
        match element {
            Some(Element::Int(i)) => {
                ints.push(i);
                floats.push(i as f64);
            }
            Some(Element::Float(f)) => {
                all_int = false;
                floats.push(f);
            }
            Some(Element::Text(s)) => match parse_number(name, Some(index), &s) {
                Ok(f) => {
                    all_int = false;
                    floats.push(f);
                }
                Err(e) => report.absorb(e)?,
            },
            None => report.push(
                ValidationEntity::parameter_element(name, index),
                "array elements must be numbers",
            ),
        }
    }

    report.into_result()?;
    Ok(if all_int {
        ParamValue::IntArray(ints)
    } else {
        ParamValue::FloatArray(floats)
    })
}

fn convert_elements(
    name: &str,
    element: ArrayElementType,
    items: Vec<f64>,
) -> Result<ParamValue, TemplateError> {
    let mut report = ValidationReport::new();
    match element {
        ArrayElementType::Double => {
            for (index, v) in items.iter().enumerate() {
                if let Err(e) = finite(name, Some(index), *v) {
                    report.absorb(e)?;
                }
            }
            report.into_result()?;
            Ok(ParamValue::FloatArray(items))
        }
        ArrayElementType::Int => {
            let mut ints = Vec::with_capacity(items.len());
            for (index, v) in items.into_iter().enumerate() {
                match to_integer(name, Some(index), v) {
                    Ok(i) => ints.push(i),
                    Err(e) => report.absorb(e)?,
                }
            }
            report.into_result()?;
            Ok(ParamValue::IntArray(ints))
        }
    }
}

fn parse_array_literal(name: &str, literal: &str) -> Result<Vec<f64>, TemplateError> {
    let inner = literal[1..literal.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut report = ValidationReport::new();
    let mut items = Vec::new();
    for (index, raw) in inner.split(',').enumerate() {
        let item = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        match parse_number(name, Some(index), item) {
            Ok(v) => items.push(v),
            Err(e) => report.absorb(e)?,
        }
    }
    report.into_result()?;
    Ok(items)
}

fn entity(name: &str, index: Option<usize>) -> ValidationEntity {
    ValidationEntity::Parameter {
        name: name.to_string(),
        index,
    }
}

fn parse_number(name: &str, index: Option<usize>, text: &str) -> Result<f64, TemplateError> {
    let parsed = text.trim().parse::<f64>().map_err(|_| {
        TemplateError::validation(entity(name, index), format!("'{}' is not a number", text))
    })?;
    finite(name, index, parsed)
}

fn finite(name: &str, index: Option<usize>, value: f64) -> Result<f64, TemplateError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TemplateError::validation(
            entity(name, index),
            format!("{} is not a finite number", value),
        ))
    }
}

fn to_integer(name: &str, index: Option<usize>, value: f64) -> Result<i64, TemplateError> {
    let rounded = value.round();
    if !value.is_finite()
        || (value - rounded).abs() > INTEGER_TOLERANCE
        || rounded < i64::MIN as f64
        || rounded > i64::MAX as f64
    {
        return Err(TemplateError::validation(
            entity(name, index),
            format!("{} is not an integer", value),
        ));
    }
    Ok(rounded as i64)
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn yaml_number(name: &str, n: &serde_yaml::Number) -> Result<ParamValue, TemplateError> {
    if let Some(i) = n.as_i64() {
        return Ok(ParamValue::Int(i));
    }
    n.as_f64().map(ParamValue::Float).ok_or_else(|| {
        TemplateError::validation(
            ValidationEntity::parameter(name),
            format!("number {} is not representable", n),
        )
    })
}

fn type_error(name: &str, expected: ParamType, got: &ParamValue) -> TemplateError {
    TemplateError::validation(
        ValidationEntity::parameter(name),
        format!("expected {}, got {} '{}'", expected, got.kind_name(), got.to_plain_string()),
    )
}

/// Locale-independent number text; integral values drop the fraction
pub fn format_number(value: f64) -> String {
    value.to_string()
}

fn format_list(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

/// Quote a string scalar only when plain YAML would misread it
fn quote_if_needed(s: &str) -> String {
    if needs_quoting(s) {
        serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
    } else {
        s.to_string()
    }
}

fn needs_quoting(s: &str) -> bool {
    const RESERVED: &[&str] = &["true", "false", "null", "yes", "no", "on", "off", "~"];

    if s.is_empty() || s.trim() != s {
        return true;
    }
    if s.chars().any(|c| {
        c.is_whitespace()
            || matches!(c, ':' | '#' | ',' | '[' | ']' | '{' | '}' | '"' | '\'' | '\\')
    }) {
        return true;
    }
    if s.starts_with(['-', '?', '&', '*', '!', '|', '>', '%', '@', '`']) {
        return true;
    }
    RESERVED.iter().any(|r| s.eq_ignore_ascii_case(r)) || s.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn param(name: &str, ty: ParamType) -> TemplateParameter {
        TemplateParameter::new(name, ty)
    }

    #[test]
    fn test_number_from_string_is_locale_independent() {
        let p = param("efficiency", ParamType::Number);
        assert_eq!(
            ParamValue::parse_str("efficiency", "0.9", Some(&p)).unwrap(),
            ParamValue::Float(0.9)
        );
        let err = ParamValue::parse_str("efficiency", "0,9", Some(&p)).unwrap_err();
        assert_eq!(err.issues()[0].entity, ValidationEntity::parameter("efficiency"));
    }

    #[test]
    fn test_boolean_strings_case_insensitive() {
        let p = param("enabled", ParamType::Boolean);
        assert_eq!(
            ParamValue::parse_str("enabled", "TRUE", Some(&p)).unwrap(),
            ParamValue::Bool(true)
        );
        assert_eq!(
            ParamValue::parse_str("enabled", "False", Some(&p)).unwrap(),
            ParamValue::Bool(false)
        );
        assert!(ParamValue::parse_str("enabled", "yes", Some(&p)).is_err());
    }

    #[test]
    fn test_integer_tolerance() {
        let p = param("count", ParamType::Integer);
        assert_eq!(
            ParamValue::Float(3.0000000001).coerce("count", Some(&p)).unwrap(),
            ParamValue::Int(3)
        );
        let err = ParamValue::Float(3.2).coerce("count", Some(&p)).unwrap_err();
        assert!(err.to_string().contains("parameter 'count'"));
    }

    #[test]
    fn test_array_from_bracketed_string() {
        let p = param("pattern", ParamType::Array);
        assert_eq!(
            ParamValue::parse_str("pattern", "[1, 2.5, 3]", Some(&p)).unwrap(),
            ParamValue::FloatArray(vec![1.0, 2.5, 3.0])
        );
    }

    #[test]
    fn test_array_of_int_reports_offending_index() {
        let p = param("pattern", ParamType::Array).with_array_of(ArrayElementType::Int);
        assert_eq!(
            ParamValue::from_json("pattern", &json!([1, 2.0, 3]), Some(&p)).unwrap(),
            ParamValue::IntArray(vec![1, 2, 3])
        );

        let err = ParamValue::from_json("pattern", &json!([1, 2.5, 3, 4.5]), Some(&p)).unwrap_err();
        let entities: Vec<_> = err.issues().iter().map(|i| i.entity.clone()).collect();
        assert_eq!(
            entities,
            vec![
                ValidationEntity::parameter_element("pattern", 1),
                ValidationEntity::parameter_element("pattern", 3),
            ]
        );
    }

    #[test]
    fn test_array_rejects_bare_string() {
        let p = param("pattern", ParamType::Array);
        assert!(ParamValue::parse_str("pattern", "10", Some(&p)).is_err());
    }

    #[test]
    fn test_from_yaml_default() {
        let p = param("weights", ParamType::Array);
        let yaml: serde_yaml::Value = serde_yaml::from_str("[1, 2, 3]").unwrap();
        assert_eq!(
            ParamValue::from_yaml("weights", &yaml, Some(&p)).unwrap(),
            ParamValue::FloatArray(vec![1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_undeclared_values_pass_through() {
        assert_eq!(
            ParamValue::from_json("extra", &json!([1, 2]), None).unwrap(),
            ParamValue::IntArray(vec![1, 2])
        );
        assert_eq!(
            ParamValue::parse_str("extra", "abc", None).unwrap(),
            ParamValue::Str("abc".into())
        );
    }

    #[test]
    fn test_objects_are_rejected() {
        assert!(ParamValue::from_json("x", &json!({"a": 1}), None).is_err());
    }

    #[test]
    fn test_template_text_formatting() {
        assert_eq!(ParamValue::Float(0.9).to_template_text(), "0.9");
        assert_eq!(ParamValue::Float(10.0).to_template_text(), "10");
        assert_eq!(ParamValue::Bool(true).to_template_text(), "true");
        assert_eq!(ParamValue::IntArray(vec![1, 2]).to_template_text(), "[1, 2]");
        assert_eq!(
            ParamValue::FloatArray(vec![0.5, 1.5]).to_template_text(),
            "[0.5, 1.5]"
        );
        assert_eq!(ParamValue::from("checkout").to_template_text(), "checkout");
        assert_eq!(
            ParamValue::from("two words").to_template_text(),
            "\"two words\""
        );
        assert_eq!(ParamValue::from("a:b").to_template_text(), "\"a:b\"");
        assert_eq!(ParamValue::from("#tag").to_template_text(), "\"#tag\"");
        assert_eq!(ParamValue::from("true").to_template_text(), "\"true\"");
        assert_eq!(ParamValue::from("42").to_template_text(), "\"42\"");
        assert_eq!(ParamValue::from("").to_template_text(), "\"\"");
    }

    #[test]
    fn test_quoted_text_escaping() {
        assert_eq!(ParamValue::from("say \"hi\"").to_quoted_text('"'), "say \\\"hi\\\"");
        assert_eq!(ParamValue::from("it's").to_quoted_text('\''), "it''s");
    }

    #[test]
    fn test_bounds_enumerate_every_element() {
        let p = param("weights", ParamType::Array).with_bounds(Some(0.0), Some(10.0));
        let err = check_bounds(&p, &ParamValue::FloatArray(vec![-1.0, 5.0, 11.0, 12.0]))
            .unwrap_err();
        assert_eq!(err.issues().len(), 3);
        assert_eq!(
            err.issues()[0].entity,
            ValidationEntity::parameter_element("weights", 0)
        );

        assert!(check_bounds(&p, &ParamValue::FloatArray(vec![0.0, 10.0])).is_ok());
    }

    #[test]
    fn test_scalar_bounds() {
        let p = param("efficiency", ParamType::Number).with_bounds(Some(0.0), Some(1.0));
        assert!(check_bounds(&p, &ParamValue::Float(0.9)).is_ok());
        let err = check_bounds(&p, &ParamValue::Float(1.5)).unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }
}
