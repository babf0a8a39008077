//! Argument schema and best-effort coercion of planner-supplied values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Argument values keyed by argument name.
pub type Arguments = Map<String, Value>;

/// Semantic type tag of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Accepts any JSON value unchanged
    Any,
}

impl ArgType {
    /// Coerce `value` into this type.
    ///
    /// Returns `None` when the value cannot be represented as this type.
    /// Strings holding a number, boolean, array or object literal are parsed.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ArgType::Any, v) => Some(v.clone()),
            (_, Value::Null) => None,

            (ArgType::String, Value::String(_)) => Some(value.clone()),
            (ArgType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ArgType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (ArgType::Integer, Value::Number(n)) => integer_from_number(n),
            (ArgType::Integer, Value::String(s)) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Some(Value::from(i));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .and_then(|n| integer_from_number(&n))
            }

            (ArgType::Number, Value::Number(_)) => Some(value.clone()),
            (ArgType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),

            (ArgType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ArgType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            (ArgType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },

            (ArgType::Array, Value::Array(_)) => Some(value.clone()),
            (ArgType::Object, Value::Object(_)) => Some(value.clone()),
            (ArgType::Array, Value::String(s)) => match serde_json::from_str(s) {
                Ok(parsed @ Value::Array(_)) => Some(parsed),
                _ => None,
            },
            (ArgType::Object, Value::String(s)) => match serde_json::from_str(s) {
                Ok(parsed @ Value::Object(_)) => Some(parsed),
                _ => None,
            },

            _ => None,
        }
    }
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
            ArgType::Boolean => "boolean",
            ArgType::Array => "array",
            ArgType::Object => "object",
            ArgType::Any => "any",
        };
        f.write_str(name)
    }
}

fn integer_from_number(n: &Number) -> Option<Value> {
    if n.is_i64() || n.is_u64() {
        return Some(Value::Number(n.clone()));
    }
    let f = n.as_f64()?;
    // i64::MAX as f64 rounds up to 2^63, which does not fit.
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One entry of a function's argument schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub description: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Argument {
    /// Create a required argument.
    pub fn new(name: impl Into<String>, arg_type: ArgType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type,
            description: description.into(),
            optional: false,
            default: None,
        }
    }

    /// Mark the argument as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Give the argument a default value. Implies optional.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }

    /// An argument is required when it is neither optional nor defaulted.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// Why a set of arguments was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("missing required argument '{name}'")]
    Missing { name: String },

    #[error("argument '{name}' expected {expected}, got {found}")]
    InvalidType {
        name: String,
        expected: ArgType,
        found: &'static str,
    },
}

impl ArgumentError {
    /// Name of the offending argument.
    pub fn argument(&self) -> &str {
        match self {
            ArgumentError::Missing { name } | ArgumentError::InvalidType { name, .. } => name,
        }
    }
}

/// Check a schema for construction-time mistakes.
pub(crate) fn check_schema(args: &[Argument]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for arg in args {
        if arg.name.trim().is_empty() {
            return Err("argument name cannot be empty".to_string());
        }
        if !seen.insert(arg.name.as_str()) {
            return Err(format!("duplicate argument '{}'", arg.name));
        }
        if let Some(default) = &arg.default {
            if arg.arg_type.coerce(default).is_none() {
                return Err(format!(
                    "default for '{}' is not a valid {}",
                    arg.name, arg.arg_type
                ));
            }
        }
    }
    Ok(())
}

/// Validate and coerce `raw` against `schema`.
///
/// Values shaped as `{"value": x}` are unwrapped first. Unknown names are
/// dropped; `null` counts as absent.
pub(crate) fn validate_arguments(
    schema: &[Argument],
    mut raw: Arguments,
) -> Result<Arguments, ArgumentError> {
    let mut validated = Arguments::new();

    for arg in schema {
        let supplied = raw.remove(&arg.name).map(unwrap_value).filter(|v| !v.is_null());

        match supplied {
            Some(value) => {
                let coerced =
                    arg.arg_type
                        .coerce(&value)
                        .ok_or_else(|| ArgumentError::InvalidType {
                            name: arg.name.clone(),
                            expected: arg.arg_type,
                            found: json_type_name(&value),
                        })?;
                validated.insert(arg.name.clone(), coerced);
            }
            None => {
                if let Some(default) = &arg.default {
                    // check_schema guarantees the default coerces
                    let value = arg.arg_type.coerce(default).unwrap_or_else(|| default.clone());
                    validated.insert(arg.name.clone(), value);
                } else if !arg.optional {
                    return Err(ArgumentError::Missing {
                        name: arg.name.clone(),
                    });
                }
            }
        }
    }

    if !raw.is_empty() {
        tracing::debug!(
            "Dropping undeclared arguments: {:?}",
            raw.keys().collect::<Vec<_>>()
        );
    }

    Ok(validated)
}

/// Planners may wrap an argument as `{"value": x, ...}`; any object carrying
/// a `value` key is replaced by that value.
fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_coerce_primitives() {
        assert_eq!(ArgType::Integer.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(ArgType::Integer.coerce(&json!(3.0)), Some(json!(3)));
        assert_eq!(ArgType::Integer.coerce(&json!(3.5)), None);
        assert_eq!(ArgType::Integer.coerce(&json!(9_223_372_036_854_775_808.0)), None);
        assert_eq!(
            ArgType::Integer.coerce(&json!(-9_223_372_036_854_775_808.0)),
            Some(json!(i64::MIN))
        );
        assert_eq!(ArgType::Number.coerce(&json!(" 2.5 ")), Some(json!(2.5)));
        assert_eq!(ArgType::String.coerce(&json!(17)), Some(json!("17")));
        assert_eq!(ArgType::Boolean.coerce(&json!("Yes")), Some(json!(true)));
        assert_eq!(ArgType::Boolean.coerce(&json!(0)), Some(json!(false)));
        assert_eq!(ArgType::Boolean.coerce(&json!("maybe")), None);
        assert_eq!(ArgType::Array.coerce(&json!("[1,2]")), Some(json!([1, 2])));
        assert_eq!(ArgType::Object.coerce(&json!("[1,2]")), None);
        assert_eq!(ArgType::Any.coerce(&json!(null)), Some(json!(null)));
    }

    #[test]
    fn test_missing_required_argument() {
        let schema = vec![Argument::new("city", ArgType::String, "City name")];
        let err = validate_arguments(&schema, Arguments::new()).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::Missing {
                name: "city".to_string()
            }
        );
    }

    #[test]
    fn test_defaults_and_optional() {
        let schema = vec![
            Argument::new("city", ArgType::String, "City name"),
            Argument::new("days", ArgType::Integer, "Forecast days").with_default(3),
            Argument::new("units", ArgType::String, "Units").optional(),
        ];
        let validated = validate_arguments(&schema, args(json!({"city": "Oslo"}))).unwrap();
        assert_eq!(validated.get("days"), Some(&json!(3)));
        assert!(!validated.contains_key("units"));
    }

    #[test]
    fn test_value_wrapper_is_unwrapped_and_unknown_dropped() {
        let schema = vec![Argument::new("count", ArgType::Integer, "How many")];
        let validated = validate_arguments(
            &schema,
            args(json!({"count": {"value": "5"}, "extra": true})),
        )
        .unwrap();
        assert_eq!(validated, args(json!({"count": 5})));

        let validated = validate_arguments(
            &schema,
            args(json!({"count": {"value": 7, "label": "seven"}})),
        )
        .unwrap();
        assert_eq!(validated, args(json!({"count": 7})));
    }

    #[test]
    fn test_invalid_type_reports_found_type() {
        let schema = vec![Argument::new("count", ArgType::Integer, "How many")];
        let err = validate_arguments(&schema, args(json!({"count": [1]}))).unwrap_err();
        assert_eq!(err.argument(), "count");
        assert!(err.to_string().contains("expected integer, got array"));
    }

    #[test]
    fn test_check_schema_rejects_bad_defaults_and_duplicates() {
        let bad_default =
            vec![Argument::new("n", ArgType::Integer, "n").with_default("not a number")];
        assert!(check_schema(&bad_default).is_err());

        let duplicate = vec![
            Argument::new("n", ArgType::Integer, "n"),
            Argument::new("n", ArgType::String, "n again"),
        ];
        assert!(check_schema(&duplicate).unwrap_err().contains("duplicate"));
    }
}
