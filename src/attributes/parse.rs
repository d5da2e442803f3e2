// Pure attribute parsing - type conversion only, no required/default/bounds logic
// Used to re-hydrate already trusted values such as hook results

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::schema::{AttributeKind, AttributeSpec};
use crate::store::number_value;

/// Outcome of numeric conversion with JavaScript `Number()` semantics
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumberParse {
    Absent,
    Number(f64),
    NaN,
}

/// Convert a JSON value to a number. Booleans are rejected and blank
/// strings count as absent.
pub(crate) fn to_number(value: Option<&Value>) -> NumberParse {
    match value {
        None | Some(Value::Null) => NumberParse::Absent,
        Some(Value::Number(n)) => n.as_f64().map(NumberParse::Number).unwrap_or(NumberParse::NaN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return NumberParse::Absent;
            }
            if let Some(n) = parse_radix_literal(trimmed) {
                return NumberParse::Number(n);
            }
            // "Infinity" is finite-checked away: documents are JSON
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => NumberParse::Number(n),
                _ => NumberParse::NaN,
            }
        }
        Some(Value::Bool(_)) | Some(Value::Array(_)) | Some(Value::Object(_)) => NumberParse::NaN,
    }
}

/// Unsigned `0x`, `0o` and `0b` literals
fn parse_radix_literal(s: &str) -> Option<f64> {
    let (radix, digits) = match s.get(..2)? {
        "0x" | "0X" => (16, &s[2..]),
        "0o" | "0O" => (8, &s[2..]),
        "0b" | "0B" => (2, &s[2..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
}

/// String form of a scalar, as JavaScript `String()` would render it
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Convert `value` to the representation of `spec`'s type
pub fn parse_model_attribute(spec: &AttributeSpec, value: &Value) -> AppResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match &spec.kind {
        AttributeKind::Boolean {} => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            other => Err(conversion_error(other, "boolean")),
        },
        AttributeKind::Number { .. } => match to_number(Some(value)) {
            NumberParse::Number(n) => Ok(number_value(n)),
            NumberParse::Absent => Ok(Value::Null),
            NumberParse::NaN => Err(conversion_error(value, "number")),
        },
        AttributeKind::Email {}
        | AttributeKind::Enum { .. }
        | AttributeKind::Id {}
        | AttributeKind::Ref { .. }
        | AttributeKind::Slug { .. }
        | AttributeKind::String { .. }
        | AttributeKind::User {} => scalar_to_string(value)
            .map(Value::String)
            .ok_or_else(|| conversion_error(value, "string")),
        AttributeKind::List { list_type, .. } => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| parse_model_attribute(list_type, item))
                .collect::<AppResult<Vec<_>>>()
                .map(Value::Array),
            other => Err(conversion_error(other, "list")),
        },
        AttributeKind::Map { value_type, .. } => match value {
            Value::Object(entries) => {
                let mut parsed = Map::new();
                for (key, item) in entries {
                    parsed.insert(key.clone(), parse_model_attribute(value_type, item)?);
                }
                Ok(Value::Object(parsed))
            }
            other => Err(conversion_error(other, "map")),
        },
    }
}

fn conversion_error(value: &Value, target: &str) -> AppError {
    AppError::BadRequest(format!("cannot convert {} to {}", value, target))
}
