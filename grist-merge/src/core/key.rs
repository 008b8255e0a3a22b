//! Canonical key values for matching source rows to target records.

use std::fmt;

use serde_json::Value;

/// Comparable form of a key column value.
///
/// Integral numbers compare equal whatever their JSON encoding (`1` and
/// `1.0`). Text never matches a number, even when it spells one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    /// Non-integral (or out of `i64` range) number, kept as its shortest decimal form.
    Number(String),
    Text(String),
}

impl KeyValue {
    /// Canonicalize `value`. Returns `None` for null, lists and objects,
    /// which cannot identify a row.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(Self::Int(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(Self::Int(f as i64))
                } else {
                    Some(Self::Number(n.to_string()))
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Number(n) => f.write_str(n),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_match_across_encodings() {
        assert_eq!(
            KeyValue::from_value(&json!(1)),
            KeyValue::from_value(&json!(1.0))
        );
        assert_eq!(KeyValue::from_value(&json!(1.5)), Some(KeyValue::Number("1.5".to_string())));
    }

    #[test]
    fn text_does_not_match_number() {
        assert_ne!(
            KeyValue::from_value(&json!("1")),
            KeyValue::from_value(&json!(1))
        );
    }

    #[test]
    fn null_and_containers_are_not_keys() {
        assert_eq!(KeyValue::from_value(&json!(null)), None);
        assert_eq!(KeyValue::from_value(&json!(["L", 1, 2])), None);
        assert_eq!(KeyValue::from_value(&json!({"a": 1})), None);
    }

    #[test]
    fn display_quotes_text_only() {
        assert_eq!(KeyValue::Text("ann".to_string()).to_string(), "\"ann\"");
        assert_eq!(KeyValue::Int(7).to_string(), "7");
    }
}
