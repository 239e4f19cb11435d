//! Typed cell values and the loose coercion rules applied to accepted cells.
//!
//! Coercion never fails. Numeric text that does not parse falls back to zero,
//! JSON text that does not parse becomes `null`, and anything that is not a
//! recognised numeric, boolean or JSON column stays a string.

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value as JsonValue;

use crate::schema::ColumnType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Json(JsonValue),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Json(json) => json.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// One validated record: column names paired with coerced values, kept in
/// the column order of the schema that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRow {
    fields: Vec<(String, Value)>,
}

impl TypedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Returns a copy holding only the given columns, ordered as `columns`.
    pub fn restricted_to<'a, I>(&self, columns: I) -> TypedRow
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields = columns
            .into_iter()
            .filter_map(|column| {
                self.get(column)
                    .map(|value| (column.to_string(), value.clone()))
            })
            .collect();
        TypedRow { fields }
    }
}

impl Serialize for TypedRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub fn coerce_value(raw: &str, column_type: &ColumnType) -> Value {
    match column_type {
        integer if integer.is_integer() => Value::Integer(loose_integer(raw)),
        ColumnType::Json => Value::Json(loose_json(raw)),
        ColumnType::Bit1 => Value::Boolean(loose_bit(raw)),
        ColumnType::Float | ColumnType::Double => Value::Float(loose_float(raw)),
        _ => Value::String(raw.to_string()),
    }
}

/// Reads the leading integer of `text` the way a loose numeric cast does:
/// leading whitespace and a sign are accepted, parsing stops at the first
/// non-digit, and text without digits yields 0. Overflow saturates.
pub fn loose_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, byte| {
            let digit = i64::from(byte - b'0');
            if negative {
                acc.saturating_mul(10).saturating_sub(digit)
            } else {
                acc.saturating_mul(10).saturating_add(digit)
            }
        })
}

/// Reads the longest leading decimal number of `text` (fraction and exponent
/// included), or 0.0 when there is none.
pub fn loose_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    float_prefix(trimmed).parse().unwrap_or(0.0)
}

pub fn loose_bit(text: &str) -> bool {
    text == "1" || text.eq_ignore_ascii_case("true")
}

/// Parses JSON after swapping single quotes for double quotes. Unparsable
/// text becomes `null`.
pub fn loose_json(text: &str) -> JsonValue {
    serde_json::from_str(&text.replace('\'', "\"")).unwrap_or(JsonValue::Null)
}

fn float_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exp_digits = count_digits(&bytes[exponent..]);
        if exp_digits > 0 {
            end = exponent + exp_digits;
        }
    }
    &text[..end]
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_integer_reads_numeric_prefix() {
        assert_eq!(loose_integer("42"), 42);
        assert_eq!(loose_integer("-17"), -17);
        assert_eq!(loose_integer("  8 horses"), 8);
        assert_eq!(loose_integer("3.9"), 3);
        assert_eq!(loose_integer("abc"), 0);
        assert_eq!(loose_integer(""), 0);
        assert_eq!(loose_integer("-"), 0);
    }

    #[test]
    fn loose_integer_saturates_on_overflow() {
        assert_eq!(loose_integer("99999999999999999999999"), i64::MAX);
        assert_eq!(loose_integer("-99999999999999999999999"), i64::MIN);
    }

    #[test]
    fn loose_float_reads_numeric_prefix() {
        assert_eq!(loose_float("1.25"), 1.25);
        assert_eq!(loose_float("-0.5"), -0.5);
        assert_eq!(loose_float(".75"), 0.75);
        assert_eq!(loose_float("2."), 2.0);
        assert_eq!(loose_float("1e3"), 1000.0);
        assert_eq!(loose_float("1e"), 1.0);
        assert_eq!(loose_float("3.5kg"), 3.5);
        assert_eq!(loose_float("fast"), 0.0);
        assert_eq!(loose_float("."), 0.0);
    }

    #[test]
    fn loose_bit_accepts_true_and_one_only() {
        assert!(loose_bit("true"));
        assert!(loose_bit("TRUE"));
        assert!(loose_bit("True"));
        assert!(loose_bit("1"));
        assert!(!loose_bit("false"));
        assert!(!loose_bit("0"));
        assert!(!loose_bit(""));
        assert!(!loose_bit("yes"));
    }

    #[test]
    fn loose_json_tolerates_single_quotes() {
        let double = loose_json(r#"{"id": 100101, "tags": ["a", "b"]}"#);
        let single = loose_json("{'id': 100101, 'tags': ['a', 'b']}");
        assert_eq!(double, single);
        assert_eq!(single, json!({"id": 100101, "tags": ["a", "b"]}));
        assert_eq!(loose_json("[1, 2]"), json!([1, 2]));
    }

    #[test]
    fn loose_json_yields_null_on_garbage() {
        assert_eq!(loose_json("{broken"), JsonValue::Null);
        assert_eq!(loose_json(""), JsonValue::Null);
    }

    #[test]
    fn coerce_value_dispatches_on_column_type() {
        assert_eq!(coerce_value("7", &ColumnType::TinyInt), Value::Integer(7));
        assert_eq!(coerce_value("x", &ColumnType::BigInt), Value::Integer(0));
        assert_eq!(coerce_value("1", &ColumnType::Bit1), Value::Boolean(true));
        assert_eq!(coerce_value("0.125", &ColumnType::Float), Value::Float(0.125));
        assert_eq!(
            coerce_value("A", &ColumnType::Varchar(1)),
            Value::String("A".to_string())
        );
        assert_eq!(
            coerce_value("12", &ColumnType::Other("date".to_string())),
            Value::String("12".to_string())
        );
    }

    #[test]
    fn typed_row_restriction_keeps_schema_order() {
        let mut row = TypedRow::new();
        row.push("name", Value::String("Special Week".to_string()));
        row.push("stray", Value::Integer(1));
        row.push("id", Value::Integer(100101));

        let restricted = row.restricted_to(["id", "name", "rare"]);
        let columns: Vec<&str> = restricted.columns().collect();
        assert_eq!(columns, vec!["id", "name"]);
        assert!(!restricted.contains("stray"));
    }

    #[test]
    fn typed_row_serializes_as_object() {
        let mut row = TypedRow::new();
        row.push("id", Value::Integer(1));
        row.push("passive", Value::Boolean(false));
        row.push("meta", Value::Json(json!({"k": 1})));
        let encoded = serde_json::to_string(&row).unwrap();
        assert_eq!(encoded, r#"{"id":1,"passive":false,"meta":{"k":1}}"#);
    }
}
