//! Scalar kinds, schema type tags and the text-to-value cast.
//!
//! Casting never fails for string and numeric kinds: numbers are read with a
//! permissive "longest numeric prefix" rule, so `"12abc"` is `12` and `"abc"`
//! is `0`. Booleans are tri-state; anything outside the token table casts to
//! `None`, which the value pipeline treats as "no value".

use indextree::NodeId;
use serde::Serialize;
use std::fmt;

/// Scalar kinds a raw text value can be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Untyped,
    String,
    Int,
    Float,
    Bool,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Untyped => "untyped",
            Scalar::String => "string",
            Scalar::Int => "int",
            Scalar::Float => "float",
            Scalar::Bool => "bool",
        }
    }
}

/// Type tag of a schema entry.
///
/// Array tags accumulate one value per occurrence; prototype tags bind child
/// nodes instead of scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar(Scalar),
    Array(Scalar),
    Prototype,
    PrototypeArray,
}

impl ValueType {
    pub const UNTYPED: ValueType = ValueType::Scalar(Scalar::Untyped);
    pub const STRING: ValueType = ValueType::Scalar(Scalar::String);
    pub const INT: ValueType = ValueType::Scalar(Scalar::Int);
    pub const FLOAT: ValueType = ValueType::Scalar(Scalar::Float);
    pub const BOOL: ValueType = ValueType::Scalar(Scalar::Bool);

    pub fn is_array(self) -> bool {
        matches!(self, ValueType::Array(_) | ValueType::PrototypeArray)
    }

    pub fn is_prototype(self) -> bool {
        matches!(self, ValueType::Prototype | ValueType::PrototypeArray)
    }

    /// The scalar kind values of this type are cast to, `None` for prototypes.
    pub fn scalar(self) -> Option<Scalar> {
        match self {
            ValueType::Scalar(s) | ValueType::Array(s) => Some(s),
            ValueType::Prototype | ValueType::PrototypeArray => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Scalar(s) => s.name(),
            ValueType::Array(Scalar::Untyped) => "array",
            ValueType::Array(Scalar::String) => "array of string",
            ValueType::Array(Scalar::Int) => "array of int",
            ValueType::Array(Scalar::Float) => "array of float",
            ValueType::Array(Scalar::Bool) => "array of bool",
            ValueType::Prototype => "prototype",
            ValueType::PrototypeArray => "array of prototype",
        }
    }
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::UNTYPED
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value held in a node's field store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    #[serde(serialize_with = "serialize_node_id")]
    Node(NodeId),
}

fn serialize_node_id<S: serde::Serializer>(id: &NodeId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&id.to_string())
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Node(id) => write!(f, "node {}", id),
        }
    }
}

/// Converts a raw text value into a typed value.
///
/// Returns `None` only for booleans outside the token table.
pub fn cast(raw: String, ty: ValueType) -> Option<Value> {
    match ty.scalar() {
        None | Some(Scalar::Untyped) | Some(Scalar::String) => Some(Value::Str(raw)),
        Some(Scalar::Int) => Some(Value::Int(parse_int_prefix(&raw))),
        Some(Scalar::Float) => Some(Value::Float(parse_float_prefix(&raw))),
        Some(Scalar::Bool) => parse_bool(&raw).map(Value::Bool),
    }
}

/// `1/true/yes/y` → true, `0/false/no/n` → false, case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn skip_leading_whitespace(raw: &str) -> &str {
    raw.trim_start_matches([' ', '\t', '\n', '\r', '\x0b', '\x0c'])
}

/// Reads `[+-]?[0-9]+` from the start of `raw`, saturating on overflow.
pub(crate) fn parse_int_prefix(raw: &str) -> i64 {
    let bytes = skip_leading_whitespace(raw).as_bytes();
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let mut value: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = i64::from(b - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Reads the longest float literal from the start of `raw`, `0.0` if none.
pub(crate) fn parse_float_prefix(raw: &str) -> f64 {
    let text = skip_leading_whitespace(raw);
    let bytes = text.as_bytes();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let rest = &text[end..];
    for special in ["infinity", "inf", "nan"] {
        if rest
            .get(..special.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(special))
        {
            return text[..end + special.len()].parse().unwrap_or(0.0);
        }
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }

    if mantissa_digits == 0 {
        return 0.0;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bool_token_table() {
        for t in ["1", "true", "TRUE", "Yes", "y"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for f in ["0", "false", "No", "n", "N"] {
            assert_eq!(parse_bool(f), Some(false), "{}", f);
        }
        for u in ["", "maybe", "2", " yes"] {
            assert_eq!(parse_bool(u), None, "{}", u);
        }
    }

    #[test]
    fn test_permissive_int() {
        assert_eq!(parse_int_prefix("42"), 42);
        assert_eq!(parse_int_prefix("  -17 apples"), -17);
        assert_eq!(parse_int_prefix("+3"), 3);
        assert_eq!(parse_int_prefix("12abc"), 12);
        assert_eq!(parse_int_prefix("abc"), 0);
        assert_eq!(parse_int_prefix(""), 0);
        assert_eq!(parse_int_prefix("99999999999999999999999"), i64::MAX);
        assert_eq!(parse_int_prefix("-99999999999999999999999"), i64::MIN);
    }

    #[test]
    fn test_permissive_float() {
        assert_eq!(parse_float_prefix("15"), 15.0);
        assert_eq!(parse_float_prefix(" 6.5 EUR"), 6.5);
        assert_eq!(parse_float_prefix(".5"), 0.5);
        assert_eq!(parse_float_prefix("5."), 5.0);
        assert_eq!(parse_float_prefix("1e3"), 1000.0);
        assert_eq!(parse_float_prefix("1e"), 1.0);
        assert_eq!(parse_float_prefix("-2.5E-1x"), -0.25);
        assert_eq!(parse_float_prefix("."), 0.0);
        assert_eq!(parse_float_prefix("price"), 0.0);
        assert!(parse_float_prefix("-inf").is_infinite());
        assert!(parse_float_prefix("NaN").is_nan());
    }

    #[test]
    fn test_cast_by_type() {
        assert_eq!(
            cast("44.95".to_string(), ValueType::FLOAT),
            Some(Value::Float(44.95))
        );
        assert_eq!(cast("7".to_string(), ValueType::INT), Some(Value::Int(7)));
        assert_eq!(
            cast("7".to_string(), ValueType::Array(Scalar::Int)),
            Some(Value::Int(7))
        );
        assert_eq!(cast("yes".to_string(), ValueType::BOOL), Some(Value::Bool(true)));
        assert_eq!(cast("perhaps".to_string(), ValueType::BOOL), None);
        assert_eq!(
            cast("as is".to_string(), ValueType::UNTYPED),
            Some(Value::Str("as is".to_string()))
        );
    }

    #[test]
    fn test_type_markers() {
        assert!(ValueType::Array(Scalar::String).is_array());
        assert!(!ValueType::Array(Scalar::String).is_prototype());
        assert!(ValueType::PrototypeArray.is_array());
        assert!(ValueType::PrototypeArray.is_prototype());
        assert!(ValueType::Prototype.is_prototype());
        assert!(!ValueType::Prototype.is_array());
        assert_eq!(ValueType::Prototype.scalar(), None);
        assert_eq!(ValueType::FLOAT.scalar(), Some(Scalar::Float));
    }
}
