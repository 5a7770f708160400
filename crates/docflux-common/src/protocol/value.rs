//! XML-RPC value model.
//!
//! This is the domain side of the wire codec: every parameter and result
//! that crosses the converter wire is one of these variants. The grammar
//! matches what conversion backends actually emit: scalars, `<nil/>`,
//! ordered arrays and named-member structs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::protocol::error::{ConvertError, Result};

/// A single XML-RPC value.
///
/// `Base64` holds the raw base64 *text* exactly as it appears on the
/// wire. Stream-mode conversion results are handed to callers in this
/// form; [`Value::decode_base64`] is available when the bytes are wanted.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i32),
    Double(f64),
    Bool(bool),
    Base64(String),
    Nil,
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Builds a `Base64` value from raw bytes.
    pub fn base64_from_bytes(data: &[u8]) -> Value {
        Value::Base64(BASE64.encode(data))
    }

    /// Decodes a `Base64` value back into bytes.
    pub fn decode_base64(&self) -> Result<Vec<u8>> {
        match self {
            Value::Base64(text) => BASE64.decode(text.as_bytes()).map_err(|e| {
                ConvertError::MalformedResponse(format!("invalid base64 payload: {}", e))
            }),
            other => Err(ConvertError::MalformedResponse(format!(
                "expected base64 value, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a struct member by name. Returns `None` for non-structs.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Base64(_) => "base64",
            Value::Nil => "nil",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_from_bytes() {
        let value = Value::base64_from_bytes(b"Hello");
        assert_eq!(value, Value::Base64("SGVsbG8=".to_string()));
    }

    #[test]
    fn test_decode_base64_round_trip() {
        let value = Value::base64_from_bytes(b"document body");
        assert_eq!(value.decode_base64().unwrap(), b"document body");
    }

    #[test]
    fn test_decode_base64_rejects_other_types() {
        let err = Value::Int(3).decode_base64().unwrap_err();
        assert!(err.to_string().contains("expected base64"));
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        let value = Value::Base64("not!!base64".to_string());
        assert!(value.decode_base64().is_err());
    }

    #[test]
    fn test_struct_member_lookup() {
        let value = Value::Struct(vec![
            ("faultCode".to_string(), Value::Int(1)),
            ("faultString".to_string(), Value::String("bad".to_string())),
        ]);
        assert_eq!(value.member("faultCode").and_then(Value::as_int), Some(1));
        assert_eq!(
            value.member("faultString").and_then(Value::as_str),
            Some("bad")
        );
        assert!(value.member("missing").is_none());
        assert!(Value::Nil.member("faultCode").is_none());
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from("x"), Value::String("x".to_string()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert!(Value::Nil.is_nil());
    }
}
