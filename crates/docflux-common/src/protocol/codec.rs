//! XML-RPC wire codec.
//!
//! Encoding is hand-built escaped XML (no DOM, no serde detour), decoding
//! is an event walk over `quick-xml`. The codec is pure: it maps between
//! [`Value`] trees and document bytes and never touches a socket.
//!
//! # Wire shape
//!
//! ```text
//! <?xml version="1.0"?>
//! <methodCall>
//!   <methodName>convert</methodName>
//!   <params>
//!     <param><value><string>/a.odt</string></value></param>
//!     ...
//!   </params>
//! </methodCall>
//! ```
//!
//! Responses carry either one `<params><param><value>` result or a
//! `<fault>` struct with `faultCode`/`faultString`, which this codec
//! surfaces as [`ConvertError::Upstream`]. Integers are accepted under
//! both `<int>` and `<i4>` element names.

use std::fmt::Write as _;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::protocol::error::{ConvertError, Result};
use crate::protocol::value::Value;

/// Encodes a `methodCall` document with an ordered parameter list.
pub fn encode_method_call(method: &str, params: &[Value]) -> String {
    let mut xml = String::with_capacity(256);
    xml.push_str("<?xml version=\"1.0\"?>\n<methodCall>\n<methodName>");
    escape_into(&mut xml, method);
    xml.push_str("</methodName>\n<params>\n");
    for param in params {
        xml.push_str("<param>");
        encode_value_into(&mut xml, param);
        xml.push_str("</param>\n");
    }
    xml.push_str("</params>\n</methodCall>\n");
    xml
}

/// Decodes a `methodResponse` document.
///
/// Returns the first parameter value, or [`ConvertError::Upstream`] when
/// the body carries a `<fault>`.
pub fn decode_method_response(xml: &[u8]) -> Result<Value> {
    let mut reader = new_reader(xml);

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"methodResponse" | b"params" | b"param" => {}
                b"value" => return read_value(&mut reader),
                b"fault" => return Err(read_fault(&mut reader)?),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unexpected element <{}> in response",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "response carries no value".to_string(),
                ))
            }
            _ => {}
        }
    }
}

/// Decodes a `methodCall` document into its method name and parameters.
///
/// Used by diagnostics and by mock converters in tests to assert the
/// exact parameter layout a client put on the wire.
pub fn decode_method_call(xml: &[u8]) -> Result<(String, Vec<Value>)> {
    let mut reader = new_reader(xml);
    let mut method: Option<String> = None;
    let mut params = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"methodCall" | b"params" | b"param" => {}
                b"methodName" => method = Some(read_element_text(&mut reader, b"methodName")?),
                b"value" => params.push(read_value(&mut reader)?),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unexpected element <{}> in call",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    match method {
        Some(name) => Ok((name, params)),
        None => Err(ConvertError::MalformedResponse(
            "call carries no methodName".to_string(),
        )),
    }
}

fn new_reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;
    reader
}

fn encode_value_into(buf: &mut String, value: &Value) {
    buf.push_str("<value>");
    match value {
        Value::String(s) => {
            buf.push_str("<string>");
            escape_into(buf, s);
            buf.push_str("</string>");
        }
        Value::Int(n) => {
            let _ = write!(buf, "<int>{}</int>", n);
        }
        Value::Double(x) => {
            let _ = write!(buf, "<double>{}</double>", x);
        }
        Value::Bool(b) => {
            buf.push_str(if *b {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        Value::Base64(text) => {
            // The base64 alphabet never collides with XML markup.
            buf.push_str("<base64>");
            buf.push_str(text);
            buf.push_str("</base64>");
        }
        Value::Nil => buf.push_str("<nil/>"),
        Value::Array(items) => {
            buf.push_str("<array><data>");
            for item in items {
                encode_value_into(buf, item);
            }
            buf.push_str("</data></array>");
        }
        Value::Struct(members) => {
            buf.push_str("<struct>");
            for (name, member) in members {
                buf.push_str("<member><name>");
                escape_into(buf, name);
                buf.push_str("</name>");
                encode_value_into(buf, member);
                buf.push_str("</member>");
            }
            buf.push_str("</struct>");
        }
    }
    buf.push_str("</value>");
}

/// Escape XML special characters into an existing buffer.
fn escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

/// Reads one value. The opening `<value>` tag has already been consumed;
/// this reads through the matching `</value>`.
fn read_value(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut typed: Option<Value> = None;
    let mut bare_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                tag @ (b"string" | b"int" | b"i4" | b"double" | b"boolean" | b"base64") => {
                    let tag = tag.to_vec();
                    let body = read_element_text(reader, &tag)?;
                    typed = Some(parse_scalar(&tag, &body)?);
                }
                b"array" => typed = Some(read_array(reader)?),
                b"struct" => typed = Some(read_struct(reader)?),
                b"nil" => typed = Some(Value::Nil),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unknown value element <{}>",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"nil" => typed = Some(Value::Nil),
                b"string" => typed = Some(Value::String(String::new())),
                b"base64" => typed = Some(Value::Base64(String::new())),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unknown empty element <{}/>",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Text(e) => bare_text.push_str(&e.unescape()?),
            Event::End(e) if e.local_name().as_ref() == b"value" => {
                // A <value> without a type element is a string.
                return Ok(typed.unwrap_or(Value::String(bare_text)));
            }
            Event::End(_) => {}
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "document ended inside a value".to_string(),
                ))
            }
            _ => {}
        }
    }
}

/// Collects the text body of a leaf element through its end tag.
fn read_element_text(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::End(e) if e.local_name().as_ref() == tag => return Ok(text),
            Event::Start(e) => {
                return Err(ConvertError::MalformedResponse(format!(
                    "unexpected element <{}> inside <{}>",
                    String::from_utf8_lossy(e.local_name().as_ref()),
                    String::from_utf8_lossy(tag)
                )))
            }
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(format!(
                    "document ended inside <{}>",
                    String::from_utf8_lossy(tag)
                )))
            }
            _ => {}
        }
    }
}

fn parse_scalar(tag: &[u8], body: &str) -> Result<Value> {
    match tag {
        b"string" => Ok(Value::String(body.to_string())),
        b"int" | b"i4" => body
            .trim()
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|_| ConvertError::MalformedResponse(format!("invalid int '{}'", body))),
        b"double" => body
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| ConvertError::MalformedResponse(format!("invalid double '{}'", body))),
        b"boolean" => match body.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(ConvertError::MalformedResponse(format!(
                "invalid boolean '{}'",
                other
            ))),
        },
        b"base64" => Ok(Value::Base64(body.trim().to_string())),
        _ => Err(ConvertError::MalformedResponse(format!(
            "unknown scalar <{}>",
            String::from_utf8_lossy(tag)
        ))),
    }
}

fn read_array(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"data" => {}
                b"value" => items.push(read_value(reader)?),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unexpected element <{}> in array",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Empty(e) if e.local_name().as_ref() == b"data" => {}
            Event::End(e) => match e.local_name().as_ref() {
                b"data" => {}
                b"array" => return Ok(Value::Array(items)),
                _ => {}
            },
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "document ended inside an array".to_string(),
                ))
            }
            _ => {}
        }
    }
}

fn read_struct(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut members = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"member" => {
                members.push(read_member(reader)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"struct" => {
                return Ok(Value::Struct(members));
            }
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "document ended inside a struct".to_string(),
                ))
            }
            _ => {}
        }
    }
}

fn read_member(reader: &mut Reader<&[u8]>) -> Result<(String, Value)> {
    let mut name: Option<String> = None;
    let mut value: Option<Value> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => name = Some(read_element_text(reader, b"name")?),
                b"value" => value = Some(read_value(reader)?),
                other => {
                    return Err(ConvertError::MalformedResponse(format!(
                        "unexpected element <{}> in member",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"member" => {
                return match (name, value) {
                    (Some(name), Some(value)) => Ok((name, value)),
                    _ => Err(ConvertError::MalformedResponse(
                        "struct member missing name or value".to_string(),
                    )),
                };
            }
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "document ended inside a member".to_string(),
                ))
            }
            _ => {}
        }
    }
}

/// Reads the `<fault>` payload into the error it represents.
fn read_fault(reader: &mut Reader<&[u8]>) -> Result<ConvertError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"value" => {
                let payload = read_value(reader)?;
                let code = payload
                    .member("faultCode")
                    .and_then(Value::as_int)
                    .ok_or_else(|| {
                        ConvertError::MalformedResponse("fault without faultCode".to_string())
                    })?;
                let message = payload
                    .member("faultString")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ConvertError::MalformedResponse("fault without faultString".to_string())
                    })?
                    .to_string();
                return Ok(ConvertError::Upstream { code, message });
            }
            Event::Eof => {
                return Err(ConvertError::MalformedResponse(
                    "document ended inside a fault".to_string(),
                ))
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) -> Value {
        let xml = encode_method_call("echo", std::slice::from_ref(&value));
        let (method, params) = decode_method_call(xml.as_bytes()).unwrap();
        assert_eq!(method, "echo");
        assert_eq!(params.len(), 1);
        params.into_iter().next().unwrap()
    }

    #[test]
    fn test_round_trip_scalars() {
        for value in [
            Value::String("plain".to_string()),
            Value::String("needs <escaping> & \"quotes\"".to_string()),
            Value::String(String::new()),
            Value::Int(0),
            Value::Int(-42),
            Value::Int(i32::MAX),
            Value::Double(1.5),
            Value::Double(-0.25),
            Value::Bool(true),
            Value::Bool(false),
            Value::Base64("SGVsbG8=".to_string()),
            Value::Nil,
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn test_round_trip_array_and_struct() {
        let value = Value::Array(vec![
            Value::Int(1),
            Value::String("two".to_string()),
            Value::Array(vec![Value::Nil, Value::Bool(true)]),
            Value::Struct(vec![
                ("name".to_string(), Value::String("writer_pdf".to_string())),
                ("quality".to_string(), Value::Int(90)),
            ]),
        ]);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_round_trip_empty_array() {
        let value = Value::Array(vec![]);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_decode_accepts_i4_and_int() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><params><param>\
            <value><i4>7</i4></value></param></params></methodResponse>";
        assert_eq!(decode_method_response(xml).unwrap(), Value::Int(7));

        let xml = b"<?xml version=\"1.0\"?><methodResponse><params><param>\
            <value><int>7</int></value></param></params></methodResponse>";
        assert_eq!(decode_method_response(xml).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_decode_bare_text_value_is_string() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><params><param>\
            <value>untyped</value></param></params></methodResponse>";
        assert_eq!(
            decode_method_response(xml).unwrap(),
            Value::String("untyped".to_string())
        );
    }

    #[test]
    fn test_decode_fault() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
            <member><name>faultCode</name><value><int>1</int></value></member>\
            <member><name>faultString</name><value><string>bad document</string></value></member>\
            </struct></value></fault></methodResponse>";
        match decode_method_response(xml) {
            Err(ConvertError::Upstream { code, message }) => {
                assert_eq!(code, 1);
                assert_eq!(message, "bad document");
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_fault_missing_code_is_malformed() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
            <member><name>faultString</name><value><string>bad</string></value></member>\
            </struct></value></fault></methodResponse>";
        assert!(matches!(
            decode_method_response(xml),
            Err(ConvertError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_response() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><params></params></methodResponse>";
        assert!(matches!(
            decode_method_response(xml),
            Err(ConvertError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_document() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><params><param><value><string>x";
        assert!(decode_method_response(xml).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_int() {
        let xml = b"<?xml version=\"1.0\"?><methodResponse><params><param>\
            <value><int>seven</int></value></param></params></methodResponse>";
        assert!(matches!(
            decode_method_response(xml),
            Err(ConvertError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_encode_boolean_as_digit() {
        let xml = encode_method_call("probe", &[Value::Bool(true), Value::Bool(false)]);
        assert!(xml.contains("<boolean>1</boolean>"));
        assert!(xml.contains("<boolean>0</boolean>"));
    }

    #[test]
    fn test_encode_escapes_method_and_strings() {
        let xml = encode_method_call("a&b", &[Value::String("<doc>".to_string())]);
        assert!(xml.contains("<methodName>a&amp;b</methodName>"));
        assert!(xml.contains("<string>&lt;doc&gt;</string>"));
    }

    #[test]
    fn test_convert_call_parameter_layout() {
        // FilePath-mode convert call: 8 params with nils in the reserved
        // slots, paths in 1 and 3, and the boolean flag in 7.
        let params = vec![
            Value::String("/a.odt".to_string()),
            Value::Nil,
            Value::String("/a.pdf".to_string()),
            Value::String("pdf".to_string()),
            Value::Nil,
            Value::Array(vec![]),
            Value::Bool(true),
            Value::Nil,
        ];
        let xml = encode_method_call("convert", &params);
        let (method, decoded) = decode_method_call(xml.as_bytes()).unwrap();

        assert_eq!(method, "convert");
        assert_eq!(decoded.len(), 8);
        assert_eq!(decoded[0].as_str(), Some("/a.odt"));
        assert!(decoded[1].is_nil());
        assert_eq!(decoded[2].as_str(), Some("/a.pdf"));
        assert_eq!(decoded[3].as_str(), Some("pdf"));
        assert!(decoded[4].is_nil());
        assert_eq!(decoded[5], Value::Array(vec![]));
        assert_eq!(decoded[6].as_bool(), Some(true));
        assert!(decoded[7].is_nil());
    }
}
