// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal XML-RPC codec and method dispatch.
//!
//! Supports the value types the conversion methods need: string, int,
//! boolean, double, struct, array and the `<nil/>` extension (a cache
//! miss has no path to return). Unknown methods and malformed calls are
//! answered with XML-RPC faults, not transport errors.

use crate::AppState;
use convd_convert::{Options, convert_doc};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

/// Fault code for unparsable request bodies.
pub const FAULT_PARSE: i64 = 1;
/// Fault code for unknown method names.
pub const FAULT_UNKNOWN_METHOD: i64 = 2;
/// Fault code for parameter shape/type mismatches.
pub const FAULT_INVALID_PARAMS: i64 = 3;
/// Fault code for failures while executing a method.
pub const FAULT_RUNTIME: i64 = 4;

/// Exposed methods with their `system.methodHelp` text.
pub const METHODS: &[(&str, &str)] = &[
    (
        "convert_locally",
        "convert_locally(src_path, options) => (path, cache_key, metadata): \
         convert a server-local document, consulting the cache when one is \
         configured. cache_key is nil without a cache.",
    ),
    (
        "get_cached",
        "get_cached(cache_key) => path: path of a cached artifact, or nil \
         when the key is unknown.",
    ),
    (
        "system.listMethods",
        "system.listMethods() => [method_name]: list the supported methods.",
    ),
    (
        "system.methodHelp",
        "system.methodHelp(method_name) => help_text.",
    ),
];

/// An XML-RPC value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The `<nil/>` extension value.
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

/// An XML-RPC fault answer.
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Decode errors for method calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed method call: {0}")]
    Malformed(String),
    #[error("unsupported value type <{0}>")]
    Unsupported(String),
    #[error("invalid <{kind}> scalar: '{value}'")]
    BadScalar { kind: String, value: String },
}

/// Process one request body into a response body.
pub fn handle(state: &AppState, body: &str) -> String {
    match parse_call(body) {
        Ok((method, params)) => {
            debug!(%method, params = params.len(), "xml-rpc call");
            match dispatch(state, &method, params) {
                Ok(value) => response_xml(&value),
                Err(fault) => fault_xml(&fault),
            }
        }
        Err(err) => fault_xml(&Fault::new(FAULT_PARSE, err.to_string())),
    }
}

// -- dispatch ---------------------------------------------------------------

fn dispatch(state: &AppState, method: &str, params: Vec<Value>) -> Result<Value, Fault> {
    match method {
        "convert_locally" => rpc_convert_locally(state, params),
        "get_cached" => rpc_get_cached(state, params),
        "system.listMethods" => Ok(Value::Array(
            METHODS
                .iter()
                .map(|(name, _)| Value::Str((*name).to_string()))
                .collect(),
        )),
        "system.methodHelp" => {
            let name = param_string(&params, 0)?;
            METHODS
                .iter()
                .find(|(method, _)| *method == name)
                .map(|(_, help)| Value::Str((*help).to_string()))
                .ok_or_else(|| {
                    Fault::new(FAULT_UNKNOWN_METHOD, format!("no such method: {name}"))
                })
        }
        other => Err(Fault::new(
            FAULT_UNKNOWN_METHOD,
            format!("no such method: {other}"),
        )),
    }
}

fn rpc_convert_locally(state: &AppState, params: Vec<Value>) -> Result<Value, Fault> {
    let src = param_string(&params, 0)?;
    let pairs = match params.get(1) {
        None | Some(Value::Nil) => Vec::new(),
        Some(Value::Struct(entries)) => entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), scalar_to_string(value)?)))
            .collect::<Result<Vec<_>, Fault>>()?,
        Some(other) => {
            return Err(Fault::new(
                FAULT_INVALID_PARAMS,
                format!("options must be a struct, got {other:?}"),
            ));
        }
    };
    let options = Options::from_pairs(pairs)
        .map_err(|e| Fault::new(FAULT_INVALID_PARAMS, e.to_string()))?;

    let converted = convert_doc(
        state.converter.as_ref(),
        std::path::Path::new(&src),
        &options,
        state.cache_dir.as_deref(),
    )
    .map_err(|e| Fault::new(FAULT_RUNTIME, e.to_string()))?;

    let mut metadata = BTreeMap::new();
    metadata.insert("error".to_string(), Value::Bool(converted.metadata.error));
    metadata.insert(
        "oocp_status".to_string(),
        Value::Int(i64::from(converted.metadata.oocp_status)),
    );
    Ok(Value::Array(vec![
        converted
            .path
            .map(|p| Value::Str(p.to_string_lossy().into_owned()))
            .unwrap_or(Value::Nil),
        converted.cache_key.map(Value::Str).unwrap_or(Value::Nil),
        Value::Struct(metadata),
    ]))
}

fn rpc_get_cached(state: &AppState, params: Vec<Value>) -> Result<Value, Fault> {
    let cache_key = param_string(&params, 0)?;
    let Some(ref cache_dir) = state.cache_dir else {
        return Ok(Value::Nil);
    };
    let cached = convd_cache::CacheManager::new(cache_dir)
        .and_then(|cache| cache.cached_file(&cache_key))
        .map_err(|e| Fault::new(FAULT_RUNTIME, e.to_string()))?;
    Ok(cached
        .map(|p| Value::Str(p.to_string_lossy().into_owned()))
        .unwrap_or(Value::Nil))
}

fn param_string(params: &[Value], index: usize) -> Result<String, Fault> {
    match params.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        other => Err(Fault::new(
            FAULT_INVALID_PARAMS,
            format!("parameter {index} must be a string, got {other:?}"),
        )),
    }
}

fn scalar_to_string(value: &Value) -> Result<String, Fault> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        other => Err(Fault::new(
            FAULT_INVALID_PARAMS,
            format!("option values must be scalars, got {other:?}"),
        )),
    }
}

// -- decoding ---------------------------------------------------------------

/// Parse a `<methodCall>` body into the method name and its parameters.
pub fn parse_call(xml: &str) -> Result<(String, Vec<Value>), RpcError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut method = None;
    let mut params = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"methodName" => method = Some(read_element_text(&mut reader, b"methodName")?),
                b"value" => params.push(parse_value(&mut reader)?),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    let method = method.ok_or_else(|| RpcError::Malformed("missing methodName".to_string()))?;
    Ok((method, params))
}

/// Parse one value; the opening `<value>` tag has already been consumed.
fn parse_value(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut typed: Option<Value> = None;
    let mut bare_text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                typed = Some(match name.as_slice() {
                    b"string" => Value::Str(read_element_text(reader, b"string")?),
                    b"int" | b"i4" => parse_scalar(&read_element_text(reader, &name)?, "int")?,
                    b"boolean" => {
                        let text = read_element_text(reader, b"boolean")?;
                        match text.trim() {
                            "1" => Value::Bool(true),
                            "0" => Value::Bool(false),
                            other => {
                                return Err(RpcError::BadScalar {
                                    kind: "boolean".to_string(),
                                    value: other.to_string(),
                                });
                            }
                        }
                    }
                    b"double" => {
                        let text = read_element_text(reader, b"double")?;
                        Value::Double(text.trim().parse().map_err(|_| RpcError::BadScalar {
                            kind: "double".to_string(),
                            value: text.clone(),
                        })?)
                    }
                    b"struct" => parse_struct(reader)?,
                    b"array" => parse_array(reader)?,
                    other => {
                        return Err(RpcError::Unsupported(
                            String::from_utf8_lossy(other).into_owned(),
                        ));
                    }
                });
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"nil" => typed = Some(Value::Nil),
                b"string" => typed = Some(Value::Str(String::new())),
                other => {
                    return Err(RpcError::Unsupported(
                        String::from_utf8_lossy(other).into_owned(),
                    ));
                }
            },
            Event::Text(t) => bare_text.push_str(&t.unescape()?),
            Event::End(e) if e.name().as_ref() == b"value" => break,
            Event::Eof => return Err(RpcError::Malformed("unterminated value".to_string())),
            _ => {}
        }
    }
    // A value without a type element is a string, per the XML-RPC spec.
    Ok(typed.unwrap_or(Value::Str(bare_text)))
}

fn parse_scalar(text: &str, kind: &str) -> Result<Value, RpcError> {
    text.trim()
        .parse()
        .map(Value::Int)
        .map_err(|_| RpcError::BadScalar {
            kind: kind.to_string(),
            value: text.to_string(),
        })
}

fn parse_struct(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut entries = BTreeMap::new();
    let mut name: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"name" => name = Some(read_element_text(reader, b"name")?),
                b"value" => {
                    let key = name.take().ok_or_else(|| {
                        RpcError::Malformed("struct member value before name".to_string())
                    })?;
                    entries.insert(key, parse_value(reader)?);
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"struct" => break,
            Event::Eof => return Err(RpcError::Malformed("unterminated struct".to_string())),
            _ => {}
        }
    }
    Ok(Value::Struct(entries))
}

fn parse_array(reader: &mut Reader<&[u8]>) -> Result<Value, RpcError> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"value" => items.push(parse_value(reader)?),
            Event::End(e) if e.name().as_ref() == b"array" => break,
            Event::Eof => return Err(RpcError::Malformed("unterminated array".to_string())),
            _ => {}
        }
    }
    Ok(Value::Array(items))
}

fn read_element_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, RpcError> {
    let mut out = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => out.push_str(&t.unescape()?),
            Event::CData(t) => out.push_str(&String::from_utf8_lossy(&t.into_inner())),
            Event::End(e) if e.name().as_ref() == end => break,
            Event::Eof => {
                return Err(RpcError::Malformed(format!(
                    "unterminated <{}>",
                    String::from_utf8_lossy(end)
                )));
            }
            _ => {}
        }
    }
    Ok(out)
}

// -- encoding ---------------------------------------------------------------

/// Encode a successful method response.
pub fn response_xml(value: &Value) -> String {
    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>");
    out
}

/// Encode a fault response.
pub fn fault_xml(fault: &Fault) -> String {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), Value::Int(fault.code));
    members.insert("faultString".to_string(), Value::Str(fault.message.clone()));
    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse><fault>");
    write_value(&mut out, &Value::Struct(members));
    out.push_str("</fault></methodResponse>");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", i32::from(*b));
        }
        Value::Int(i) => {
            let _ = write!(out, "<int>{i}</int>");
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{d}</double>");
        }
        Value::Str(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(entries) => {
            out.push_str("<struct>");
            for (name, member) in entries {
                let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal client-side encoder for tests.
    pub(crate) fn call_xml(method: &str, params: &[Value]) -> String {
        let mut out = format!(
            "<?xml version='1.0'?>\n<methodCall><methodName>{}</methodName><params>",
            escape(method)
        );
        for param in params {
            out.push_str("<param>");
            write_value(&mut out, param);
            out.push_str("</param>");
        }
        out.push_str("</params></methodCall>");
        out
    }

    #[test]
    fn call_roundtrip_scalars() {
        let xml = call_xml(
            "some.method",
            &[
                Value::Str("a & b <c>".to_string()),
                Value::Int(42),
                Value::Bool(true),
                Value::Double(1.5),
                Value::Nil,
            ],
        );
        let (method, params) = parse_call(&xml).unwrap();
        assert_eq!(method, "some.method");
        assert_eq!(
            params,
            vec![
                Value::Str("a & b <c>".to_string()),
                Value::Int(42),
                Value::Bool(true),
                Value::Double(1.5),
                Value::Nil,
            ]
        );
    }

    #[test]
    fn call_roundtrip_struct_and_array() {
        let mut entries = BTreeMap::new();
        entries.insert("oocp-out-fmt".to_string(), Value::Str("pdf".to_string()));
        entries.insert("oocp-pdf-version".to_string(), Value::Bool(false));
        let xml = call_xml(
            "convert_locally",
            &[
                Value::Str("/tmp/sample.txt".to_string()),
                Value::Struct(entries.clone()),
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
            ],
        );
        let (_, params) = parse_call(&xml).unwrap();
        assert_eq!(params[1], Value::Struct(entries));
        assert_eq!(params[2], Value::Array(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn bare_text_value_is_a_string() {
        let xml = "<?xml version='1.0'?><methodCall><methodName>m</methodName>\
                   <params><param><value>plain text</value></param></params></methodCall>";
        let (_, params) = parse_call(xml).unwrap();
        assert_eq!(params, vec![Value::Str("plain text".to_string())]);
    }

    #[test]
    fn i4_is_an_int() {
        let xml = "<?xml version='1.0'?><methodCall><methodName>m</methodName>\
                   <params><param><value><i4>7</i4></value></param></params></methodCall>";
        let (_, params) = parse_call(xml).unwrap();
        assert_eq!(params, vec![Value::Int(7)]);
    }

    #[test]
    fn missing_method_name_is_malformed() {
        let err = parse_call("<methodCall></methodCall>").unwrap_err();
        assert!(matches!(err, RpcError::Malformed(_)), "got {err:?}");
    }

    #[test]
    fn response_contains_typed_value() {
        let xml = response_xml(&Value::Str("x < y".to_string()));
        assert!(xml.starts_with("<?xml version='1.0'?>"));
        assert!(xml.contains("<string>x &lt; y</string>"));
    }

    #[test]
    fn fault_carries_code_and_message() {
        let xml = fault_xml(&Fault::new(FAULT_UNKNOWN_METHOD, "no such method: x"));
        assert!(xml.contains("<fault>"));
        assert!(xml.contains("<name>faultCode</name>"));
        assert!(xml.contains("<int>2</int>"));
        assert!(xml.contains("no such method: x"));
    }
}
