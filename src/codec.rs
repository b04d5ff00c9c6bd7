//! XML-RPC wire codec
//!
//! Requests are pulled through `quick_xml::Reader` into a flat token list
//! (element opens, closes and merged text runs) and then parsed by a small
//! recursive descent over that list. Responses are written with
//! `quick_xml::Writer`.

use crate::fault::Fault;
use crate::value::{Value, DATETIME_FORMAT, DATETIME_FORMAT_DASHED};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("request body is not valid UTF-8")]
    Encoding,

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("unexpected document structure: expected {expected}, found {found}")]
    Structure { expected: String, found: String },

    #[error("invalid {kind} value {text:?}")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("unknown value type <{0}>")]
    UnknownType(String),

    #[error("values nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("missing method name")]
    MissingMethodName,

    #[error("failed to write document: {0}")]
    Write(String),
}

/// A decoded `methodCall` envelope
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open(name) => format!("<{name}>"),
            Token::Close(name) => format!("</{name}>"),
            Token::Text(text) => format!("text {:?}", text.trim()),
        }
    }
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Text(last)) = tokens.last_mut() {
        last.push_str(text);
    } else {
        tokens.push(Token::Text(text.to_string()));
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(bytes).map_err(|_| CodecError::Encoding)
}

fn resolve_entity(name: &str) -> Result<char, CodecError> {
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => name.strip_prefix('#').and_then(|code| {
            let parsed = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse::<u32>().ok(),
            };
            parsed.and_then(char::from_u32)
        }),
    };
    resolved.ok_or_else(|| CodecError::Xml(format!("unknown entity &{name};")))
}

fn tokenize(input: &[u8]) -> Result<Vec<Token>, CodecError> {
    let source = utf8(input)?;
    let mut reader = Reader::from_str(source);
    let mut tokens = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let name = utf8(e.local_name().as_ref())?.to_string();
                tokens.push(Token::Open(name));
            }
            Event::Empty(e) => {
                let name = utf8(e.local_name().as_ref())?.to_string();
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Event::End(e) => {
                let name = utf8(e.local_name().as_ref())?.to_string();
                tokens.push(Token::Close(name));
            }
            Event::Text(t) => push_text(&mut tokens, utf8(&t)?),
            Event::CData(c) => push_text(&mut tokens, utf8(&c)?),
            Event::GeneralRef(r) => {
                let ch = resolve_entity(utf8(&r)?)?;
                push_text(&mut tokens, ch.encode_utf8(&mut [0u8; 4]));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(tokens)
}

/// Deepest `<value>` nesting accepted in a request.
pub const MAX_DEPTH: usize = 64;

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn found(&self) -> String {
        self.peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of document".to_string())
    }

    fn structure(&self, expected: impl Into<String>) -> CodecError {
        CodecError::Structure {
            expected: expected.into(),
            found: self.found(),
        }
    }

    /// Skip whitespace between elements.
    fn skip_ws(&mut self) {
        while let Some(Token::Text(t)) = self.peek() {
            if !t.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn peek_open(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Open(name)) => Some(name),
            _ => None,
        }
    }

    fn expect_open(&mut self, name: &str) -> Result<(), CodecError> {
        self.skip_ws();
        match self.peek() {
            Some(Token::Open(n)) if n == name => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.structure(format!("<{name}>"))),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), CodecError> {
        self.skip_ws();
        match self.peek() {
            Some(Token::Close(n)) if n == name => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.structure(format!("</{name}>"))),
        }
    }

    /// Text content up to and including the closing tag. Whitespace is kept.
    fn text_until_close(&mut self, name: &str) -> Result<String, CodecError> {
        let text = match self.peek() {
            Some(Token::Text(t)) => {
                let t = t.clone();
                self.pos += 1;
                t
            }
            _ => String::new(),
        };
        match self.peek() {
            Some(Token::Close(n)) if n == name => {
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.structure(format!("</{name}>"))),
        }
    }

    fn expect_end(&mut self) -> Result<(), CodecError> {
        self.skip_ws();
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.structure("end of document")),
        }
    }
}

fn scalar<T: std::str::FromStr>(kind: &'static str, text: &str) -> Result<T, CodecError> {
    text.trim().parse::<T>().map_err(|_| CodecError::InvalidScalar {
        kind,
        text: text.to_string(),
    })
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, CodecError> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT_DASHED))
        .map_err(|_| CodecError::InvalidScalar {
            kind: "dateTime.iso8601",
            text: text.to_string(),
        })
}

fn parse_value(cursor: &mut Cursor) -> Result<Value, CodecError> {
    if cursor.depth >= MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }
    cursor.depth += 1;
    let value = parse_value_inner(cursor);
    cursor.depth -= 1;
    value
}

fn parse_value_inner(cursor: &mut Cursor) -> Result<Value, CodecError> {
    cursor.expect_open("value")?;

    // untyped content is a string
    match cursor.peek() {
        Some(Token::Close(n)) if n == "value" => {
            cursor.pos += 1;
            return Ok(Value::String(String::new()));
        }
        Some(Token::Text(t)) => {
            if let Some(Token::Close(n)) = cursor.tokens.get(cursor.pos + 1) {
                if n == "value" {
                    let s = t.clone();
                    cursor.pos += 2;
                    return Ok(Value::String(s));
                }
            }
        }
        _ => {}
    }

    cursor.skip_ws();
    let kind = cursor
        .peek_open()
        .map(str::to_string)
        .ok_or_else(|| cursor.structure("a value type element"))?;
    cursor.pos += 1;

    let value = match kind.as_str() {
        "int" | "i4" | "i8" => Value::Int(scalar("int", &cursor.text_until_close(&kind)?)?),
        "boolean" => {
            let text = cursor.text_until_close(&kind)?;
            let flag = match text.trim() {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            };
            match flag {
                Some(b) => Value::Boolean(b),
                None => {
                    return Err(CodecError::InvalidScalar {
                        kind: "boolean",
                        text,
                    })
                }
            }
        }
        "string" => Value::String(cursor.text_until_close(&kind)?),
        "double" => {
            let text = cursor.text_until_close(&kind)?;
            let d: f64 = scalar("double", &text)?;
            if !d.is_finite() {
                return Err(CodecError::InvalidScalar {
                    kind: "double",
                    text,
                });
            }
            Value::Double(d)
        }
        "dateTime.iso8601" => Value::DateTime(parse_datetime(&cursor.text_until_close(&kind)?)?),
        "base64" => {
            let text = cursor.text_until_close(&kind)?;
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|_| CodecError::InvalidScalar {
                    kind: "base64",
                    text,
                })?;
            Value::Base64(bytes)
        }
        "nil" => {
            cursor.expect_close("nil")?;
            Value::Nil
        }
        "struct" => {
            let mut members = BTreeMap::new();
            loop {
                cursor.skip_ws();
                if cursor.peek_open() != Some("member") {
                    break;
                }
                cursor.pos += 1;
                cursor.expect_open("name")?;
                let name = cursor.text_until_close("name")?;
                let value = parse_value(cursor)?;
                cursor.expect_close("member")?;
                members.insert(name, value);
            }
            cursor.expect_close("struct")?;
            Value::Struct(members)
        }
        "array" => {
            cursor.expect_open("data")?;
            let mut items = Vec::new();
            loop {
                cursor.skip_ws();
                if cursor.peek_open() != Some("value") {
                    break;
                }
                items.push(parse_value(cursor)?);
            }
            cursor.expect_close("data")?;
            cursor.expect_close("array")?;
            Value::Array(items)
        }
        other => return Err(CodecError::UnknownType(other.to_string())),
    };

    cursor.expect_close("value")?;
    Ok(value)
}

/// Decode a `methodCall` request body.
pub fn parse_method_call(body: &[u8]) -> Result<MethodCall, CodecError> {
    let mut cursor = Cursor::new(tokenize(body)?);

    cursor.expect_open("methodCall")?;
    cursor.expect_open("methodName")?;
    let method_name = cursor.text_until_close("methodName")?.trim().to_string();
    if method_name.is_empty() {
        return Err(CodecError::MissingMethodName);
    }

    let mut params = Vec::new();
    cursor.skip_ws();
    if cursor.peek_open() == Some("params") {
        cursor.pos += 1;
        loop {
            cursor.skip_ws();
            if cursor.peek_open() != Some("param") {
                break;
            }
            cursor.pos += 1;
            params.push(parse_value(&mut cursor)?);
            cursor.expect_close("param")?;
        }
        cursor.expect_close("params")?;
    }

    cursor.expect_close("methodCall")?;
    cursor.expect_end()?;

    Ok(MethodCall {
        method_name,
        params,
    })
}

/// Decode a `methodResponse` into either its value or its fault.
pub fn parse_response(body: &[u8]) -> Result<Result<Value, Fault>, CodecError> {
    let mut cursor = Cursor::new(tokenize(body)?);

    cursor.expect_open("methodResponse")?;
    cursor.skip_ws();
    let outcome = if cursor.peek_open() == Some("fault") {
        cursor.pos += 1;
        let value = parse_value(&mut cursor)?;
        cursor.expect_close("fault")?;
        Err(fault_from_value(&value)?)
    } else {
        cursor.expect_open("params")?;
        cursor.expect_open("param")?;
        let value = parse_value(&mut cursor)?;
        cursor.expect_close("param")?;
        cursor.expect_close("params")?;
        Ok(value)
    };
    cursor.expect_close("methodResponse")?;
    cursor.expect_end()?;

    Ok(outcome)
}

fn fault_from_value(value: &Value) -> Result<Fault, CodecError> {
    let members = value.as_struct().ok_or_else(|| CodecError::Structure {
        expected: "fault struct".to_string(),
        found: value.type_name().to_string(),
    })?;
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok());
    let message = members.get("faultString").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => Ok(Fault::new(code, message)),
        _ => Err(CodecError::Structure {
            expected: "faultCode and faultString members".to_string(),
            found: members.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), CodecError> {
    writer
        .write_event(event)
        .map_err(|e| CodecError::Write(e.to_string()))
}

fn open(writer: &mut XmlWriter, tag: &str) -> Result<(), CodecError> {
    write(writer, Event::Start(BytesStart::new(tag)))
}

fn close(writer: &mut XmlWriter, tag: &str) -> Result<(), CodecError> {
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<(), CodecError> {
    open(writer, tag)?;
    write(writer, Event::Text(BytesText::new(text)))?;
    close(writer, tag)
}

fn write_value(writer: &mut XmlWriter, value: &Value) -> Result<(), CodecError> {
    open(writer, "value")?;
    match value {
        Value::Int(i) => {
            let tag = if i32::try_from(*i).is_ok() { "i4" } else { "i8" };
            element(writer, tag, &i.to_string())?;
        }
        Value::Boolean(b) => element(writer, "boolean", if *b { "1" } else { "0" })?,
        Value::String(s) => element(writer, "string", s)?,
        Value::Double(d) if !d.is_finite() => {
            return Err(CodecError::Write(format!("double {d} has no XML-RPC form")))
        }
        Value::Double(d) => element(writer, "double", &d.to_string())?,
        Value::DateTime(dt) => {
            element(writer, "dateTime.iso8601", &dt.format(DATETIME_FORMAT).to_string())?
        }
        Value::Base64(bytes) => element(writer, "base64", &STANDARD.encode(bytes))?,
        Value::Struct(members) => {
            open(writer, "struct")?;
            for (name, member) in members {
                open(writer, "member")?;
                element(writer, "name", name)?;
                write_value(writer, member)?;
                close(writer, "member")?;
            }
            close(writer, "struct")?;
        }
        Value::Array(items) => {
            open(writer, "array")?;
            open(writer, "data")?;
            for item in items {
                write_value(writer, item)?;
            }
            close(writer, "data")?;
            close(writer, "array")?;
        }
        Value::Nil => write(writer, Event::Empty(BytesStart::new("nil")))?,
    }
    close(writer, "value")
}

fn document() -> Result<XmlWriter, CodecError> {
    let mut writer = Writer::new(Vec::new());
    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    Ok(writer)
}

/// Encode a successful `methodResponse` carrying `value`.
pub fn write_response(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut writer = document()?;
    open(&mut writer, "methodResponse")?;
    open(&mut writer, "params")?;
    open(&mut writer, "param")?;
    write_value(&mut writer, value)?;
    close(&mut writer, "param")?;
    close(&mut writer, "params")?;
    close(&mut writer, "methodResponse")?;
    Ok(writer.into_inner())
}

/// Encode a fault `methodResponse`.
pub fn write_fault(fault: &Fault) -> Result<Vec<u8>, CodecError> {
    let body = Value::structure([
        ("faultCode", Value::Int(i64::from(fault.code))),
        ("faultString", Value::String(fault.message.clone())),
    ]);
    let mut writer = document()?;
    open(&mut writer, "methodResponse")?;
    open(&mut writer, "fault")?;
    write_value(&mut writer, &body)?;
    close(&mut writer, "fault")?;
    close(&mut writer, "methodResponse")?;
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_call_with_mixed_params() {
        let body = br#"<?xml version="1.0"?>
<methodCall>
  <methodName>service.sum</methodName>
  <params>
    <param><value><i4>2</i4></value></param>
    <param><value><int>3</int></value></param>
    <param><value>plain</value></param>
    <param><value><double>1.5</double></value></param>
  </params>
</methodCall>"#;
        let call = parse_method_call(body).unwrap();
        assert_eq!(call.method_name, "service.sum");
        assert_eq!(
            call.params,
            vec![
                Value::Int(2),
                Value::Int(3),
                Value::from("plain"),
                Value::Double(1.5)
            ]
        );
    }

    #[test]
    fn params_element_is_optional() {
        let call =
            parse_method_call(b"<methodCall><methodName>service.time</methodName></methodCall>")
                .unwrap();
        assert_eq!(call.method_name, "service.time");
        assert!(call.params.is_empty());
    }

    #[test]
    fn string_whitespace_and_entities_are_preserved() {
        let body = b"<methodCall><methodName>service.upcase</methodName><params>\
<param><value><string>  a &amp; b &#x3C;c&#62; </string></value></param>\
</params></methodCall>";
        let call = parse_method_call(body).unwrap();
        assert_eq!(call.params, vec![Value::from("  a & b <c> ")]);
    }

    #[test]
    fn parses_nested_struct_array_and_scalars() {
        let body = b"<methodCall><methodName>x.y</methodName><params><param><value><struct>\
<member><name>list</name><value><array><data>\
<value><boolean>1</boolean></value><value><nil/></value>\
<value><dateTime.iso8601>20240102T03:04:05</dateTime.iso8601></value>\
<value><base64>aGk=</base64></value>\
</data></array></value></member>\
<member><name>empty</name><value><string/></value></member>\
</struct></value></param></params></methodCall>";
        let call = parse_method_call(body).unwrap();
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let expected = Value::structure([
            (
                "list",
                Value::Array(vec![
                    Value::Boolean(true),
                    Value::Nil,
                    Value::DateTime(dt),
                    Value::Base64(b"hi".to_vec()),
                ]),
            ),
            ("empty", Value::from("")),
        ]);
        assert_eq!(call.params, vec![expected]);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            parse_method_call(b"<methodCall><methodName>a</methodCall>"),
            Err(CodecError::Xml(_)) | Err(CodecError::Structure { .. })
        ));
        assert!(matches!(
            parse_method_call(b"<methodCall><methodName> </methodName></methodCall>"),
            Err(CodecError::MissingMethodName)
        ));
        assert!(matches!(
            parse_method_call(b"<methodCall><methodName>a</methodName><params><param><value><i4>x</i4></value></param></params></methodCall>"),
            Err(CodecError::InvalidScalar { kind: "int", .. })
        ));
        assert!(matches!(
            parse_method_call(b"<methodCall><methodName>a</methodName><params><param><value><float>1</float></value></param></params></methodCall>"),
            Err(CodecError::UnknownType(_))
        ));
        assert!(matches!(parse_method_call(b""), Err(CodecError::Structure { .. })));
    }

    fn nested_arrays(levels: usize) -> Vec<u8> {
        let mut body = String::from("<methodCall><methodName>x.y</methodName><params><param>");
        body.push_str(&"<value><array><data>".repeat(levels));
        body.push_str(&"</data></array></value>".repeat(levels));
        body.push_str("</param></params></methodCall>");
        body.into_bytes()
    }

    #[test]
    fn nesting_depth_is_bounded() {
        assert!(parse_method_call(&nested_arrays(MAX_DEPTH)).is_ok());
        assert!(matches!(
            parse_method_call(&nested_arrays(MAX_DEPTH + 1)),
            Err(CodecError::TooDeep(MAX_DEPTH))
        ));
        assert!(matches!(
            parse_method_call(&nested_arrays(30_000)),
            Err(CodecError::TooDeep(_))
        ));
    }

    #[test]
    fn non_finite_doubles_are_rejected() {
        for text in ["NaN", "inf", "-inf", "infinity"] {
            let body = format!(
                "<methodCall><methodName>a.b</methodName><params><param><value><double>{text}</double></value></param></params></methodCall>"
            );
            assert!(
                matches!(
                    parse_method_call(body.as_bytes()),
                    Err(CodecError::InvalidScalar { kind: "double", .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn non_finite_doubles_are_not_written() {
        assert!(matches!(
            write_response(&Value::Double(f64::NAN)),
            Err(CodecError::Write(_))
        ));
    }

    #[test]
    fn fault_document_carries_code_and_message() {
        let xml = write_fault(&Fault::new(500, "Server error")).unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.contains("<name>faultCode</name><value><i4>500</i4></value>"));
        assert!(text.contains("<string>Server error</string>"));
        assert_eq!(
            parse_response(&xml).unwrap(),
            Err(Fault::new(500, "Server error"))
        );
    }

    #[test]
    fn response_escapes_text_and_widens_large_ints() {
        let value = Value::Array(vec![
            Value::from("<&>"),
            Value::Int(i64::from(i32::MAX) + 1),
        ]);
        let xml = write_response(&value).unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("&lt;&amp;&gt;"));
        assert!(text.contains("<i8>2147483648</i8>"));
        assert_eq!(parse_response(&xml).unwrap(), Ok(value));
    }
}
