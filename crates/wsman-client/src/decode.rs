// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SOAP envelope to JSON.
//!
//! The tree follows the conventions web callers already expect from AMT
//! gateways:
//!
//! - namespace prefixes are dropped and attributes are ignored;
//! - the root element is the single key of the returned object;
//! - an element with only text becomes that text, an empty element `""`;
//! - a repeated child name becomes an array, a single child is not wrapped;
//! - text mixed with child elements is kept under `"_"`;
//! - text that reads as a number or as `true`/`false` is converted.
//!
//! `ElementName` and `InstanceID` values with a leading zero stay strings,
//! since AMT uses zero-padded identifiers there. `EnumerationContext` is
//! never converted.

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

/// Key for text that sits next to child elements.
pub const TEXT_KEY: &str = "_";

const PADDED_IDS: &[&str] = &["ElementName", "InstanceID"];
const VERBATIM: &[&str] = &["EnumerationContext"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed xml: {}", self.message)
    }
}

impl std::error::Error for DecodeError {}

impl From<quick_xml::Error> for DecodeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::new(err.to_string())
    }
}

struct Element {
    name: String,
    fields: Map<String, Value>,
    text: String,
    cdata: bool,
}

impl Element {
    fn open(raw: &[u8]) -> Result<Self, DecodeError> {
        let name = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::new("element name is not utf-8"))?;
        Ok(Self {
            name: name.to_owned(),
            fields: Map::new(),
            text: String::new(),
            cdata: false,
        })
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(name, value);
            }
        }
    }

    fn finish(self) -> (String, Value) {
        let Element {
            name,
            mut fields,
            text,
            cdata,
        } = self;
        if text.trim().is_empty() && !cdata {
            if fields.is_empty() {
                return (name, Value::String(text));
            }
            return (name, Value::Object(fields));
        }
        let value = coerce(&name, text);
        if fields.is_empty() {
            return (name, value);
        }
        fields.insert(TEXT_KEY.to_owned(), value);
        (name, Value::Object(fields))
    }
}

/// Decodes one XML document into a JSON tree.
///
/// ```
/// use wsman_client::decode_xml;
///
/// let xml = "<a:Envelope><a:Body><g:AMT_GeneralSettings>\
///            <g:HostName>amt-01</g:HostName><g:IdleWakeTimeout>65535</g:IdleWakeTimeout>\
///            </g:AMT_GeneralSettings></a:Body></a:Envelope>";
/// let json = decode_xml(xml).unwrap();
/// let settings = &json["Envelope"]["Body"]["AMT_GeneralSettings"];
/// assert_eq!(settings["HostName"], "amt-01");
/// assert_eq!(settings["IdleWakeTimeout"], 65535);
/// ```
pub fn decode_xml(xml: &str) -> Result<Value, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(DecodeError::new("more than one root element"));
                }
                stack.push(Element::open(e.local_name().as_ref())?);
            }
            Event::Empty(e) => {
                let element = Element::open(e.local_name().as_ref())?;
                close(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DecodeError::new("closing tag without an open element"))?;
                close(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(DecodeError::new("text outside the root element")),
                }
            }
            Event::CData(c) => {
                let bytes = c.into_inner();
                let text = String::from_utf8_lossy(&bytes);
                match stack.last_mut() {
                    Some(element) => {
                        element.text.push_str(&text);
                        element.cdata = true;
                    }
                    None => return Err(DecodeError::new("cdata outside the root element")),
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(DecodeError::new(format!("<{}> is never closed", open.name)));
    }
    let (name, value) = root.ok_or_else(|| DecodeError::new("no root element"))?;
    let mut wrapped = Map::new();
    wrapped.insert(name, value);
    Ok(Value::Object(wrapped))
}

fn close(
    stack: &mut [Element],
    root: &mut Option<(String, Value)>,
    element: Element,
) -> Result<(), DecodeError> {
    let (name, value) = element.finish();
    match stack.last_mut() {
        Some(parent) => parent.add_child(name, value),
        None if root.is_some() => return Err(DecodeError::new("more than one root element")),
        None => *root = Some((name, value)),
    }
    Ok(())
}

fn coerce(name: &str, text: String) -> Value {
    if VERBATIM.contains(&name) {
        return Value::String(text);
    }
    if PADDED_IDS.contains(&name) && text.len() > 1 && text.starts_with('0') {
        return Value::String(text);
    }
    if let Some(number) = parse_number(&text) {
        return number;
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(text)
}

fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n.into());
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Some(n.into());
    }
    let numeric = !trimmed.is_empty()
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
    if !numeric {
        return None;
    }
    let value: f64 = trimmed.parse().ok()?;
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Some((value as i64).into());
    }
    Number::from_f64(value).map(Value::Number)
}

/// First value stored under `key` anywhere in `tree`, depth first.
pub(crate) fn find_field<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    match tree {
        Value::Object(fields) => fields
            .get(key)
            .or_else(|| fields.values().find_map(|child| find_field(child, key))),
        Value::Array(items) => items.iter().find_map(|item| find_field(item, key)),
        _ => None,
    }
}

/// Text form of a leaf value.
pub(crate) fn leaf_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PULL_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<a:Envelope xmlns:a="http://www.w3.org/2003/05/soap-envelope" xmlns:g="http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_Processor">
  <a:Header>
    <b:To>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</b:To>
    <b:MessageID>uuid:00000000-8086-8086-8086-000000000123</b:MessageID>
  </a:Header>
  <a:Body>
    <g:PullResponse>
      <g:Items>
        <h:CIM_Processor><h:ElementName>Managed System CPU</h:ElementName><h:CPUStatus>1</h:CPUStatus><h:HealthState>5</h:HealthState></h:CIM_Processor>
        <h:CIM_Processor><h:ElementName>Managed System CPU</h:ElementName><h:CPUStatus>0</h:CPUStatus><h:HealthState>5</h:HealthState></h:CIM_Processor>
      </g:Items>
      <g:EndOfSequence></g:EndOfSequence>
    </g:PullResponse>
  </a:Body>
</a:Envelope>"#;

    #[test]
    fn envelope_is_flattened() {
        let json = decode_xml(PULL_RESPONSE).unwrap();
        let envelope = &json["Envelope"];
        assert_eq!(
            envelope["Header"]["MessageID"],
            "uuid:00000000-8086-8086-8086-000000000123"
        );
        let processors = envelope["Body"]["PullResponse"]["Items"]["CIM_Processor"]
            .as_array()
            .unwrap();
        assert_eq!(processors.len(), 2);
        assert_eq!(processors[0]["CPUStatus"], 1);
        assert_eq!(processors[1]["CPUStatus"], 0);
        assert_eq!(envelope["Body"]["PullResponse"]["EndOfSequence"], "");
    }

    #[test]
    fn padded_identifiers_stay_strings() {
        let xml = "<r><ElementName>0123</ElementName><InstanceID>00</InstanceID>\
                   <Other>0123</Other><InstanceID2>7</InstanceID2></r>";
        let json = decode_xml(xml).unwrap();
        assert_eq!(json["r"]["ElementName"], "0123");
        assert_eq!(json["r"]["InstanceID"], "00");
        assert_eq!(json["r"]["Other"], 123);
        assert_eq!(json["r"]["InstanceID2"], 7);

        let single = decode_xml("<r><InstanceID>0</InstanceID></r>").unwrap();
        assert_eq!(single["r"]["InstanceID"], 0);
    }

    #[test]
    fn values_are_coerced() {
        let xml = "<r><a>TRUE</a><b>false</b><c>-12</c><d>2.5</d><e>1.0</e>\
                   <f>18446744073709551615</f><g>1.2.3</g><h>Intel(r) AMT</h></r>";
        let json = decode_xml(xml).unwrap();
        assert_eq!(
            json,
            json!({ "r": {
                "a": true, "b": false, "c": -12, "d": 2.5, "e": 1,
                "f": 18446744073709551615u64, "g": "1.2.3", "h": "Intel(r) AMT"
            }})
        );
    }

    #[test]
    fn enumeration_context_is_never_coerced() {
        let json = decode_xml("<r><EnumerationContext>0700</EnumerationContext></r>").unwrap();
        assert_eq!(json["r"]["EnumerationContext"], "0700");
    }

    #[test]
    fn mixed_text_and_entities() {
        let xml = "<r>note <b>x</b> &amp; more<c><![CDATA[<raw>]]></c><d/></r>";
        let json = decode_xml(xml).unwrap();
        assert_eq!(json["r"]["b"], "x");
        assert_eq!(json["r"][TEXT_KEY], "note  & more");
        assert_eq!(json["r"]["c"], "<raw>");
        assert_eq!(json["r"]["d"], "");
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(decode_xml("").is_err());
        assert!(decode_xml("<a><b></a>").is_err());
        assert!(decode_xml("<a>").is_err());
        assert!(decode_xml("<a/><b/>").is_err());
        assert!(decode_xml("stray<a/>").is_err());
        assert!(decode_xml("<html><body>401 Unauthorized").is_err());
    }

    #[test]
    fn finds_nested_fields() {
        let json = decode_xml(PULL_RESPONSE).unwrap();
        let found = find_field(&json, "HealthState").unwrap();
        assert_eq!(leaf_text(found).as_deref(), Some("5"));
        assert!(find_field(&json, "Missing").is_none());
    }
}
