// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boundary to the SOAP envelope builder.

use wsman_core::{ApiCall, WsmanMethod};

use crate::decode::{decode_xml, find_field, leaf_text};

/// Produces the SOAP envelope for one WSMAN call.
///
/// `extra` carries call-specific input: the enumeration context for `Pull`,
/// or a caller-supplied payload for `Put`/`Create`.
pub trait BodyBuilder: Send + Sync {
    fn build_body(
        &self,
        call: &ApiCall,
        method: WsmanMethod,
        extra: Option<&str>,
    ) -> Result<String, BuildError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    message: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BuildError {}

impl<F> BodyBuilder for F
where
    F: Fn(&ApiCall, WsmanMethod, Option<&str>) -> Result<String, BuildError> + Send + Sync,
{
    fn build_body(
        &self,
        call: &ApiCall,
        method: WsmanMethod,
        extra: Option<&str>,
    ) -> Result<String, BuildError> {
        self(call, method, extra)
    }
}

/// Text of the first `EnumerationContext` element, whatever its namespace
/// prefix. `None` when the document does not parse or the context is empty.
///
/// ```
/// use wsman_client::extract_enumeration_context;
///
/// let xml = "<a:Body><g:EnumerateResponse><g:EnumerationContext>\
///            14000000-0000-0000-0000-000000000000</g:EnumerationContext>\
///            </g:EnumerateResponse></a:Body>";
/// assert_eq!(
///     extract_enumeration_context(xml).as_deref(),
///     Some("14000000-0000-0000-0000-000000000000")
/// );
/// ```
pub fn extract_enumeration_context(xml: &str) -> Option<String> {
    let tree = decode_xml(xml).ok()?;
    let value = leaf_text(find_field(&tree, "EnumerationContext")?)?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_longer_names_and_comments() {
        let xml = "<a:Body><!-- <EnumerationContext>old</EnumerationContext> -->\
                   <x:EnumerationContextual>no</x:EnumerationContextual>\
                   <g:EnumerateResponse><g:EnumerationContext>yes</g:EnumerationContext>\
                   </g:EnumerateResponse></a:Body>";
        assert_eq!(extract_enumeration_context(xml).as_deref(), Some("yes"));
    }

    #[test]
    fn tag_with_attributes() {
        let xml = "<g:EnumerationContext xmlns:g=\"urn:x\">ctx-1</g:EnumerationContext>";
        assert_eq!(extract_enumeration_context(xml).as_deref(), Some("ctx-1"));
    }

    #[test]
    fn numeric_context_keeps_its_digits() {
        let xml = "<r><EnumerationContext>00012</EnumerationContext></r>";
        assert_eq!(extract_enumeration_context(xml).as_deref(), Some("00012"));
    }

    #[test]
    fn missing_or_empty_context() {
        assert!(extract_enumeration_context("<a:Body/>").is_none());
        assert!(extract_enumeration_context("<g:EnumerationContext></g:EnumerationContext>").is_none());
        assert!(extract_enumeration_context("<g:EnumerationContext>ctx").is_none());
    }

    #[test]
    fn closures_are_builders() {
        let builder = |call: &ApiCall, method: WsmanMethod, _: Option<&str>| {
            Ok::<_, BuildError>(format!("<{}:{}/>", call, method))
        };
        let call = ApiCall::parse("AMT_GeneralSettings").unwrap();
        assert_eq!(
            builder.build_body(&call, WsmanMethod::Get, None).unwrap(),
            "<AMT_GeneralSettings:Get/>"
        );
    }
}
