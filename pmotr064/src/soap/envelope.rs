//! Parsed SOAP responses and fault extraction.

use std::io::BufReader;

use xmltree::Element;

/// Parse error for SOAP response bodies.
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,
}

/// Fault carried by a SOAP response.
///
/// Code and description come from the UPnP error detail and default to
/// `"unknown"` when the device leaves them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub error_code: String,
    pub error_description: String,
}

/// A parsed response envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub body: Element,
}

impl SoapEnvelope {
    /// The fault of this response, if the body carries one.
    pub fn fault(&self) -> Option<SoapFault> {
        let fault = self
            .body
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .find(|e| e.name == "Fault")?;

        let text_of = |name: &str| {
            find_descendant(fault, name)
                .and_then(|e| e.get_text())
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };

        Some(SoapFault {
            error_code: text_of("errorCode"),
            error_description: text_of("errorDescription"),
        })
    }

    /// Text of the output argument `name`, searched anywhere in the body.
    ///
    /// An empty element yields an empty string; a missing one yields `None`.
    pub fn value(&self, name: &str) -> Option<String> {
        find_descendant(&self.body, name).map(|e| {
            e.get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default()
        })
    }
}

fn find_descendant<'a>(elem: &'a Element, name: &str) -> Option<&'a Element> {
    for child in elem.children.iter().filter_map(|n| n.as_element()) {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, name) {
            return Some(found);
        }
    }
    None
}

/// Parse a complete SOAP envelope.
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let root = Element::parse(BufReader::new(xml))?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let body = root
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .find(|e| e.name.ends_with("Body"))
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope { body: body.clone() })
}
