//! Construction of SOAP request envelopes.

use std::collections::BTreeMap;

use xmltree::{Element, XMLNode};

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), ENCODING_STYLE.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Build the request envelope for `service_type#action`.
///
/// Arguments are emitted sorted by name so the wire output is deterministic.
pub fn build_soap_request(
    service_type: &str,
    action: &str,
    args: &BTreeMap<String, String>,
) -> Result<String, xmltree::Error> {
    let mut request_elem = Element::new(&format!("u:{}", action));
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_type.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.clone()));
        request_elem.children.push(XMLNode::Element(child));
    }

    build_soap_envelope_with_body(request_elem)
}

/// Value of the `SOAPAction` header for an action.
pub fn soap_action_header(service_type: &str, action: &str) -> String {
    format!("{}#{}", service_type, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_sorts_arguments() {
        let mut args = BTreeMap::new();
        args.insert("NewZeta".to_string(), "2".to_string());
        args.insert("NewAlpha".to_string(), "1".to_string());

        let xml = build_soap_request("urn:dslforum-org:service:Hosts:1", "SetFoo", &args).unwrap();

        assert!(xml.contains("xmlns:u=\"urn:dslforum-org:service:Hosts:1\""));
        assert!(xml.contains("<NewAlpha>1</NewAlpha>"));
        assert!(xml.contains("<NewZeta>2</NewZeta>"));
        let alpha = xml.find("NewAlpha").unwrap();
        let zeta = xml.find("NewZeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_build_request_without_arguments() {
        let xml = build_soap_request(
            "urn:dslforum-org:service:DeviceInfo:1",
            "GetInfo",
            &BTreeMap::new(),
        )
        .unwrap();
        assert!(xml.contains("u:GetInfo"));
        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
    }

    #[test]
    fn test_soap_action_header() {
        assert_eq!(
            soap_action_header("urn:X:service:Y:1", "GetFoo"),
            "urn:X:service:Y:1#GetFoo"
        );
    }
}
