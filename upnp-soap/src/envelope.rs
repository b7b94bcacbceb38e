//! SOAP 1.1 envelopes for UPnP control.

use xmltree::Element;

use crate::error::{Result, SoapError};
use crate::escape_xml;

/// SOAP envelope namespace.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP encoding style required by UDA.
pub const SOAP_ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Namespace of the `UPnPError` fault detail.
pub const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// The content of an action request or response element.
///
/// Arguments keep document order; name matching against the declared
/// arguments of an action is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBody {
    /// Unprefixed element name, e.g. `SetTarget` or `SetTargetResponse`
    pub name: String,
    /// Namespace URI of the element, the service type for well-formed messages
    pub namespace: Option<String>,
    /// `(name, text)` pairs of the child elements
    pub arguments: Vec<(String, String)>,
}

impl ActionBody {
    /// Text of the first argument called `name`.
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Value of the `SOAPACTION` header: `"<service type>#<action>"`, quotes included.
pub fn soap_action_header(service_type: &str, action: &str) -> String {
    format!("\"{}#{}\"", service_type, action)
}

/// Split a `SOAPACTION` header into service type and action name.
pub fn parse_soap_action_header(value: &str) -> Option<(String, String)> {
    let value = value.trim().trim_matches('"');
    let (service_type, action) = value.rsplit_once('#')?;
    if service_type.is_empty() || action.is_empty() {
        return None;
    }
    Some((service_type.to_string(), action.to_string()))
}

/// Build an action request envelope.
pub fn write_request(service_type: &str, action: &str, arguments: &[(String, String)]) -> String {
    envelope(&action_element(action, service_type, arguments))
}

/// Build a successful action response envelope.
pub fn write_response(service_type: &str, action: &str, arguments: &[(String, String)]) -> String {
    envelope(&action_element(
        &format!("{}Response", action),
        service_type,
        arguments,
    ))
}

/// Build a fault envelope carrying a `UPnPError` detail.
pub fn write_fault(error_code: u16, description: &str) -> String {
    envelope(&format!(
        "<s:Fault>\
         <faultcode>s:Client</faultcode>\
         <faultstring>UPnPError</faultstring>\
         <detail>\
         <UPnPError xmlns=\"{ns}\">\
         <errorCode>{code}</errorCode>\
         <errorDescription>{description}</errorDescription>\
         </UPnPError>\
         </detail>\
         </s:Fault>",
        ns = UPNP_CONTROL_NS,
        code = error_code,
        description = escape_xml(description),
    ))
}

/// Read the action element of a request envelope.
pub fn read_request(xml: &[u8]) -> Result<ActionBody> {
    let body = read_body(xml)?;
    let action = first_element(&body)
        .ok_or_else(|| SoapError::Parse("SOAP Body has no action element".to_string()))?;

    if action.name == "Fault" {
        return Err(SoapError::Unexpected(
            "Fault element in an action request".to_string(),
        ));
    }

    Ok(action_body(action))
}

/// Read the `<action>Response` element of a response envelope.
///
/// A fault is returned as [`SoapError::Fault`].
pub fn read_response(xml: &[u8], action: &str) -> Result<ActionBody> {
    let body = read_body(xml)?;

    if let Some(fault) = body.get_child("Fault") {
        return Err(read_fault(fault));
    }

    let response_name = format!("{}Response", action);
    body.get_child(response_name.as_str())
        .map(action_body)
        .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
}

fn envelope(content: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"{ns}\" s:encodingStyle=\"{style}\">\
         <s:Body>{content}</s:Body>\
         </s:Envelope>",
        ns = SOAP_ENVELOPE_NS,
        style = SOAP_ENCODING_STYLE,
        content = content,
    )
}

fn action_element(name: &str, service_type: &str, arguments: &[(String, String)]) -> String {
    let mut out = format!("<u:{} xmlns:u=\"{}\">", name, escape_xml(service_type));
    for (arg, value) in arguments {
        out.push_str(&format!("<{arg}>{}</{arg}>", escape_xml(value), arg = arg));
    }
    out.push_str(&format!("</u:{}>", name));
    out
}

fn read_body(xml: &[u8]) -> Result<Element> {
    let root = Element::parse(xml).map_err(|e| SoapError::Parse(e.to_string()))?;
    if root.name != "Envelope" {
        return Err(SoapError::Parse(format!(
            "Root element was not 'Envelope' but '{}'",
            root.name
        )));
    }
    root.get_child("Body")
        .cloned()
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))
}

fn first_element(element: &Element) -> Option<&Element> {
    element.children.iter().find_map(|n| n.as_element())
}

fn action_body(element: &Element) -> ActionBody {
    let arguments = element
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .map(|e| {
            (
                e.name.clone(),
                e.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )
        })
        .collect();

    ActionBody {
        name: element.name.clone(),
        namespace: element.namespace.clone(),
        arguments,
    }
}

fn read_fault(fault: &Element) -> SoapError {
    let error = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError"));

    let code = error
        .and_then(|e| e.get_child("errorCode"))
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string());
    let description = error
        .and_then(|e| e.get_child("errorDescription"))
        .and_then(|d| d.get_text())
        .map(|t| t.into_owned())
        .unwrap_or_default();

    match code {
        Some(code) => match code.parse::<u16>() {
            Ok(code) => SoapError::Fault { code, description },
            Err(_) => SoapError::Parse(format!("Error code was not a number: {}", code)),
        },
        None => SoapError::Parse("Received fault element but no error code".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWITCH_POWER: &str = "urn:schemas-upnp-org:service:SwitchPower:1";

    #[test]
    fn test_request_roundtrip() {
        let xml = write_request(
            SWITCH_POWER,
            "SetTarget",
            &[("NewTargetValue".to_string(), "1".to_string())],
        );

        assert!(xml.contains("s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\""));

        let body = read_request(xml.as_bytes()).unwrap();
        assert_eq!(body.name, "SetTarget");
        assert_eq!(body.namespace.as_deref(), Some(SWITCH_POWER));
        assert_eq!(body.argument("NewTargetValue"), Some("1"));
    }

    #[test]
    fn test_response_with_escaped_value() {
        let xml = write_response(
            SWITCH_POWER,
            "GetStatus",
            &[("ResultStatus".to_string(), "<0 & 1>".to_string())],
        );

        let body = read_response(xml.as_bytes(), "GetStatus").unwrap();
        assert_eq!(body.name, "GetStatusResponse");
        assert_eq!(body.argument("ResultStatus"), Some("<0 & 1>"));
    }

    #[test]
    fn test_empty_argument_reads_as_empty_string() {
        let xml = r#"<?xml version="1.0"?>
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
                        <ObjectID>0</ObjectID>
                        <Filter/>
                    </u:Browse>
                </s:Body>
            </s:Envelope>"#;

        let body = read_request(xml.as_bytes()).unwrap();
        assert_eq!(body.arguments.len(), 2);
        assert_eq!(body.argument("Filter"), Some(""));
    }

    #[test]
    fn test_fault_roundtrip() {
        let xml = write_fault(600, "Argument Value Invalid");
        assert!(xml.contains("<faultcode>s:Client</faultcode>"));
        assert!(xml.contains("<faultstring>UPnPError</faultstring>"));

        match read_response(xml.as_bytes(), "SetTarget").unwrap_err() {
            SoapError::Fault { code, description } => {
                assert_eq!(code, 600);
                assert_eq!(description, "Argument Value Invalid");
            }
            other => panic!("Expected SoapError::Fault, got {:?}", other),
        }
    }

    #[test]
    fn test_fault_without_code() {
        let xml = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                        <faultstring>Internal Error</faultstring>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        assert!(matches!(
            read_response(xml.as_bytes(), "Play"),
            Err(SoapError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_body_and_wrong_root() {
        let no_body = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"></s:Envelope>"#;
        match read_request(no_body.as_bytes()).unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SOAP Body")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }

        assert!(read_request(b"<html><body/></html>").is_err());
        assert!(read_request(b"not xml at all").is_err());
    }

    #[test]
    fn test_missing_action_response() {
        let xml = write_response(SWITCH_POWER, "GetTarget", &[]);
        match read_response(xml.as_bytes(), "GetStatus").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing GetStatusResponse element")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_soap_action_header() {
        let header = soap_action_header(SWITCH_POWER, "GetStatus");
        assert_eq!(header, "\"urn:schemas-upnp-org:service:SwitchPower:1#GetStatus\"");
        assert_eq!(
            parse_soap_action_header(&header),
            Some((SWITCH_POWER.to_string(), "GetStatus".to_string()))
        );
        assert_eq!(parse_soap_action_header("\"nohash\""), None);
        assert_eq!(parse_soap_action_header("\"urn#\""), None);
    }
}
