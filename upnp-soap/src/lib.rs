//! SOAP control and GENA event body codec for UPnP
//!
//! This crate reads and writes the XML bodies exchanged by UPnP control points
//! and devices: SOAP 1.1 action requests, responses and `UPnPError` faults, and
//! GENA `e:propertyset` event notifications. It deals in names and strings only;
//! typing values against an action's declared arguments is left to the caller.
//!
//! ```
//! use upnp_soap::{read_request, write_request};
//!
//! let xml = write_request(
//!     "urn:schemas-upnp-org:service:SwitchPower:1",
//!     "SetTarget",
//!     &[("NewTargetValue".to_string(), "1".to_string())],
//! );
//! let body = read_request(xml.as_bytes()).unwrap();
//! assert_eq!(body.argument("NewTargetValue"), Some("1"));
//! ```

mod envelope;
mod error;
mod propertyset;

pub use envelope::{
    parse_soap_action_header, read_request, read_response, soap_action_header, write_fault,
    write_request, write_response, ActionBody, SOAP_ENCODING_STYLE, SOAP_ENVELOPE_NS,
    UPNP_CONTROL_NS,
};
pub use error::{Result, SoapError};
pub use propertyset::{read_property_set, write_property_set, EVENT_NS};

/// Escape text for use in XML content or attribute values.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
