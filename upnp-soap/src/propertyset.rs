//! GENA event bodies (`e:propertyset`).

use xmltree::Element;

use crate::error::{Result, SoapError};
use crate::escape_xml;

/// Namespace of GENA property sets.
pub const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Build a property set carrying one `e:property` per `(name, value)` pair.
pub fn write_property_set(properties: &[(String, String)]) -> String {
    let mut out = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><e:propertyset xmlns:e=\"{}\">",
        EVENT_NS
    );
    for (name, value) in properties {
        out.push_str(&format!(
            "<e:property><{name}>{}</{name}></e:property>",
            escape_xml(value),
            name = name
        ));
    }
    out.push_str("</e:propertyset>");
    out
}

/// Read the `(name, value)` pairs of a property set, in document order.
///
/// Several variables in one `e:property` are accepted.
pub fn read_property_set(xml: &[u8]) -> Result<Vec<(String, String)>> {
    let root = Element::parse(xml).map_err(|e| SoapError::Parse(e.to_string()))?;
    if root.name != "propertyset" {
        return Err(SoapError::Parse(format!(
            "Root element was not 'propertyset' but '{}'",
            root.name
        )));
    }

    let properties = root
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(|e| e.name == "property")
        .flat_map(|property| property.children.iter().filter_map(|n| n.as_element()))
        .map(|variable| {
            (
                variable.name.clone(),
                variable.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )
        })
        .collect();

    Ok(properties)
}
