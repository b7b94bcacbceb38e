//! Descriptor generation for local devices.

use xmltree::{Element, EmitterConfig, Namespace as XmlNamespace, XMLNode};

use super::{DEVICE_DESCRIPTOR_NS, SERVICE_DESCRIPTOR_NS};
use crate::error::DescriptorError;
use crate::model::{Device, Direction, Service, StateVariable};
use crate::namespace::Namespace;

pub(super) fn generate_device(device: &Device, namespace: &Namespace) -> Result<String, DescriptorError> {
    let mut root = document_root("root", DEVICE_DESCRIPTOR_NS);
    push(&mut root, spec_version());
    push(&mut root, device_element(device, namespace));
    write(&root)
}

pub(super) fn generate_service(service: &Service) -> Result<String, DescriptorError> {
    let mut root = document_root("scpd", SERVICE_DESCRIPTOR_NS);
    push(&mut root, spec_version());

    if !service.actions.is_empty() {
        let mut actions = Element::new("actionList");
        for action in &service.actions {
            let mut element = Element::new("action");
            push(&mut element, text_element("name", action.name()));

            if !action.arguments().is_empty() {
                let mut arguments = Element::new("argumentList");
                for argument in action.arguments() {
                    let mut arg = Element::new("argument");
                    push(&mut arg, text_element("name", &argument.name));
                    let direction = match argument.direction {
                        Direction::In => "in",
                        Direction::Out => "out",
                    };
                    push(&mut arg, text_element("direction", direction));
                    if argument.return_value {
                        push(&mut arg, Element::new("retval"));
                    }
                    push(
                        &mut arg,
                        text_element("relatedStateVariable", &argument.related_state_variable),
                    );
                    push(&mut arguments, arg);
                }
                push(&mut element, arguments);
            }
            push(&mut actions, element);
        }
        push(&mut root, actions);
    }

    let mut table = Element::new("serviceStateTable");
    for variable in &service.state_variables {
        push(&mut table, state_variable_element(variable));
    }
    push(&mut root, table);

    write(&root)
}

fn device_element(device: &Device, namespace: &Namespace) -> Element {
    let details = &device.details;
    let mut element = Element::new("device");

    push(&mut element, text_element("deviceType", &device.device_type.to_string()));
    push(&mut element, text_element("friendlyName", &details.friendly_name));
    push(&mut element, text_element("manufacturer", &details.manufacturer));
    optional(&mut element, "manufacturerURL", &details.manufacturer_url);
    optional(&mut element, "modelDescription", &details.model_description);
    push(&mut element, text_element("modelName", &details.model_name));
    optional(&mut element, "modelNumber", &details.model_number);
    optional(&mut element, "modelURL", &details.model_url);
    optional(&mut element, "serialNumber", &details.serial_number);
    push(&mut element, text_element("UDN", &device.udn.to_string()));
    optional(&mut element, "UPC", &details.upc);

    if !device.icons.is_empty() {
        let mut icons = Element::new("iconList");
        for (index, icon) in device.icons.iter().enumerate() {
            let url = if device.is_local() {
                namespace.icon_path(&device.udn, index)
            } else {
                icon.url.clone()
            };
            let mut entry = Element::new("icon");
            push(&mut entry, text_element("mimetype", &icon.mime_type));
            push(&mut entry, text_element("width", &icon.width.to_string()));
            push(&mut entry, text_element("height", &icon.height.to_string()));
            push(&mut entry, text_element("depth", &icon.depth.to_string()));
            push(&mut entry, text_element("url", &url));
            push(&mut icons, entry);
        }
        push(&mut element, icons);
    }

    if !device.services.is_empty() {
        let mut services = Element::new("serviceList");
        for service in &device.services {
            let reference = service.reference();
            let (scpd, control, event) = match &service.endpoints {
                Some(endpoints) => (
                    endpoints.descriptor_url.to_string(),
                    endpoints.control_url.to_string(),
                    endpoints.event_subscription_url.to_string(),
                ),
                None => (
                    namespace.service_descriptor_path(&reference),
                    namespace.control_path(&reference),
                    namespace.event_subscription_path(&reference),
                ),
            };
            let mut entry = Element::new("service");
            push(&mut entry, text_element("serviceType", &service.service_type.to_string()));
            push(&mut entry, text_element("serviceId", &service.service_id.to_string()));
            push(&mut entry, text_element("SCPDURL", &scpd));
            push(&mut entry, text_element("controlURL", &control));
            push(&mut entry, text_element("eventSubURL", &event));
            push(&mut services, entry);
        }
        push(&mut element, services);
    }

    if !device.embedded.is_empty() {
        let mut devices = Element::new("deviceList");
        for embedded in &device.embedded {
            push(&mut devices, device_element(embedded, namespace));
        }
        push(&mut element, devices);
    }

    optional(&mut element, "presentationURL", &details.presentation_url);
    element
}

fn state_variable_element(variable: &StateVariable) -> Element {
    let mut element = Element::new("stateVariable");
    element.attributes.insert(
        "sendEvents".to_string(),
        if variable.send_events { "yes" } else { "no" }.to_string(),
    );
    push(&mut element, text_element("name", &variable.name));
    push(&mut element, text_element("dataType", variable.datatype.name()));
    optional(&mut element, "defaultValue", &variable.default_value);

    if !variable.allowed_values.is_empty() {
        let mut list = Element::new("allowedValueList");
        for value in &variable.allowed_values {
            push(&mut list, text_element("allowedValue", value));
        }
        push(&mut element, list);
    }

    if let Some(range) = &variable.allowed_range {
        let mut entry = Element::new("allowedValueRange");
        push(&mut entry, text_element("minimum", &range.minimum.to_string()));
        push(&mut entry, text_element("maximum", &range.maximum.to_string()));
        if let Some(step) = range.step {
            push(&mut entry, text_element("step", &step.to_string()));
        }
        push(&mut element, entry);
    }

    element
}

fn document_root(name: &str, descriptor_ns: &str) -> Element {
    let mut root = Element::new(name);
    let mut namespaces = XmlNamespace::empty();
    namespaces.put("", descriptor_ns);
    root.namespace = Some(descriptor_ns.to_string());
    root.namespaces = Some(namespaces);
    root
}

fn spec_version() -> Element {
    let mut version = Element::new("specVersion");
    push(&mut version, text_element("major", "1"));
    push(&mut version, text_element("minor", "0"));
    version
}

fn text_element(name: &str, text: &str) -> Element {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    element
}

fn optional(parent: &mut Element, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        push(parent, text_element(name, value));
    }
}

fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

fn write(root: &Element) -> Result<String, DescriptorError> {
    let mut out = Vec::new();
    root.write_with_config(&mut out, EmitterConfig::new().perform_indent(true))
        .map_err(|e| DescriptorError::Generate(e.to_string()))?;
    String::from_utf8(out).map_err(|e| DescriptorError::Generate(e.to_string()))
}
