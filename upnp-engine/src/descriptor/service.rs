//! Service descriptor (SCPD) parsing.
//!
//! Walked as a tree rather than deserialized so that presence-only elements
//! such as `<retval/>` are seen reliably.

use tracing::warn;
use xmltree::Element;

use crate::error::DescriptorError;
use crate::logging::VIOLATION_TARGET;
use crate::model::{Action, ActionArgument, Datatype, Direction, Service, StateVariable};

pub(super) fn parse_service(xml: &str, service: &Service) -> Result<Service, DescriptorError> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| DescriptorError::Parse(format!("Failed to parse service XML: {}", e)))?;
    if root.name != "scpd" {
        return Err(DescriptorError::Parse(format!(
            "Root element was not 'scpd' but '{}'",
            root.name
        )));
    }

    let mut hydrated = service.clone();
    hydrated.state_variables = children(&root, "serviceStateTable", "stateVariable")
        .map(parse_state_variable)
        .collect::<Result<_, _>>()?;
    hydrated.actions = children(&root, "actionList", "action")
        .map(parse_action)
        .collect::<Result<_, _>>()?;

    Ok(hydrated)
}

fn parse_action(element: &Element) -> Result<Action, DescriptorError> {
    let name = required_text(element, "name", "action")?;

    let arguments = children(element, "argumentList", "argument")
        .map(|argument| {
            let arg_name = required_text(argument, "name", "argument")?;
            let related = required_text(argument, "relatedStateVariable", "argument")?;
            let direction = match text(argument, "direction").as_deref() {
                Some(d) if d.eq_ignore_ascii_case("in") => Direction::In,
                Some(d) if d.eq_ignore_ascii_case("out") => Direction::Out,
                other => {
                    return Err(DescriptorError::Invalid(format!(
                        "Argument {} of {} has invalid direction {:?}",
                        arg_name, name, other
                    )))
                }
            };
            Ok(ActionArgument {
                name: arg_name,
                aliases: Vec::new(),
                related_state_variable: related,
                direction,
                return_value: argument.get_child("retval").is_some(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Action::new(name, arguments))
}

fn parse_state_variable(element: &Element) -> Result<StateVariable, DescriptorError> {
    let name = required_text(element, "name", "stateVariable")?;
    let datatype = Datatype::from_name(&required_text(element, "dataType", "stateVariable")?);

    // UDA 1.0 defaults to evented
    let send_events = match element.attributes.get("sendEvents").map(|v| v.trim()) {
        Some(v) if v.eq_ignore_ascii_case("no") => false,
        Some(v) if v.eq_ignore_ascii_case("yes") => true,
        Some(v) => {
            warn!(
                target: VIOLATION_TARGET,
                variable = %name, "Invalid sendEvents value '{}', assuming yes", v
            );
            true
        }
        None => true,
    };

    let mut variable = StateVariable::new(name, datatype);
    variable.send_events = send_events;
    variable.default_value = text(element, "defaultValue");
    variable.allowed_values = children(element, "allowedValueList", "allowedValue")
        .filter_map(|v| v.get_text().map(|t| t.trim().to_string()))
        .collect();

    if let Some(range) = element.get_child("allowedValueRange") {
        let minimum = number(range, "minimum");
        let maximum = number(range, "maximum");
        match (minimum, maximum) {
            (Some(minimum), Some(maximum)) => {
                variable = variable.with_allowed_range(minimum, maximum, number(range, "step"))
            }
            _ => warn!(
                target: VIOLATION_TARGET,
                variable = %variable.name, "Ignoring allowedValueRange without minimum and maximum"
            ),
        }
    }

    Ok(variable)
}

/// Elements `<child>` below `<list>` below `parent`.
fn children<'a>(parent: &'a Element, list: &str, child: &'a str) -> impl Iterator<Item = &'a Element> {
    parent
        .get_child(list)
        .into_iter()
        .flat_map(|l| l.children.iter())
        .filter_map(|n| n.as_element())
        .filter(move |e| e.name == child)
}

fn text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn required_text(element: &Element, name: &str, context: &str) -> Result<String, DescriptorError> {
    text(element, name)
        .ok_or_else(|| DescriptorError::Invalid(format!("{} without {}", context, name)))
}

fn number(element: &Element, name: &str) -> Option<f64> {
    text(element, name).and_then(|t| t.parse().ok())
}
