//! SOAP action invocation.
//!
//! [`execute`] invokes an action on a remote service. [`receive_action`]
//! answers control requests for local services through the service's
//! [`ActionExecutor`](crate::local::ActionExecutor).
//!
//! Message arguments are matched against the declared arguments by name or
//! alias, in any order. Every declared argument must be present. Undeclared
//! inputs are rejected; undeclared outputs are ignored.

use std::sync::Arc;

use futures::FutureExt;
use stream_transport::{Method, StatusCode, StreamRequest, StreamResponse};
use tracing::{debug, trace, warn};
use upnp_soap::SoapError;

use crate::error::{ActionError, ErrorCode};
use crate::logging::VIOLATION_TARGET;
use crate::model::{Action, ActionInvocation, Direction, Service, Value};
use crate::namespace::Resource;
use crate::protocol::StreamOutcome;
use crate::router::Router;

const SOAPACTION: &str = "SOAPACTION";
const CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Type `message` arguments against the declared `direction` arguments of
/// `action`. Results are in declared order, under their declared names.
fn match_arguments(
    service: &Service,
    action: &Action,
    direction: Direction,
    message: &[(String, String)],
) -> Result<Vec<(String, Value)>, ActionError> {
    let declared: Vec<_> = action
        .arguments()
        .iter()
        .filter(|a| a.direction == direction)
        .collect();

    for (extra, _) in message
        .iter()
        .filter(|(name, _)| !declared.iter().any(|a| a.is_named(name)))
    {
        match direction {
            Direction::In => {
                return Err(ActionError::new(
                    ErrorCode::ArgumentValueInvalid,
                    format!("Action {} has no argument {}", action.name(), extra),
                ))
            }
            Direction::Out => warn!(
                target: VIOLATION_TARGET,
                action = action.name(),
                argument = %extra,
                "Ignoring undeclared output argument"
            ),
        }
    }

    declared
        .into_iter()
        .map(|argument| {
            let raw = message
                .iter()
                .find(|(name, _)| argument.is_named(name))
                .map(|(_, raw)| raw.as_str())
                .ok_or_else(|| {
                    ActionError::new(
                        ErrorCode::ArgumentValueInvalid,
                        format!("Missing argument {} of {}", argument.name, action.name()),
                    )
                })?;
            let value = match service.state_variable(&argument.related_state_variable) {
                Some(variable) => variable
                    .parse_value(raw)
                    .map_err(|(code, message)| ActionError::new(code, message))?,
                None => Value::Text(raw.to_string()),
            };
            Ok((argument.name.clone(), value))
        })
        .collect()
}

/// Invoke an action on a remote service and return the invocation with its
/// outputs set.
pub async fn execute(
    router: &Router,
    mut invocation: ActionInvocation,
) -> Result<ActionInvocation, ActionError> {
    let service = invocation.service().clone();
    let action_name = invocation.action().name().to_string();
    let control_url = service
        .endpoints
        .as_ref()
        .map(|endpoints| endpoints.control_url.clone())
        .ok_or_else(|| {
            ActionError::new(
                ErrorCode::ActionFailed,
                format!("Service {} has no control URL", service.service_id),
            )
        })?;

    let service_type = service.service_type.to_string();
    let body = upnp_soap::write_request(
        &service_type,
        &action_name,
        &invocation.wire_values(Direction::In),
    );
    let request = StreamRequest::new(Method::Post, control_url.as_str())
        .with_header(
            SOAPACTION,
            &upnp_soap::soap_action_header(&service_type, &action_name),
        )
        .with_body(CONTENT_TYPE, body);

    trace!(action = %action_name, url = %control_url, "Sending action");
    let response = router.send_stream(request).await.map_err(|e| {
        ActionError::new(
            ErrorCode::ActionFailed,
            format!("Sending {} failed: {}", action_name, e),
        )
    })?;

    let body = match upnp_soap::read_response(&response.body, &action_name) {
        Ok(body) if response.status == StatusCode::OK => body,
        Ok(_) => {
            return Err(ActionError::new(
                ErrorCode::ActionFailed,
                format!("{} answered {} without a fault", action_name, response.status),
            ))
        }
        Err(SoapError::Fault { code, description }) => {
            debug!(action = %action_name, code, %description, "Action fault");
            return Err(ActionError::new(ErrorCode::from_code(code), description));
        }
        Err(_) if !response.is_success() => {
            return Err(ActionError::new(
                ErrorCode::ActionFailed,
                format!("{} answered {}", action_name, response.status),
            ))
        }
        Err(e) => return Err(ActionError::unsupported_data(e.to_string())),
    };

    let outputs = match_arguments(
        &service,
        invocation.action(),
        Direction::Out,
        &body.arguments,
    )
    .map_err(|e| ActionError::unsupported_data(e.message))?;
    invocation.set_matched(Direction::Out, outputs);
    Ok(invocation)
}

fn fault(error: &ActionError) -> StreamResponse {
    StreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        .with_body(CONTENT_TYPE, upnp_soap::write_fault(error.code.code(), &error.message))
}

/// Answer a control request for a local service.
///
/// State changes made by the executor are turned into events once the
/// response is out.
pub(crate) async fn receive_action(router: Arc<Router>, request: StreamRequest) -> StreamOutcome {
    let reference = match router.namespace().resolve(request.path()) {
        Some(Resource::Control(reference)) => reference,
        _ => return StreamOutcome::respond(StreamResponse::new(StatusCode::NOT_FOUND)),
    };
    let Some((service, binding)) = router.registry().local_service(&reference) else {
        return StreamOutcome::respond(StreamResponse::new(StatusCode::NOT_FOUND));
    };

    let body = match upnp_soap::read_request(&request.body) {
        Ok(body) => body,
        Err(e) => {
            debug!(service = %reference, error = %e, "Unreadable action request");
            return StreamOutcome::respond(fault(&ActionError::unsupported_data(e.to_string())));
        }
    };
    if let Some((_, header_action)) = request
        .header(SOAPACTION)
        .and_then(upnp_soap::parse_soap_action_header)
    {
        if header_action != body.name {
            warn!(
                target: VIOLATION_TARGET,
                header = %header_action,
                body = %body.name,
                "SOAPACTION does not name the action in the body"
            );
        }
    }

    let result = invoke(&service, &binding, &body.name, &body.arguments).await;

    let response = match result {
        Ok(invocation) => {
            let xml = upnp_soap::write_response(
                &service.service_type.to_string(),
                &body.name,
                &invocation.wire_values(Direction::Out),
            );
            StreamResponse::ok()
                .with_header("EXT", "")
                .with_header("SERVER", &router.config().server_name)
                .with_body(CONTENT_TYPE, xml)
        }
        Err(e) => {
            debug!(service = %reference, action = %body.name, error = %e, "Action failed");
            fault(&e)
        }
    };

    if !binding.state.has_changes() {
        return StreamOutcome::respond(response);
    }
    let follow_up = async move {
        let changes = binding.state.take_changes();
        router.propagate_state_changes(&reference, changes);
    };
    StreamOutcome::then(response, follow_up.boxed())
}

async fn invoke(
    service: &Arc<Service>,
    binding: &crate::local::LocalServiceBinding,
    action_name: &str,
    arguments: &[(String, String)],
) -> Result<ActionInvocation, ActionError> {
    let mut invocation = ActionInvocation::new(service.clone(), action_name)?;
    let inputs = match_arguments(service, invocation.action(), Direction::In, arguments)?;
    invocation.set_matched(Direction::In, inputs);

    let executor = binding.executor.as_ref().ok_or_else(|| {
        ActionError::new(
            ErrorCode::ActionFailed,
            format!("No executor bound for {}", service.service_id),
        )
    })?;
    executor.execute(&mut invocation, &binding.state).await?;
    Ok(invocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionArgument, Datatype, ServiceId, ServiceType, StateVariable};

    fn switch_power() -> Service {
        Service::new(ServiceType::uda("SwitchPower", 1), ServiceId::uda("SwitchPower"))
            .with_state_variable(StateVariable::new("Target", Datatype::Boolean))
            .with_state_variable(StateVariable::new("Status", Datatype::Boolean).evented())
            .with_action(Action::new(
                "SetTarget",
                vec![ActionArgument::input("NewTargetValue", "Target").with_alias("newTargetValue")],
            ))
            .with_action(Action::new(
                "GetStatus",
                vec![ActionArgument::output("ResultStatus", "Status").as_return_value()],
            ))
    }

    fn args(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_match_by_alias() {
        let service = switch_power();
        let action = service.action("SetTarget").unwrap();
        let matched = match_arguments(
            &service,
            action,
            Direction::In,
            &args(&[("newTargetValue", "1")]),
        )
        .unwrap();
        assert_eq!(
            matched,
            vec![("NewTargetValue".to_string(), Value::Boolean(true))]
        );
    }

    #[test]
    fn test_missing_argument_is_invalid_value() {
        let service = switch_power();
        let action = service.action("SetTarget").unwrap();
        let err = match_arguments(&service, action, Direction::In, &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentValueInvalid);
    }

    #[test]
    fn test_extra_input_is_invalid_value() {
        let service = switch_power();
        let action = service.action("SetTarget").unwrap();
        let err = match_arguments(
            &service,
            action,
            Direction::In,
            &args(&[("NewTargetValue", "1"), ("Bogus", "x")]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentValueInvalid);
    }

    #[test]
    fn test_extra_output_is_ignored() {
        let service = switch_power();
        let action = service.action("GetStatus").unwrap();
        let matched = match_arguments(
            &service,
            action,
            Direction::Out,
            &args(&[("ResultStatus", "1"), ("VendorExtra", "x")]),
        )
        .unwrap();
        assert_eq!(
            matched,
            vec![("ResultStatus".to_string(), Value::Boolean(true))]
        );
    }

    #[test]
    fn test_boolean_output_typed() {
        let service = switch_power();
        let action = service.action("GetStatus").unwrap();
        let matched = match_arguments(
            &service,
            action,
            Direction::Out,
            &args(&[("ResultStatus", "0")]),
        )
        .unwrap();
        assert_eq!(matched[0].1, Value::Boolean(false));
    }

    #[test]
    fn test_bad_value_carries_code() {
        let service = switch_power();
        let action = service.action("SetTarget").unwrap();
        let err = match_arguments(
            &service,
            action,
            Direction::In,
            &args(&[("NewTargetValue", "maybe")]),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentValueInvalid);
    }
}
