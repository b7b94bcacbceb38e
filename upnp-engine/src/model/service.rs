use std::fmt;

use url::Url;

use crate::error::ValidationError;
use crate::model::{Action, ServiceId, ServiceType, StateVariable, Udn};

/// Identifies a service across the registry: device UDN plus service id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceReference {
    pub udn: Udn,
    pub service_id: ServiceId,
}

impl ServiceReference {
    pub fn new(udn: Udn, service_id: ServiceId) -> Self {
        Self { udn, service_id }
    }
}

impl fmt::Display for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.udn, self.service_id)
    }
}

/// Absolute URLs of a remote service, resolved against its device descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub descriptor_url: Url,
    pub control_url: Url,
    pub event_subscription_url: Url,
}

/// A service: its actions and state variables.
///
/// Local services get their URLs from the
/// [`Namespace`](crate::namespace::Namespace); remote services carry
/// [`ServiceEndpoints`].
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// UDN of the device owning this service, set when the device is built
    pub udn: Udn,
    pub service_type: ServiceType,
    pub service_id: ServiceId,
    pub endpoints: Option<ServiceEndpoints>,
    pub actions: Vec<Action>,
    pub state_variables: Vec<StateVariable>,
}

impl Service {
    pub fn new(service_type: ServiceType, service_id: ServiceId) -> Self {
        Self {
            udn: Udn::new(String::new()),
            service_type,
            service_id,
            endpoints: None,
            actions: Vec::new(),
            state_variables: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_state_variable(mut self, variable: StateVariable) -> Self {
        self.state_variables.push(variable);
        self
    }

    pub fn with_endpoints(mut self, endpoints: ServiceEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn reference(&self) -> ServiceReference {
        ServiceReference::new(self.udn.clone(), self.service_id.clone())
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name() == name)
    }

    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|v| v.name == name)
    }

    pub fn evented_state_variables(&self) -> impl Iterator<Item = &StateVariable> {
        self.state_variables.iter().filter(|v| v.send_events)
    }

    pub fn supports_eventing(&self) -> bool {
        self.evented_state_variables().next().is_some()
    }

    pub(crate) fn validate(&self, errors: &mut Vec<ValidationError>) {
        let element = format!("Service({})", self.service_id);

        let mut action_names: Vec<&str> = self.actions.iter().map(|a| a.name()).collect();
        action_names.sort_unstable();
        if action_names.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::new(element.clone(), "duplicate action names"));
        }

        let mut variable_names: Vec<&str> =
            self.state_variables.iter().map(|v| v.name.as_str()).collect();
        variable_names.sort_unstable();
        if variable_names.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::new(element, "duplicate state variable names"));
        }

        for variable in &self.state_variables {
            variable.validate(errors);
        }
        for action in &self.actions {
            action.validate(&self.state_variables, errors);
        }
    }
}
