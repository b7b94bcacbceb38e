//! Local devices: services hosted by this engine.
//!
//! A [`LocalDevice`] is a device tree plus one [`LocalServiceBinding`] per
//! service. The binding holds the current state variable values in a
//! [`ServiceState`] and, optionally, the [`ActionExecutor`] that answers
//! control requests.
//!
//! Changing an evented state variable records a change; the router turns
//! pending changes into GENA events for every subscriber of the service.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ActionError, ErrorCode};
use crate::model::{ActionInvocation, Device, Service, ServiceReference, Value};

/// Executes actions of one local service.
///
/// Inputs are already typed and checked against the declared arguments.
/// The executor sets outputs on the invocation and may change state
/// variables through `state`.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        invocation: &mut ActionInvocation,
        state: &ServiceState,
    ) -> Result<(), ActionError>;
}

struct StateInner {
    values: Vec<(String, Value)>,
    /// Evented variables changed since the last flush, in change order
    changed: Vec<String>,
}

/// Current state variable values of a local service.
pub struct ServiceState {
    service: Arc<Service>,
    inner: parking_lot::Mutex<StateInner>,
}

impl ServiceState {
    /// State with every variable at its initial value.
    pub fn new(service: Arc<Service>) -> Self {
        let values = service
            .state_variables
            .iter()
            .map(|v| (v.name.clone(), v.initial_value()))
            .collect();
        Self {
            service,
            inner: parking_lot::Mutex::new(StateInner {
                values,
                changed: Vec::new(),
            }),
        }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Set a variable, checking the value against its declaration.
    ///
    /// Setting an evented variable to a different value records a change.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ActionError> {
        let variable = self.service.state_variable(name).ok_or_else(|| {
            ActionError::new(
                ErrorCode::ArgumentValueInvalid,
                format!("Service {} has no state variable {}", self.service.service_id, name),
            )
        })?;

        let value = variable
            .parse_value(&value.into().to_string())
            .map_err(|(code, message)| ActionError::new(code, message))?;

        let mut inner = self.inner.lock();
        let changed = match inner.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) if slot.1 == value => false,
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => {
                inner.values.push((name.to_string(), value));
                true
            }
        };
        if changed && variable.send_events && !inner.changed.iter().any(|n| n == name) {
            inner.changed.push(name.to_string());
        }
        Ok(())
    }

    /// Wire values of all evented variables, for the initial event.
    pub fn evented_values(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock();
        self.service
            .evented_state_variables()
            .filter_map(|variable| {
                inner
                    .values
                    .iter()
                    .find(|(n, _)| *n == variable.name)
                    .map(|(n, v)| (n.clone(), v.to_string()))
            })
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.inner.lock().changed.is_empty()
    }

    /// Wire values of changed evented variables; clears the change set.
    pub(crate) fn take_changes(&self) -> Vec<(String, String)> {
        let mut inner = self.inner.lock();
        let changed = std::mem::take(&mut inner.changed);
        changed
            .into_iter()
            .filter_map(|name| {
                inner
                    .values
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(n, v)| (n.clone(), v.to_string()))
            })
            .collect()
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("service", &self.service.service_id)
            .field("values", &self.inner.lock().values)
            .finish()
    }
}

/// State and executor of one local service.
#[derive(Clone)]
pub struct LocalServiceBinding {
    pub state: Arc<ServiceState>,
    pub executor: Option<Arc<dyn ActionExecutor>>,
}

impl fmt::Debug for LocalServiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalServiceBinding")
            .field("state", &self.state)
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

/// A device to publish, with executors for its services.
pub struct LocalDevice {
    device: Device,
    executors: HashMap<ServiceReference, Arc<dyn ActionExecutor>>,
}

impl LocalDevice {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            executors: HashMap::new(),
        }
    }

    /// Answer control requests for `service` with `executor`.
    pub fn with_executor(
        mut self,
        service: ServiceReference,
        executor: impl ActionExecutor,
    ) -> Self {
        self.executors.insert(service, Arc::new(executor));
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Split into the device and a binding for every service in the tree.
    ///
    /// Executors for services the tree does not contain are dropped.
    pub(crate) fn into_parts(mut self) -> (Device, HashMap<ServiceReference, LocalServiceBinding>) {
        let bindings = self
            .device
            .all_services()
            .into_iter()
            .map(|service| {
                let reference = service.reference();
                let binding = LocalServiceBinding {
                    state: Arc::new(ServiceState::new(service.clone())),
                    executor: self.executors.remove(&reference),
                };
                (reference, binding)
            })
            .collect();

        for unbound in self.executors.keys() {
            tracing::warn!(service = %unbound, "Executor bound to a service the device does not have");
        }

        (self.device, bindings)
    }
}

impl fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDevice")
            .field("udn", &self.device.udn)
            .field("executors", &self.executors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Datatype, Service, ServiceId, ServiceType, StateVariable};

    fn dimming() -> Arc<Service> {
        Arc::new(
            Service::new(ServiceType::uda("Dimming", 1), ServiceId::uda("Dimming"))
                .with_state_variable(
                    StateVariable::new("LoadLevelTarget", Datatype::Ui1)
                        .with_allowed_range(0.0, 100.0, None),
                )
                .with_state_variable(
                    StateVariable::new("LoadLevelStatus", Datatype::Ui1)
                        .evented()
                        .with_default("0"),
                ),
        )
    }

    #[test]
    fn test_initial_values() {
        let state = ServiceState::new(dimming());
        assert_eq!(state.get("LoadLevelStatus"), Some(Value::Unsigned(0)));
        assert_eq!(
            state.evented_values(),
            vec![("LoadLevelStatus".to_string(), "0".to_string())]
        );
        assert!(!state.has_changes());
    }

    #[test]
    fn test_only_evented_changes_are_recorded() {
        let state = ServiceState::new(dimming());

        state.set("LoadLevelTarget", 40u32).unwrap();
        assert!(!state.has_changes());

        state.set("LoadLevelStatus", 40u32).unwrap();
        state.set("LoadLevelStatus", 40u32).unwrap();
        assert_eq!(
            state.take_changes(),
            vec![("LoadLevelStatus".to_string(), "40".to_string())]
        );
        assert!(state.take_changes().is_empty());
    }

    #[test]
    fn test_set_rejects_out_of_range_and_unknown() {
        let state = ServiceState::new(dimming());

        let err = state.set("LoadLevelTarget", 120u32).unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentValueOutOfRange);

        let err = state.set("Missing", 1u32).unwrap_err();
        assert_eq!(err.code, ErrorCode::ArgumentValueInvalid);
    }
}
