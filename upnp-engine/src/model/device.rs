use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::{ValidationError, ValidationErrors};
use crate::model::{DeviceType, Service, ServiceReference, ServiceType, Udn};

/// Max-age advertised for local devices unless configured otherwise.
pub const DEFAULT_MAX_AGE_SECONDS: u32 = 1800;

/// Human-readable device metadata from the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDetails {
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_name: String,
    pub model_description: Option<String>,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Absolute for remote devices, empty for local ones until generated
    pub url: String,
    /// Image bytes served for local devices
    pub data: Option<Bytes>,
}

/// How a remote device was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub descriptor_url: Url,
    /// Local interface address the advertisement arrived on
    pub discovered_on: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOrigin {
    /// Hosted by this engine
    Local,
    /// Discovered on the network
    Remote(RemoteIdentity),
}

/// A device with its services and embedded devices.
///
/// Devices are immutable once registered; the registry shares them as
/// `Arc<Device>` and replaces them wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub udn: Udn,
    pub device_type: DeviceType,
    pub details: DeviceDetails,
    pub icons: Vec<Icon>,
    pub services: Vec<Arc<Service>>,
    pub embedded: Vec<Device>,
    pub origin: DeviceOrigin,
    /// Seconds an advertisement stays valid
    pub max_age: u32,
}

impl Device {
    /// A device hosted by this engine.
    pub fn local(udn: Udn, device_type: DeviceType, details: DeviceDetails) -> Self {
        Self {
            udn,
            device_type,
            details,
            icons: Vec::new(),
            services: Vec::new(),
            embedded: Vec::new(),
            origin: DeviceOrigin::Local,
            max_age: DEFAULT_MAX_AGE_SECONDS,
        }
    }

    /// A device found on the network.
    pub fn remote(
        udn: Udn,
        device_type: DeviceType,
        details: DeviceDetails,
        identity: RemoteIdentity,
    ) -> Self {
        Self {
            origin: DeviceOrigin::Remote(identity),
            ..Self::local(udn, device_type, details)
        }
    }

    /// Add a service, binding it to this device's UDN.
    pub fn with_service(mut self, mut service: Service) -> Self {
        service.udn = self.udn.clone();
        self.services.push(Arc::new(service));
        self
    }

    pub fn with_embedded(mut self, device: Device) -> Self {
        self.embedded.push(device);
        self
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icons.push(icon);
        self
    }

    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn is_local(&self) -> bool {
        self.origin == DeviceOrigin::Local
    }

    pub fn remote_identity(&self) -> Option<&RemoteIdentity> {
        match &self.origin {
            DeviceOrigin::Remote(identity) => Some(identity),
            DeviceOrigin::Local => None,
        }
    }

    /// This device and all embedded devices, depth first.
    pub fn all_devices(&self) -> Vec<&Device> {
        let mut devices = vec![self];
        for embedded in &self.embedded {
            devices.extend(embedded.all_devices());
        }
        devices
    }

    /// Services of this device and all embedded devices.
    pub fn all_services(&self) -> Vec<&Arc<Service>> {
        self.all_devices()
            .into_iter()
            .flat_map(|d| d.services.iter())
            .collect()
    }

    pub fn udns(&self) -> Vec<&Udn> {
        self.all_devices().into_iter().map(|d| &d.udn).collect()
    }

    /// This device or an embedded device with `udn`.
    pub fn find_device(&self, udn: &Udn) -> Option<&Device> {
        self.all_devices().into_iter().find(|d| &d.udn == udn)
    }

    pub fn find_service(&self, reference: &ServiceReference) -> Option<&Arc<Service>> {
        self.find_device(&reference.udn)?
            .services
            .iter()
            .find(|s| s.service_id == reference.service_id)
    }

    /// Distinct service types of this device only, in declaration order.
    pub fn service_types(&self) -> Vec<&ServiceType> {
        let mut types: Vec<&ServiceType> = Vec::new();
        for service in &self.services {
            if !types.contains(&&service.service_type) {
                types.push(&service.service_type);
            }
        }
        types
    }

    /// Check the whole tree, collecting every failure.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        self.validate_into(&mut errors);

        let mut udns = self.udns();
        udns.sort();
        if udns.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::new(
                format!("Device({})", self.udn),
                "duplicate UDN in device tree",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn validate_into(&self, errors: &mut Vec<ValidationError>) {
        let element = format!("Device({})", self.udn);
        if self.udn.id().is_empty() {
            errors.push(ValidationError::new(element.clone(), "UDN is empty"));
        }
        if self.embedded.iter().any(|d| d.origin != self.origin) {
            errors.push(ValidationError::new(
                element.clone(),
                "embedded device has a different origin",
            ));
        }
        let mut ids: Vec<String> = self.services.iter().map(|s| s.service_id.to_string()).collect();
        ids.sort();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ValidationError::new(element.clone(), "duplicate service ids"));
        }
        for service in &self.services {
            if service.udn != self.udn {
                errors.push(ValidationError::new(
                    element.clone(),
                    format!("service {} is bound to {}", service.service_id, service.udn),
                ));
            }
            service.validate(errors);
        }
        for icon in &self.icons {
            if icon.mime_type.is_empty() {
                errors.push(ValidationError::new(element.clone(), "icon without mime type"));
            }
        }
        for embedded in &self.embedded {
            embedded.validate_into(errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ActionArgument, Datatype, ServiceId, StateVariable};

    fn light(udn: &str) -> Device {
        Device::local(
            Udn::new(udn),
            DeviceType::uda("BinaryLight", 1),
            DeviceDetails {
                friendly_name: "Light".to_string(),
                ..Default::default()
            },
        )
        .with_service(
            Service::new(ServiceType::uda("SwitchPower", 1), ServiceId::uda("SwitchPower"))
                .with_state_variable(StateVariable::new("Status", Datatype::Boolean).evented()),
        )
    }

    #[test]
    fn test_tree_queries() {
        let root = light("root").with_embedded(light("child"));

        assert_eq!(root.all_devices().len(), 2);
        assert_eq!(root.all_services().len(), 2);
        assert_eq!(root.find_device(&Udn::new("child")).unwrap().udn, Udn::new("child"));

        let reference = ServiceReference::new(Udn::new("child"), ServiceId::uda("SwitchPower"));
        assert_eq!(root.find_service(&reference).unwrap().udn, Udn::new("child"));
        assert_eq!(root.service_types().len(), 1);
    }

    #[test]
    fn test_validate_ok() {
        assert!(light("root").with_embedded(light("child")).validate().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let broken = light("root")
            .with_embedded(light("root"))
            .with_service(
                Service::new(ServiceType::uda("Dimming", 1), ServiceId::uda("Dimming")).with_action(
                    Action::new("SetLoadLevelTarget", vec![ActionArgument::input("newLoadlevelTarget", "LoadLevelTarget")]),
                ),
            );

        let errors = broken.validate().unwrap_err();
        assert_eq!(errors.errors().len(), 2);
    }
}
