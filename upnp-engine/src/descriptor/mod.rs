//! Device and service descriptors.
//!
//! [`DescriptorBinder`] turns descriptor XML into the model and back. The
//! engine only talks to the trait; [`Uda10DescriptorBinder`] is the UDA 1.0
//! implementation used by default.

mod device;
mod generate;
mod service;

use url::Url;

use crate::error::DescriptorError;
use crate::model::{Device, Service};
use crate::namespace::Namespace;

/// Descriptor namespace of device descriptors.
pub const DEVICE_DESCRIPTOR_NS: &str = "urn:schemas-upnp-org:device-1-0";

/// Descriptor namespace of service descriptors.
pub const SERVICE_DESCRIPTOR_NS: &str = "urn:schemas-upnp-org:service-1-0";

/// Parses and generates descriptors.
pub trait DescriptorBinder: Send + Sync + 'static {
    /// Parse a device descriptor retrieved from `descriptor_url`.
    ///
    /// Services come back without actions or state variables; their
    /// descriptors are parsed separately with [`parse_service`](Self::parse_service).
    fn parse_device(&self, xml: &str, descriptor_url: &Url) -> Result<Device, DescriptorError>;

    /// Fill `service` with the actions and state variables of its descriptor.
    fn parse_service(&self, xml: &str, service: &Service) -> Result<Service, DescriptorError>;

    /// Device descriptor of a local device, URLs laid out by `namespace`.
    fn generate_device(&self, device: &Device, namespace: &Namespace) -> Result<String, DescriptorError>;

    fn generate_service(&self, service: &Service) -> Result<String, DescriptorError>;
}

/// UDA 1.0 descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uda10DescriptorBinder;

impl DescriptorBinder for Uda10DescriptorBinder {
    fn parse_device(&self, xml: &str, descriptor_url: &Url) -> Result<Device, DescriptorError> {
        device::parse_device(xml, descriptor_url)
    }

    fn parse_service(&self, xml: &str, service: &Service) -> Result<Service, DescriptorError> {
        service::parse_service(xml, service)
    }

    fn generate_device(&self, device: &Device, namespace: &Namespace) -> Result<String, DescriptorError> {
        generate::generate_device(device, namespace)
    }

    fn generate_service(&self, service: &Service) -> Result<String, DescriptorError> {
        generate::generate_service(service)
    }
}
