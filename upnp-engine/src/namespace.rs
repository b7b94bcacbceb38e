//! URI layout of the stream server.
//!
//! ```text
//! /dev/<udn>/desc                                   device descriptor
//! /dev/<udn>/icon/<index>                           icon
//! /dev/<udn>/svc/<ns>/<service id>/desc             service descriptor
//! /dev/<udn>/svc/<ns>/<service id>/action           control
//! /dev/<udn>/svc/<ns>/<service id>/event            event subscription
//! /dev/<udn>/svc/<ns>/<service id>/event/cb         event callback
//! ```
//!
//! Local devices are served under their own UDN; callbacks of remote
//! subscriptions are addressed by the remote device's UDN.

use crate::model::{ServiceId, ServiceReference, Udn};

const DEVICE: &str = "/dev";
const SERVICE: &str = "/svc";
const ICON: &str = "/icon";
const DESCRIPTOR: &str = "/desc";
const CONTROL: &str = "/action";
const EVENTS: &str = "/event";

/// Suffix of event callback paths.
pub const CALLBACK_MARKER: &str = "/event/cb";

/// What a path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    DeviceDescriptor(Udn),
    Icon(Udn, usize),
    ServiceDescriptor(ServiceReference),
    Control(ServiceReference),
    EventSubscription(ServiceReference),
    EventCallback(ServiceReference),
}

/// Builds and classifies stream paths, optionally below a base path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    base_path: String,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve everything below `base_path`, e.g. `/upnp`.
    pub fn with_base_path(base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }

    pub fn device_path(&self, udn: &Udn) -> String {
        format!("{}{}/{}", self.base_path, DEVICE, udn.id())
    }

    pub fn device_descriptor_path(&self, udn: &Udn) -> String {
        format!("{}{}", self.device_path(udn), DESCRIPTOR)
    }

    pub fn icon_path(&self, udn: &Udn, index: usize) -> String {
        format!("{}{}/{}", self.device_path(udn), ICON, index)
    }

    pub fn service_path(&self, service: &ServiceReference) -> String {
        format!(
            "{}{}/{}/{}",
            self.device_path(&service.udn),
            SERVICE,
            service.service_id.namespace(),
            service.service_id.id()
        )
    }

    pub fn service_descriptor_path(&self, service: &ServiceReference) -> String {
        format!("{}{}", self.service_path(service), DESCRIPTOR)
    }

    pub fn control_path(&self, service: &ServiceReference) -> String {
        format!("{}{}", self.service_path(service), CONTROL)
    }

    pub fn event_subscription_path(&self, service: &ServiceReference) -> String {
        format!("{}{}", self.service_path(service), EVENTS)
    }

    pub fn event_callback_path(&self, service: &ServiceReference) -> String {
        format!("{}{}", self.service_path(service), CALLBACK_MARKER)
    }

    pub fn is_control_path(&self, path: &str) -> bool {
        path.ends_with(CONTROL)
    }

    pub fn is_event_subscription_path(&self, path: &str) -> bool {
        path.ends_with(EVENTS)
    }

    pub fn is_event_callback_path(&self, path: &str) -> bool {
        path.ends_with(CALLBACK_MARKER)
    }

    /// `path` cut right after the first callback marker, for callback URLs
    /// some stacks append garbage to.
    pub fn truncate_after_callback_marker<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.find(CALLBACK_MARKER)
            .map(|idx| &path[..idx + CALLBACK_MARKER.len()])
    }

    /// Classify `path`; the referenced device or service may not exist.
    pub fn resolve(&self, path: &str) -> Option<Resource> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        let rest = rest.strip_prefix(DEVICE)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            [udn, "desc"] => Some(Resource::DeviceDescriptor(Udn::new(*udn))),
            [udn, "icon", index] => index
                .parse()
                .ok()
                .map(|index| Resource::Icon(Udn::new(*udn), index)),
            [udn, "svc", namespace, id, tail @ ..] => {
                let reference =
                    ServiceReference::new(Udn::new(*udn), ServiceId::new(*namespace, *id));
                match tail {
                    ["desc"] => Some(Resource::ServiceDescriptor(reference)),
                    ["action"] => Some(Resource::Control(reference)),
                    ["event"] => Some(Resource::EventSubscription(reference)),
                    ["event", "cb"] => Some(Resource::EventCallback(reference)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn switch_power() -> ServiceReference {
        ServiceReference::new(Udn::new("light-1"), ServiceId::uda("SwitchPower"))
    }

    #[test]
    fn test_paths() {
        let ns = Namespace::new();
        let svc = switch_power();

        assert_eq!(ns.device_descriptor_path(&svc.udn), "/dev/light-1/desc");
        assert_eq!(ns.icon_path(&svc.udn, 0), "/dev/light-1/icon/0");
        assert_eq!(
            ns.service_descriptor_path(&svc),
            "/dev/light-1/svc/upnp-org/SwitchPower/desc"
        );
        assert_eq!(ns.control_path(&svc), "/dev/light-1/svc/upnp-org/SwitchPower/action");
        assert_eq!(
            ns.event_subscription_path(&svc),
            "/dev/light-1/svc/upnp-org/SwitchPower/event"
        );
        assert_eq!(
            ns.event_callback_path(&svc),
            "/dev/light-1/svc/upnp-org/SwitchPower/event/cb"
        );
    }

    #[test]
    fn test_resolve_roundtrip() {
        let ns = Namespace::with_base_path("/upnp/");
        let svc = switch_power();

        assert_eq!(
            ns.resolve(&ns.device_descriptor_path(&svc.udn)),
            Some(Resource::DeviceDescriptor(svc.udn.clone()))
        );
        assert_eq!(
            ns.resolve(&ns.icon_path(&svc.udn, 2)),
            Some(Resource::Icon(svc.udn.clone(), 2))
        );
        assert_eq!(
            ns.resolve(&ns.control_path(&svc)),
            Some(Resource::Control(svc.clone()))
        );
        assert_eq!(
            ns.resolve(&ns.event_subscription_path(&svc)),
            Some(Resource::EventSubscription(svc.clone()))
        );
        assert_eq!(
            ns.resolve(&ns.event_callback_path(&svc)),
            Some(Resource::EventCallback(svc.clone()))
        );
        assert_eq!(
            ns.resolve(&ns.service_descriptor_path(&svc)),
            Some(Resource::ServiceDescriptor(svc))
        );
    }

    #[rstest]
    #[case("/")]
    #[case("/dev/light-1")]
    #[case("/dev/light-1/svc/upnp-org/SwitchPower")]
    #[case("/dev/light-1/svc/upnp-org/SwitchPower/event/cb/extra")]
    #[case("/dev/light-1/icon/x")]
    #[case("/other/light-1/desc")]
    fn test_resolve_rejects(#[case] path: &str) {
        assert_eq!(Namespace::new().resolve(path), None);
    }

    #[test]
    fn test_path_classification() {
        let ns = Namespace::new();
        let svc = switch_power();

        assert!(ns.is_control_path(&ns.control_path(&svc)));
        assert!(ns.is_event_subscription_path(&ns.event_subscription_path(&svc)));
        assert!(!ns.is_event_subscription_path(&ns.event_callback_path(&svc)));
        assert!(ns.is_event_callback_path(&ns.event_callback_path(&svc)));

        let garbage = format!("{}/garbage", ns.event_callback_path(&svc));
        assert!(!ns.is_event_callback_path(&garbage));
        assert_eq!(
            ns.truncate_after_callback_marker(&garbage),
            Some(ns.event_callback_path(&svc).as_str())
        );
    }
}
