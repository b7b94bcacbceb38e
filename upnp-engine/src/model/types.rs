//! Identifiers: UDNs, device and service types, service ids.

use std::fmt;
use std::str::FromStr;

/// Namespace of the types and ids standardized by the UPnP Forum.
pub const UDA_NAMESPACE: &str = "schemas-upnp-org";

/// Namespace of standardized service ids.
pub const UDA_SERVICE_ID_NAMESPACE: &str = "upnp-org";

/// A type string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value}")]
pub struct InvalidType {
    pub kind: &'static str,
    pub value: String,
}

impl InvalidType {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Unique Device Name, displayed as `uuid:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Udn(String);

impl Udn {
    /// Wrap an identifier without the `uuid:` prefix.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random UDN.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier without the `uuid:` prefix.
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl FromStr for Udn {
    type Err = InvalidType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("uuid:") && s.len() > 5 => {
                Ok(Udn(s[5..].to_string()))
            }
            _ => Err(InvalidType::new("UDN", s)),
        }
    }
}

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uuid:{}", self.0)
    }
}

/// Split `urn:<namespace>:<kind>:<type>:<version>`.
fn parse_urn<'a>(value: &'a str, kind: &str) -> Option<(&'a str, &'a str, u32)> {
    let mut parts = value.trim().split(':');
    let urn = parts.next()?;
    let namespace = parts.next()?;
    let found_kind = parts.next()?;
    let type_name = parts.next()?;
    let version = parts.next()?.trim().parse::<u32>().ok()?;
    if parts.next().is_some()
        || !urn.eq_ignore_ascii_case("urn")
        || found_kind != kind
        || namespace.is_empty()
        || type_name.is_empty()
    {
        return None;
    }
    Some((namespace, type_name, version))
}

macro_rules! versioned_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            namespace: String,
            type_name: String,
            version: u32,
        }

        impl $name {
            pub fn new(namespace: impl Into<String>, type_name: impl Into<String>, version: u32) -> Self {
                Self {
                    namespace: namespace.into(),
                    type_name: type_name.into(),
                    version,
                }
            }

            /// A type in the UPnP Forum namespace.
            pub fn uda(type_name: impl Into<String>, version: u32) -> Self {
                Self::new(UDA_NAMESPACE, type_name, version)
            }

            pub fn namespace(&self) -> &str {
                &self.namespace
            }

            pub fn type_name(&self) -> &str {
                &self.type_name
            }

            pub fn version(&self) -> u32 {
                self.version
            }

            /// Same namespace and type, and at least `other`'s version.
            pub fn implements_version(&self, other: &$name) -> bool {
                self.namespace == other.namespace
                    && self.type_name == other.type_name
                    && self.version >= other.version
            }
        }

        impl FromStr for $name {
            type Err = InvalidType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_urn(s, $kind)
                    .map(|(namespace, type_name, version)| Self::new(namespace, type_name, version))
                    .ok_or_else(|| InvalidType::new($kind, s))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "urn:{}:{}:{}:{}", self.namespace, $kind, self.type_name, self.version)
            }
        }
    };
}

versioned_type!(
    /// `urn:<namespace>:device:<type>:<version>`
    DeviceType,
    "device"
);

versioned_type!(
    /// `urn:<namespace>:service:<type>:<version>`
    ServiceType,
    "service"
);

/// `urn:<namespace>:serviceId:<id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    namespace: String,
    id: String,
}

impl ServiceId {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// An id in the `upnp-org` namespace.
    pub fn uda(id: impl Into<String>) -> Self {
        Self::new(UDA_SERVICE_ID_NAMESPACE, id)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parse, accepting ids some devices send without the `urn:<ns>:serviceId:`
    /// prefix or with a wrong separator.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        if let Ok(id) = value.parse() {
            return Some(id);
        }
        let value = value.trim();
        let id = value.rsplit(':').next().filter(|id| !id.is_empty())?;
        tracing::warn!(
            target: crate::logging::VIOLATION_TARGET,
            service_id = value,
            "Malformed service id, using '{}' in the upnp-org namespace",
            id
        );
        Some(Self::uda(id))
    }
}

impl FromStr for ServiceId {
    type Err = InvalidType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [urn, namespace, "serviceId", id]
                if urn.eq_ignore_ascii_case("urn") && !namespace.is_empty() && !id.is_empty() =>
            {
                Ok(Self::new(*namespace, *id))
            }
            _ => Err(InvalidType::new("serviceId", s)),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:{}:serviceId:{}", self.namespace, self.id)
    }
}

/// A device type qualified by the UDN of a device: `uuid:X::urn:...:device:...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedDeviceType {
    pub udn: Udn,
    pub device_type: DeviceType,
}

impl FromStr for NamedDeviceType {
    type Err = InvalidType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (udn, device_type) = s
            .trim()
            .split_once("::")
            .ok_or_else(|| InvalidType::new("named device type", s))?;
        Ok(Self {
            udn: udn.parse()?,
            device_type: device_type.parse()?,
        })
    }
}

impl fmt::Display for NamedDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.udn, self.device_type)
    }
}

/// A service type qualified by the UDN of a device: `uuid:X::urn:...:service:...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedServiceType {
    pub udn: Udn,
    pub service_type: ServiceType,
}

impl FromStr for NamedServiceType {
    type Err = InvalidType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (udn, service_type) = s
            .trim()
            .split_once("::")
            .ok_or_else(|| InvalidType::new("named service type", s))?;
        Ok(Self {
            udn: udn.parse()?,
            service_type: service_type.parse()?,
        })
    }
}

impl fmt::Display for NamedServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.udn, self.service_type)
    }
}

/// NTS values of SSDP and GENA notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationSubtype {
    Alive,
    Update,
    Byebye,
    All,
    Discover,
    Propchange,
}

impl NotificationSubtype {
    pub fn header_value(&self) -> &'static str {
        match self {
            NotificationSubtype::Alive => "ssdp:alive",
            NotificationSubtype::Update => "ssdp:update",
            NotificationSubtype::Byebye => "ssdp:byebye",
            NotificationSubtype::All => "ssdp:all",
            NotificationSubtype::Discover => "ssdp:discover",
            NotificationSubtype::Propchange => "upnp:propchange",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        [
            NotificationSubtype::Alive,
            NotificationSubtype::Update,
            NotificationSubtype::Byebye,
            NotificationSubtype::All,
            NotificationSubtype::Discover,
            NotificationSubtype::Propchange,
        ]
        .into_iter()
        .find(|nts| nts.header_value().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for NotificationSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}
