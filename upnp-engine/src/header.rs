//! Typed UPnP header values.
//!
//! ST, NT and USN values overlap syntactically (`uuid:X` is both a UDN
//! target and a prefix of every named type), so they are resolved through
//! ordered parser tables: the first entry that accepts the value parses it.

use std::fmt;

use url::Url;

use crate::model::{DeviceType, NamedDeviceType, NamedServiceType, ServiceType, Udn};

/// Value of `NT: upnp:event` on GENA requests.
pub const GENA_EVENT_NT: &str = "upnp:event";

const ROOT_DEVICE: &str = "upnp:rootdevice";
const ALL: &str = "ssdp:all";

/// One entry of a parser table.
struct HeaderParser<T> {
    accepts: fn(&str) -> bool,
    parse: fn(&str) -> Option<T>,
}

fn resolve<T>(parsers: &[HeaderParser<T>], value: &str) -> Option<T> {
    let value = value.trim();
    parsers
        .iter()
        .find(|p| (p.accepts)(value))
        .and_then(|p| (p.parse)(value))
}

fn is_uuid(value: &str) -> bool {
    value.len() > 5
        && value
            .get(..5)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case("uuid:"))
}

fn is_device_urn(value: &str) -> bool {
    value.starts_with("urn:") && value.contains(":device:")
}

fn is_service_urn(value: &str) -> bool {
    value.starts_with("urn:") && value.contains(":service:")
}

/// ST of a search, or NT of a notification (which never is `ssdp:all`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchTarget {
    All,
    RootDevice,
    Udn(Udn),
    DeviceType(DeviceType),
    ServiceType(ServiceType),
}

const SEARCH_TARGET_PARSERS: &[HeaderParser<SearchTarget>] = &[
    HeaderParser {
        accepts: |v| v == ALL,
        parse: |_| Some(SearchTarget::All),
    },
    HeaderParser {
        accepts: |v| v == ROOT_DEVICE,
        parse: |_| Some(SearchTarget::RootDevice),
    },
    HeaderParser {
        accepts: |v| is_uuid(v) && !v.contains("::"),
        parse: |v| v.parse().ok().map(SearchTarget::Udn),
    },
    HeaderParser {
        accepts: is_device_urn,
        parse: |v| v.parse().ok().map(SearchTarget::DeviceType),
    },
    HeaderParser {
        accepts: is_service_urn,
        parse: |v| v.parse().ok().map(SearchTarget::ServiceType),
    },
];

impl SearchTarget {
    pub fn parse(value: &str) -> Option<Self> {
        resolve(SEARCH_TARGET_PARSERS, value)
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTarget::All => f.write_str(ALL),
            SearchTarget::RootDevice => f.write_str(ROOT_DEVICE),
            SearchTarget::Udn(udn) => write!(f, "{}", udn),
            SearchTarget::DeviceType(t) => write!(f, "{}", t),
            SearchTarget::ServiceType(t) => write!(f, "{}", t),
        }
    }
}

/// Unique Service Name of an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Usn {
    RootDevice(Udn),
    Udn(Udn),
    DeviceType(NamedDeviceType),
    ServiceType(NamedServiceType),
}

const USN_PARSERS: &[HeaderParser<Usn>] = &[
    HeaderParser {
        accepts: |v| is_uuid(v) && v.ends_with("::upnp:rootdevice"),
        parse: |v| {
            v.trim_end_matches("::upnp:rootdevice")
                .parse()
                .ok()
                .map(Usn::RootDevice)
        },
    },
    HeaderParser {
        accepts: |v| is_uuid(v) && v.contains("::urn:") && v.contains(":device:"),
        parse: |v| v.parse().ok().map(Usn::DeviceType),
    },
    HeaderParser {
        accepts: |v| is_uuid(v) && v.contains("::urn:") && v.contains(":service:"),
        parse: |v| v.parse().ok().map(Usn::ServiceType),
    },
    HeaderParser {
        accepts: |v| is_uuid(v) && !v.contains("::"),
        parse: |v| v.parse().ok().map(Usn::Udn),
    },
];

impl Usn {
    pub fn parse(value: &str) -> Option<Self> {
        resolve(USN_PARSERS, value)
    }

    pub fn udn(&self) -> &Udn {
        match self {
            Usn::RootDevice(udn) | Usn::Udn(udn) => udn,
            Usn::DeviceType(named) => &named.udn,
            Usn::ServiceType(named) => &named.udn,
        }
    }

    /// USN matching an NT for the device `udn`.
    pub fn for_target(udn: &Udn, target: &SearchTarget) -> Self {
        match target {
            SearchTarget::RootDevice => Usn::RootDevice(udn.clone()),
            SearchTarget::DeviceType(t) => Usn::DeviceType(NamedDeviceType {
                udn: udn.clone(),
                device_type: t.clone(),
            }),
            SearchTarget::ServiceType(t) => Usn::ServiceType(NamedServiceType {
                udn: udn.clone(),
                service_type: t.clone(),
            }),
            SearchTarget::All | SearchTarget::Udn(_) => Usn::Udn(udn.clone()),
        }
    }
}

impl fmt::Display for Usn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usn::RootDevice(udn) => write!(f, "{}::{}", udn, ROOT_DEVICE),
            Usn::Udn(udn) => write!(f, "{}", udn),
            Usn::DeviceType(named) => write!(f, "{}", named),
            Usn::ServiceType(named) => write!(f, "{}", named),
        }
    }
}

/// GENA TIMEOUT: `Second-N` or `Second-infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}

impl Timeout {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let rest = value
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("Second-"))
            .map(|_| &value[7..])?;
        if rest.eq_ignore_ascii_case("infinite") {
            Some(Timeout::Infinite)
        } else {
            rest.trim().parse().ok().map(Timeout::Seconds)
        }
    }

    pub fn seconds(&self) -> Option<u32> {
        match self {
            Timeout::Seconds(s) => Some(*s),
            Timeout::Infinite => None,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Seconds(s) => write!(f, "Second-{}", s),
            Timeout::Infinite => f.write_str("Second-infinite"),
        }
    }
}

/// GENA SEQ; leading zeros are tolerated.
pub fn parse_seq(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = value.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// GENA CALLBACK: one or more `<url>`; only HTTP URLs are kept.
pub fn parse_callback(value: &str) -> Vec<Url> {
    value
        .split('<')
        .filter_map(|part| part.split_once('>').map(|(url, _)| url.trim()))
        .filter_map(|url| Url::parse(url).ok())
        .filter(|url| url.scheme() == "http")
        .collect()
}

/// GENA CALLBACK header value for one URL.
pub fn callback_value(url: &str) -> String {
    format!("<{}>", url)
}

/// GENA SID: `uuid:...`.
pub fn parse_sid(value: &str) -> Option<String> {
    let value = value.trim();
    is_uuid(value).then(|| value.to_string())
}
