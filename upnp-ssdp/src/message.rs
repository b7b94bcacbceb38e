//! SSDP datagram codec.
//!
//! SSDP messages are HTTP/1.1-shaped text over UDP: a start line, `NAME: value`
//! header lines terminated by CRLF and an empty line. There is no body.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{Result, SsdpError};

/// The SSDP multicast group.
pub const MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// The SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Maximum size of a datagram we are willing to read.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Well-known header names.
pub mod header {
    pub const HOST: &str = "HOST";
    pub const NT: &str = "NT";
    pub const NTS: &str = "NTS";
    pub const USN: &str = "USN";
    pub const ST: &str = "ST";
    pub const MX: &str = "MX";
    pub const MAN: &str = "MAN";
    pub const SERVER: &str = "SERVER";
    pub const USER_AGENT: &str = "USER-AGENT";
    pub const LOCATION: &str = "LOCATION";
    pub const CACHE_CONTROL: &str = "CACHE-CONTROL";
    pub const EXT: &str = "EXT";
    pub const DATE: &str = "DATE";
}

/// The MAN value every M-SEARCH must carry.
pub const MAN_DISCOVER: &str = "\"ssdp:discover\"";

/// Socket address of the multicast group.
pub fn multicast_socket_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(MULTICAST_ADDRESS), SSDP_PORT)
}

/// Start line of an SSDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    /// `NOTIFY * HTTP/1.1`
    Notify,
    /// `M-SEARCH * HTTP/1.1`
    MSearch,
    /// Any other request method, kept so the caller can decide to reject it.
    Other(String),
    /// `HTTP/1.1 <status> <reason>`
    Response { status: u16, reason: String },
}

impl StartLine {
    fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let first = parts
            .next()
            .ok_or_else(|| SsdpError::Parse("Empty start line".to_string()))?;

        if first.len() >= 5 && first[..5].eq_ignore_ascii_case("HTTP/") {
            let status = parts
                .next()
                .and_then(|s| s.parse::<u16>().ok())
                .ok_or_else(|| SsdpError::Parse(format!("Invalid status line: {}", line)))?;
            let reason = parts.collect::<Vec<_>>().join(" ");
            return Ok(StartLine::Response { status, reason });
        }

        // Requests are "<METHOD> * HTTP/1.1"
        match parts.next() {
            Some(_) => {}
            None => return Err(SsdpError::Parse(format!("Invalid request line: {}", line))),
        }

        Ok(match first.to_ascii_uppercase().as_str() {
            "NOTIFY" => StartLine::Notify,
            "M-SEARCH" => StartLine::MSearch,
            other => StartLine::Other(other.to_string()),
        })
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Notify => write!(f, "NOTIFY * HTTP/1.1"),
            StartLine::MSearch => write!(f, "M-SEARCH * HTTP/1.1"),
            StartLine::Other(method) => write!(f, "{} * HTTP/1.1", method),
            StartLine::Response { status, reason } => write!(f, "HTTP/1.1 {} {}", status, reason),
        }
    }
}

/// Ordered header list with case-insensitive lookup.
///
/// Header order is preserved for encoding; duplicate names are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a header, keeping existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value of `name` with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A decoded SSDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpMessage {
    pub start_line: StartLine,
    pub headers: Headers,
}

impl SsdpMessage {
    /// Create an empty NOTIFY addressed to the multicast group.
    pub fn notify() -> Self {
        let mut headers = Headers::new();
        headers.add(header::HOST, format!("{}:{}", MULTICAST_ADDRESS, SSDP_PORT));
        Self {
            start_line: StartLine::Notify,
            headers,
        }
    }

    /// Create an M-SEARCH for `search_target` with the given MX.
    pub fn search(search_target: &str, mx_seconds: u32) -> Self {
        let mut headers = Headers::new();
        headers.add(header::HOST, format!("{}:{}", MULTICAST_ADDRESS, SSDP_PORT));
        headers.add(header::MAN, MAN_DISCOVER);
        // MX must be at least 1 per UDA
        headers.add(header::MX, mx_seconds.max(1).to_string());
        headers.add(header::ST, search_target);
        Self {
            start_line: StartLine::MSearch,
            headers,
        }
    }

    /// Create an empty `200 OK` search response.
    pub fn response_ok() -> Self {
        Self {
            start_line: StartLine::Response {
                status: 200,
                reason: "OK".to_string(),
            },
            headers: Headers::new(),
        }
    }

    /// Decode a datagram.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SsdpError::Parse(format!("Datagram is not UTF-8: {}", e)))?;

        let mut lines = text.lines();
        let start_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SsdpError::Parse("Empty datagram".to_string()))
            .and_then(StartLine::parse)?;

        let mut headers = Headers::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                break;
            }
            // Header lines without a colon are ignored, some devices emit junk
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() {
                    headers.add(name, value.trim());
                }
            }
        }

        Ok(Self {
            start_line,
            headers,
        })
    }

    /// Encode to wire text.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(&self.start_line.to_string());
        out.push_str("\r\n");
        for (name, value) in self.headers.iter() {
            out.push_str(name);
            out.push(':');
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }

    pub fn is_request(&self) -> bool {
        !matches!(self.start_line, StartLine::Response { .. })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn nt(&self) -> Option<&str> {
        self.headers.get(header::NT)
    }

    pub fn nts(&self) -> Option<&str> {
        self.headers.get(header::NTS)
    }

    pub fn usn(&self) -> Option<&str> {
        self.headers.get(header::USN)
    }

    pub fn st(&self) -> Option<&str> {
        self.headers.get(header::ST)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION)
    }

    /// `MX` in seconds, if present and numeric.
    pub fn mx(&self) -> Option<u32> {
        self.headers
            .get(header::MX)
            .and_then(|v| v.trim().parse::<u32>().ok())
    }

    /// `max-age` directive of the `CACHE-CONTROL` header.
    pub fn max_age(&self) -> Option<u32> {
        self.headers
            .get(header::CACHE_CONTROL)
            .and_then(parse_max_age)
    }
}

impl fmt::Display for SsdpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start_line)?;
        if let Some(target) = self.nt().or_else(|| self.st()) {
            write!(f, " ({})", target)?;
        }
        Ok(())
    }
}

/// Parse `max-age=1800` out of a `CACHE-CONTROL` value that may carry other directives.
pub fn parse_max_age(value: &str) -> Option<u32> {
    value.split(',').find_map(|directive| {
        let (name, seconds) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            seconds.trim().trim_matches('"').parse::<u32>().ok()
        } else {
            None
        }
    })
}

/// A datagram received from the network.
#[derive(Debug, Clone)]
pub struct IncomingDatagram {
    pub message: SsdpMessage,
    /// Sender of the datagram.
    pub source: SocketAddr,
    /// Local address the datagram arrived on, when known.
    pub local_address: Option<IpAddr>,
}

/// A datagram to send.
#[derive(Debug, Clone)]
pub struct OutgoingDatagram {
    pub message: SsdpMessage,
    pub destination: SocketAddr,
}

impl OutgoingDatagram {
    /// Address a message to the multicast group.
    pub fn multicast(message: SsdpMessage) -> Self {
        Self {
            message,
            destination: multicast_socket_addr(),
        }
    }

    pub fn unicast(message: SsdpMessage, destination: SocketAddr) -> Self {
        Self {
            message,
            destination,
        }
    }
}
