//! Configuration types for the upnp-engine crate
//!
//! [`EngineConfig`] is handed to [`UpnpService::start`](crate::UpnpService::start)
//! and owned by the engine for its whole lifetime.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::ServiceType;

/// Upper bound of `retry_attempts`; backoff doubles per retry.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Which remote service advertisements are accepted by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceTypeFilter {
    /// Remote discovery is turned off; only byebye messages are processed
    Disabled,
    /// Every advertisement is accepted
    #[default]
    Any,
    /// Only advertisements whose type implements one of these types
    Only(Vec<ServiceType>),
}

impl ServiceTypeFilter {
    /// Whether an advertised service type passes the filter.
    pub fn accepts(&self, advertised: &ServiceType) -> bool {
        match self {
            ServiceTypeFilter::Disabled => false,
            ServiceTypeFilter::Any => true,
            ServiceTypeFilter::Only(types) => {
                types.is_empty() || types.iter().any(|t| advertised.implements_version(t))
            }
        }
    }
}

/// Configuration for the UPnP engine
///
/// This struct controls listener binding, the worker pool, registry
/// maintenance, retry behaviour and GENA subscription timing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Port range for the HTTP stream server, inclusive
    /// Default: (0, 0), an ephemeral port
    pub stream_port_range: (u16, u16),

    /// SSDP multicast group and port
    /// Default: 239.255.255.250:1900
    pub multicast_address: SocketAddr,

    /// Local address the listeners bind to
    /// Default: 0.0.0.0
    pub bind_address: IpAddr,

    /// Period of the registry maintenance loop
    /// Default: 1000 milliseconds
    pub maintenance_interval: Duration,

    /// Re-announce local devices at this fixed period; `None` re-announces
    /// each device when half of its advertised max-age has passed
    /// Default: None
    pub alive_interval: Option<Duration>,

    /// Override of the max-age advertised by remote devices, in seconds
    /// Default: None
    pub remote_device_max_age: Option<u32>,

    /// Remote service advertisements accepted by discovery
    /// Default: ServiceTypeFilter::Any
    pub discovery_filter: ServiceTypeFilter,

    /// Number of worker tasks executing protocols
    /// Default: 200
    pub worker_threads: usize,

    /// Bounded worker queue; overflow is discarded with a warning
    /// Default: 1000
    pub worker_queue_capacity: usize,

    /// Timeout for outbound HTTP requests
    /// Default: 10 seconds
    pub stream_timeout: Duration,

    /// Retries of a failed outbound stream request before the failure is surfaced
    /// Default: 3
    pub retry_attempts: u32,

    /// Base delay between attempts to the same target, doubled per attempt;
    /// also how long a target stays cooling down after all attempts failed
    /// Default: 2 seconds
    pub retry_cooldown: Duration,

    /// Requested duration of outgoing subscriptions and granted duration of
    /// incoming ones when the request asks for none or for infinite, in seconds
    /// Default: 1800
    pub default_subscription_timeout: u32,

    /// Always grant `default_subscription_timeout`, whatever the subscriber asks for
    /// Default: false
    pub received_subscription_timeout_ignored: bool,

    /// Shortest and longest duration granted to incoming subscriptions, in
    /// seconds; requests outside are clamped
    /// Default: (60, 7200)
    pub granted_subscription_timeout_range: (u32, u32),

    /// Renew outgoing subscriptions no later than this before they expire
    /// Default: 5 seconds
    pub renewal_margin: Duration,

    /// MX of outgoing searches, in seconds
    /// Default: 3
    pub search_mx: u32,

    /// SERVER and USER-AGENT header value
    /// Default: "upnp-sdk/<version> UPnP/1.0"
    pub server_name: String,

    /// Extra headers sent with descriptor retrieval requests
    /// Default: empty
    pub descriptor_retrieval_headers: Vec<(String, String)>,

    /// Extra headers sent with SUBSCRIBE requests
    /// Default: empty
    pub event_subscription_headers: Vec<(String, String)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_port_range: (0, 0),
            multicast_address: SocketAddr::new(
                IpAddr::V4(upnp_ssdp::MULTICAST_ADDRESS),
                upnp_ssdp::SSDP_PORT,
            ),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            maintenance_interval: Duration::from_millis(1000),
            alive_interval: None,
            remote_device_max_age: None,
            discovery_filter: ServiceTypeFilter::Any,
            worker_threads: 200,
            worker_queue_capacity: 1000,
            stream_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_cooldown: Duration::from_secs(2),
            default_subscription_timeout: 1800, // 30 minutes
            received_subscription_timeout_ignored: false,
            granted_subscription_timeout_range: (60, 7200),
            renewal_margin: Duration::from_secs(5),
            search_mx: 3,
            server_name: format!("upnp-sdk/{} UPnP/1.0", env!("CARGO_PKG_VERSION")),
            descriptor_retrieval_headers: Vec::new(),
            event_subscription_headers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an EngineConfig for a pure control point, with a smaller
    /// worker pool
    pub fn control_point() -> Self {
        Self {
            worker_threads: 16,
            worker_queue_capacity: 256,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (start, end) = self.stream_port_range;
        if start > end {
            return Err(ConfigError(
                "Invalid stream port range: start must not exceed end".to_string(),
            ));
        }

        if self.maintenance_interval.is_zero() {
            return Err(ConfigError(
                "Maintenance interval must be greater than 0".to_string(),
            ));
        }

        if matches!(self.alive_interval, Some(interval) if interval.is_zero()) {
            return Err(ConfigError(
                "Alive interval must be greater than 0 when set".to_string(),
            ));
        }

        if self.worker_threads == 0 {
            return Err(ConfigError(
                "Worker threads must be greater than 0".to_string(),
            ));
        }

        if self.worker_queue_capacity == 0 {
            return Err(ConfigError(
                "Worker queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.retry_attempts == 0 || self.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError(format!(
                "Retry attempts must be between 1 and {}",
                MAX_RETRY_ATTEMPTS
            )));
        }

        if self.default_subscription_timeout == 0 {
            return Err(ConfigError(
                "Default subscription timeout must be greater than 0".to_string(),
            ));
        }

        let (min_granted, max_granted) = self.granted_subscription_timeout_range;
        if min_granted == 0 || min_granted > max_granted {
            return Err(ConfigError(
                "Invalid granted subscription timeout range: need 0 < min <= max".to_string(),
            ));
        }

        if !(min_granted..=max_granted).contains(&self.default_subscription_timeout) {
            return Err(ConfigError(
                "Default subscription timeout must lie within the granted range".to_string(),
            ));
        }

        if !self.multicast_address.ip().is_multicast() {
            return Err(ConfigError(format!(
                "{} is not a multicast address",
                self.multicast_address
            )));
        }

        Ok(())
    }

    /// Set the stream server port range
    pub fn with_stream_port_range(mut self, start: u16, end: u16) -> Self {
        self.stream_port_range = (start, end);
        self
    }

    /// Set the listener bind address
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set the maintenance interval
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Re-announce local devices at a fixed interval
    pub fn with_alive_interval(mut self, interval: Duration) -> Self {
        self.alive_interval = Some(interval);
        self
    }

    /// Override the max-age of remote devices
    pub fn with_remote_device_max_age(mut self, seconds: u32) -> Self {
        self.remote_device_max_age = Some(seconds);
        self
    }

    /// Set the discovery filter
    pub fn with_discovery_filter(mut self, filter: ServiceTypeFilter) -> Self {
        self.discovery_filter = filter;
        self
    }

    /// Set worker pool size and queue capacity
    pub fn with_workers(mut self, threads: usize, queue_capacity: usize) -> Self {
        self.worker_threads = threads;
        self.worker_queue_capacity = queue_capacity;
        self
    }

    /// Set retries and cooldown for outbound stream requests
    pub fn with_retry(mut self, attempts: u32, cooldown: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_cooldown = cooldown;
        self
    }

    /// Set the default subscription duration in seconds
    pub fn with_default_subscription_timeout(mut self, seconds: u32) -> Self {
        self.default_subscription_timeout = seconds;
        self
    }

    /// Set the range of durations granted to incoming subscriptions, in seconds
    pub fn with_granted_subscription_timeout_range(mut self, min: u32, max: u32) -> Self {
        self.granted_subscription_timeout_range = (min, max);
        self
    }

    /// Granted duration for an incoming subscription that asked for `requested` seconds.
    pub fn clamp_granted_subscription_timeout(&self, requested: u32) -> u32 {
        let (min, max) = self.granted_subscription_timeout_range;
        requested.clamp(min, max.max(min))
    }

    /// Set the SERVER / USER-AGENT header value
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Add a header to descriptor retrieval requests
    pub fn with_descriptor_retrieval_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.descriptor_retrieval_headers
            .push((name.into(), value.into()));
        self
    }

    /// Add a header to SUBSCRIBE requests
    pub fn with_event_subscription_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.event_subscription_headers.push((name.into(), value.into()));
        self
    }
}
