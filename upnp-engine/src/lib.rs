//! # upnp-engine
//!
//! The protocol and registry engine of a UPnP control point and device stack.
//!
//! The engine discovers devices over SSDP, keeps them in a [`Registry`] that
//! expires them over time, invokes SOAP actions on remote services, and runs
//! GENA subscriptions in both directions. Local devices published through
//! the same engine are advertised, described and controlled over the same
//! transports.
//!
//! # Architecture
//!
//! ```text
//!        ┌────────────── UpnpService ──────────────┐
//!        │                                         │
//!  SsdpSocket ──┐                        ┌── MaintenanceLoop
//!  StreamServer ┴─► Router ─► ProtocolFactory      │
//!                     │           │                ▼
//!                     │      protocol tasks ──► Registry ──► RegistryEvent
//!                     ▼           │
//!                 WorkerPool ◄────┘
//! ```
//!
//! - [`router::Router`] classifies every inbound message through the
//!   [`protocol::ProtocolFactory`] and runs the matching protocol on a
//!   bounded [`router::WorkerPool`]. Outbound stream requests are retried
//!   and failing hosts are put on cooldown.
//! - [`Registry`] holds local and remote devices and subscriptions, emits
//!   [`RegistryEvent`]s on a broadcast channel, and tells the maintenance
//!   loop what is due: ALIVE announcements, subscription renewals and
//!   state change events.
//! - [`protocol`] holds discovery, descriptor retrieval, action invocation
//!   and GENA eventing, each as receiving and sending halves.
//!
//! # Example
//!
//! ```rust,no_run
//! use upnp_engine::{EngineConfig, RegistryEvent, SearchTarget, UpnpService};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = UpnpService::start(EngineConfig::control_point()).await?;
//! let mut events = service.registry().subscribe();
//!
//! service.control_point().search(SearchTarget::All).await?;
//! while let Ok(event) = events.recv().await {
//!     if let RegistryEvent::RemoteDeviceAdded(device) = event {
//!         println!("{} at {:?}", device.details.friendly_name, device.remote_identity());
//!     }
//! }
//!
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Everything logs through `tracing`; see [`logging`] for a ready-made
//! subscriber. Peers breaking protocol rules are reported on the
//! [`logging::VIOLATION_TARGET`] target.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod header;
pub mod local;
pub mod logging;
pub mod model;
pub mod namespace;
pub mod protocol;
pub mod registry;
pub mod router;
mod service;

pub use config::{EngineConfig, ServiceTypeFilter};
pub use descriptor::{DescriptorBinder, Uda10DescriptorBinder};
pub use error::{
    ActionError, ConfigError, DescriptorError, EngineError, ErrorCode, RegistrationError, Result,
    RouterError, SubscriptionError,
};
pub use header::{SearchTarget, Timeout, Usn};
pub use local::{ActionExecutor, LocalDevice, LocalServiceBinding, ServiceState};
pub use model::*;
pub use namespace::Namespace;
pub use registry::{MaintenanceWork, RefreshOutcome, Registry, RegistryEvent};
pub use router::{DatagramTransport, Router};
pub use service::{ControlPoint, SubscriptionHandle, Transports, UpnpService};
