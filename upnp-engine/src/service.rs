//! The engine facade.
//!
//! [`UpnpService`] wires transports, registry, router and the maintenance
//! loop together and owns their lifetimes. [`ControlPoint`] is the
//! application's handle for searching, invoking actions and subscribing.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stream_transport::{HttpStreamClient, StreamClient, StreamServer, StreamServerConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use upnp_ssdp::SsdpSocket;

use crate::config::EngineConfig;
use crate::descriptor::{DescriptorBinder, Uda10DescriptorBinder};
use crate::error::{ActionError, EngineError, ErrorCode, Result, RouterError, SubscriptionError};
use crate::header::{SearchTarget, Timeout};
use crate::local::LocalDevice;
use crate::model::{
    ActionInvocation, Device, RemoteSubscription, Service, ServiceReference, SubscriptionEvent,
    Udn, Value,
};
use crate::namespace::Namespace;
use crate::protocol::{action, discovery, gena};
use crate::registry::{MaintenanceLoop, Registry};
use crate::router::{spawn_listener, DatagramTransport, Router, RouterRequestHandler};

/// Capacity of a subscription's event channel.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 64;

/// Time queued tasks get to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Transports for [`UpnpService::with_transports`].
pub struct Transports {
    pub datagrams: Arc<dyn DatagramTransport>,
    pub streams: Arc<dyn StreamClient>,
    /// Base URL local devices and callbacks are reachable at, if any
    pub stream_base_url: Option<String>,
}

/// A running UPnP stack.
pub struct UpnpService {
    registry: Arc<Registry>,
    router: Arc<Router>,
    maintenance: Mutex<Option<MaintenanceLoop>>,
    server: Mutex<Option<StreamServer>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl UpnpService {
    /// Bind the SSDP sockets and the stream server and start maintenance.
    pub async fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let interface = match config.bind_address {
            IpAddr::V4(address) => address,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };
        let multicast = Arc::new(
            SsdpSocket::multicast(interface)
                .map_err(|e| EngineError::TransportInit(format!("SSDP multicast: {}", e)))?,
        );
        let unicast = Arc::new(
            SsdpSocket::unicast(interface)
                .map_err(|e| EngineError::TransportInit(format!("SSDP unicast: {}", e)))?,
        );
        let client = HttpStreamClient::new(config.stream_timeout, config.server_name.clone())
            .map_err(|e| EngineError::TransportInit(format!("HTTP client: {}", e)))?;

        let server_config = StreamServerConfig {
            bind_address: config.bind_address,
            port_range: config.stream_port_range,
            ..Default::default()
        };
        let service = Self::assemble(
            config,
            Arc::new(Uda10DescriptorBinder),
            unicast.clone(),
            Arc::new(client),
        );

        let handler = Arc::new(RouterRequestHandler(service.router.clone()));
        let server = StreamServer::bind(server_config, handler)
            .await
            .map_err(|e| EngineError::TransportInit(format!("Stream server: {}", e)))?;
        service
            .router
            .set_stream_base_url(Some(server.base_url().to_string()));
        info!(base_url = server.base_url(), "UPnP service started");
        *service.server.lock() = Some(server);

        let weak = Arc::downgrade(&service.router);
        service.listeners.lock().extend([
            spawn_listener("multicast", multicast, weak.clone()),
            spawn_listener("unicast", unicast, weak),
        ]);
        Ok(service)
    }

    /// Run on caller-supplied transports. Nothing is bound; inbound traffic
    /// is fed through [`Router::received_datagram`] and
    /// [`Router::received_stream`].
    pub fn with_transports(config: EngineConfig, transports: Transports) -> Result<Self> {
        config.validate()?;
        let service = Self::assemble(
            config,
            Arc::new(Uda10DescriptorBinder),
            transports.datagrams,
            transports.streams,
        );
        service
            .router
            .set_stream_base_url(transports.stream_base_url);
        Ok(service)
    }

    fn assemble(
        config: EngineConfig,
        binder: Arc<dyn DescriptorBinder>,
        datagrams: Arc<dyn DatagramTransport>,
        streams: Arc<dyn StreamClient>,
    ) -> Self {
        let period = config.maintenance_interval;
        let registry = Arc::new(Registry::new(&config));
        let router = Router::new(
            config,
            registry.clone(),
            binder,
            Namespace::new(),
            datagrams,
            streams,
        );
        let maintenance = MaintenanceLoop::start(router.clone(), period);

        Self {
            registry,
            router,
            maintenance: Mutex::new(Some(maintenance)),
            server: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn control_point(&self) -> ControlPoint {
        ControlPoint {
            router: self.router.clone(),
        }
    }

    /// Publish a local device and announce it.
    pub async fn add_local_device(&self, device: LocalDevice) -> Result<Arc<Device>> {
        let device = self.registry.add_local_device(device)?;
        discovery::send_alive(&self.router, &device).await;
        Ok(device)
    }

    /// Withdraw a local device; subscriptions on its services end.
    pub async fn remove_local_device(&self, udn: &Udn) -> Option<Arc<Device>> {
        if !self.registry.is_local_udn(udn) {
            return None;
        }
        let device = self.registry.remove_device(udn)?;
        discovery::send_byebye(&self.router, &device).await;
        Some(device)
    }

    /// Change a state variable of a local service. Subscribers are sent the
    /// new value if the variable is evented.
    pub fn set_state_variable(
        &self,
        service: &ServiceReference,
        name: &str,
        value: impl Into<Value>,
    ) -> std::result::Result<(), ActionError> {
        let (_, binding) = self.registry.local_service(service).ok_or_else(|| {
            ActionError::new(
                ErrorCode::ArgumentValueInvalid,
                format!("No local service {}", service),
            )
        })?;
        binding.state.set(name, value)?;
        self.router
            .propagate_state_changes(service, binding.state.take_changes());
        Ok(())
    }

    /// Stop the stack. Remote subscriptions are left to expire.
    pub async fn shutdown(self) -> Result<()> {
        self.stop(false).await
    }

    /// Stop the stack, cancelling every remote subscription first.
    pub async fn shutdown_with_unsubscribe(self) -> Result<()> {
        self.stop(true).await
    }

    async fn stop(self, unsubscribe: bool) -> Result<()> {
        if unsubscribe {
            for subscription in self.registry.remote_subscriptions() {
                if let Err(e) = gena::sending::unsubscribe(&self.router, &subscription).await {
                    debug!(sid = %subscription.sid, error = %e, "Unsubscribe on shutdown failed");
                }
            }
        }

        for device in self.registry.shutdown() {
            discovery::send_byebye(&self.router, &device).await;
        }

        for listener in self.listeners.lock().drain(..) {
            listener.abort();
        }
        let server = self.server.lock().take();
        if let Some(server) = server {
            server.shutdown().await;
        }

        self.router.shutdown_pool(SHUTDOWN_GRACE).await;
        self.router.disable();

        let maintenance = self.maintenance.lock().take();
        let stopped = match maintenance {
            Some(maintenance) => maintenance.shutdown().await,
            None => Ok(()),
        };
        self.registry.clear();
        info!("UPnP service stopped");
        stopped
    }
}

/// Application handle for discovery, control and eventing.
#[derive(Clone)]
pub struct ControlPoint {
    router: Arc<Router>,
}

impl ControlPoint {
    /// Multicast an M-SEARCH; answers show up as registry events.
    pub async fn search(&self, target: SearchTarget) -> std::result::Result<(), RouterError> {
        discovery::send_search(&self.router, &target, self.router.config().search_mx).await
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.router.registry().remote_devices()
    }

    /// Invoke an action on a remote service.
    pub async fn execute(
        &self,
        invocation: ActionInvocation,
    ) -> std::result::Result<ActionInvocation, ActionError> {
        action::execute(&self.router, invocation).await
    }

    /// Subscribe to a remote service's events.
    pub async fn subscribe(
        &self,
        service: &Service,
        timeout: Timeout,
    ) -> std::result::Result<SubscriptionHandle, SubscriptionError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        let subscription = gena::sending::subscribe(&self.router, service, timeout, tx).await?;
        Ok(SubscriptionHandle {
            subscription,
            events: rx,
        })
    }

    /// Cancel a subscription; it ends locally whatever the publisher says.
    pub async fn unsubscribe(
        &self,
        handle: &SubscriptionHandle,
    ) -> std::result::Result<(), SubscriptionError> {
        let subscription = self
            .router
            .registry()
            .remote_subscription(handle.sid())
            .ok_or_else(|| SubscriptionError::NotFound(handle.sid().to_string()))?;
        gena::sending::unsubscribe(&self.router, &subscription).await
    }
}

/// An active remote subscription and its event stream.
#[derive(Debug)]
pub struct SubscriptionHandle {
    subscription: RemoteSubscription,
    events: mpsc::Receiver<SubscriptionEvent>,
}

impl SubscriptionHandle {
    pub fn sid(&self) -> &str {
        &self.subscription.sid
    }

    pub fn service(&self) -> &ServiceReference {
        &self.subscription.service
    }

    /// Next event; `None` once the subscription is gone and drained.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for UpnpService {
    fn drop(&mut self) {
        let listeners = self.listeners.get_mut();
        if !listeners.is_empty() {
            warn!("UpnpService dropped without shutdown");
            for listener in listeners.drain(..) {
                listener.abort();
            }
        }
        self.router.disable();
    }
}
