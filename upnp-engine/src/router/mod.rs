//! Message routing between the transports and the protocols.
//!
//! The [`Router`] is the hub of the engine. Inbound datagrams and stream
//! requests are classified by the [`ProtocolFactory`] and run on the
//! [`WorkerPool`]; protocols send through the router, which applies retries
//! and a per-host cooldown to stream requests.
//!
//! ```text
//! SsdpSocket ──► received_datagram ──┐
//!                                    ├─► ProtocolFactory ─► WorkerPool
//! StreamServer ─► received_stream ───┘                         │
//!                                                              ▼
//! DatagramTransport ◄─ send_datagram ◄──────────────── protocol tasks
//! StreamClient ◄────── send_stream ◄───────────────────────────┘
//! ```

mod pool;
mod transport;

pub use pool::WorkerPool;
pub use transport::DatagramTransport;
pub(crate) use transport::spawn_listener;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use stream_transport::{
    Method, RequestHandler, StatusCode, StreamClient, StreamRequest, StreamResponse,
    TransportError,
};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use upnp_ssdp::{IncomingDatagram, OutgoingDatagram};
use url::Url;

use crate::config::EngineConfig;
use crate::descriptor::DescriptorBinder;
use crate::error::RouterError;
use crate::model::{RemoteSubscription, ServiceReference, Udn};
use crate::namespace::Namespace;
use crate::protocol::{self, ProtocolFactory};
use crate::registry::Registry;

/// Routes messages and owns the shared plumbing protocols need.
pub struct Router {
    config: EngineConfig,
    registry: Arc<Registry>,
    binder: Arc<dyn DescriptorBinder>,
    namespace: Namespace,
    factory: ProtocolFactory,
    datagrams: Arc<dyn DatagramTransport>,
    streams: Arc<dyn StreamClient>,
    pool: WorkerPool,
    stream_base_url: RwLock<Option<String>>,
    /// Host to end of its cooldown
    cooldowns: DashMap<String, Instant>,
    /// Descriptor URLs being retrieved
    active_retrievals: DashSet<String>,
    enabled: AtomicBool,
}

impl Router {
    pub fn new(
        config: EngineConfig,
        registry: Arc<Registry>,
        binder: Arc<dyn DescriptorBinder>,
        namespace: Namespace,
        datagrams: Arc<dyn DatagramTransport>,
        streams: Arc<dyn StreamClient>,
    ) -> Arc<Self> {
        let pool = WorkerPool::start(config.worker_threads, config.worker_queue_capacity);
        let factory = ProtocolFactory::new(namespace.clone(), config.discovery_filter.clone());
        Arc::new(Self {
            config,
            registry,
            binder,
            namespace,
            factory,
            datagrams,
            streams,
            pool,
            stream_base_url: RwLock::new(None),
            cooldowns: DashMap::new(),
            active_retrievals: DashSet::new(),
            enabled: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn binder(&self) -> &dyn DescriptorBinder {
        self.binder.as_ref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Base URL of the stream server, e.g. `http://192.168.1.10:49152`.
    pub fn stream_base_url(&self) -> Option<String> {
        self.stream_base_url.read().clone()
    }

    pub fn set_stream_base_url(&self, base_url: Option<String>) {
        let base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        debug!(?base_url, "Stream base URL set");
        *self.stream_base_url.write() = base_url;
    }

    /// Absolute URL of a path of ours.
    pub(crate) fn local_url(&self, path: &str) -> Result<Url, RouterError> {
        let base = self.stream_base_url().ok_or(RouterError::NoStreamServer)?;
        Url::parse(&format!("{}{}", base, path)).map_err(|_| RouterError::NoStreamServer)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stop routing; inbound messages are dropped, sends fail.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            debug!("Router disabled");
        }
    }

    /// Let queued tasks finish within `grace`, then stop the pool.
    pub async fn shutdown_pool(&self, grace: Duration) {
        self.pool.shutdown(grace).await;
    }

    /// Queue a task on the worker pool.
    pub(crate) fn submit<F>(&self, name: &str, task: F) -> Result<(), RouterError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if !self.is_enabled() {
            return Err(RouterError::Disabled);
        }
        self.pool.submit(name, task)
    }

    /// Send a datagram.
    pub async fn send_datagram(&self, datagram: OutgoingDatagram) -> Result<(), RouterError> {
        if !self.is_enabled() {
            return Err(RouterError::Disabled);
        }
        self.datagrams.send(&datagram).await?;
        Ok(())
    }

    /// Send a stream request, retrying network failures with exponential
    /// backoff. A host that still fails afterwards is put on cooldown and
    /// requests to it fail fast until the cooldown ends.
    pub async fn send_stream(&self, request: StreamRequest) -> Result<StreamResponse, RouterError> {
        if !self.is_enabled() {
            return Err(RouterError::Disabled);
        }

        let host = host_key(&request.uri);
        // Copy out before removing, the entry guard holds the shard lock
        let cooling_until = self.cooldowns.get(&host).map(|entry| *entry.value());
        if let Some(until) = cooling_until {
            if Instant::now() < until {
                trace!(%host, "Host cooling down, not sending");
                return Err(RouterError::CoolingDown(host));
            }
            self.cooldowns.remove(&host);
        }

        let attempts = self.config.retry_attempts;
        let mut backoff = self.config.retry_cooldown;
        let mut attempt = 0;
        loop {
            trace!(%request, attempt, "Sending stream request");
            match self.streams.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e @ TransportError::InvalidRequest(_)) => return Err(e.into()),
                Err(e) if attempt >= attempts || !self.is_enabled() => {
                    warn!(
                        %host,
                        attempts = attempt + 1,
                        error = %e,
                        "Stream request failed, cooling down host"
                    );
                    self.cooldowns
                        .insert(host, Instant::now() + self.config.retry_cooldown);
                    return Err(e.into());
                }
                Err(e) => {
                    debug!(%host, attempt, error = %e, ?backoff, "Stream request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// Handle an inbound datagram asynchronously.
    pub fn received_datagram(self: &Arc<Self>, datagram: IncomingDatagram) {
        if !self.is_enabled() {
            return;
        }

        match self.factory.create_receiving_datagram(datagram) {
            Ok(Some(protocol)) => {
                let router = self.clone();
                let name = protocol.name();
                if let Err(e) = self.submit(name, protocol.run(router)) {
                    debug!(error = %e, "Dropped inbound datagram");
                }
            }
            Ok(None) => {}
            Err(e) => trace!(error = %e, "Ignoring datagram"),
        }
    }

    /// Handle an inbound stream request and produce its response.
    ///
    /// The protocol runs on the worker pool; a full queue answers 503.
    pub async fn received_stream(self: &Arc<Self>, request: StreamRequest) -> StreamResponse {
        if !self.is_enabled() {
            return StreamResponse::new(StatusCode::SERVICE_UNAVAILABLE);
        }
        if let Method::Other(method) = &request.method {
            debug!(%method, path = request.path(), "Unsupported HTTP method");
            return StreamResponse::new(StatusCode::METHOD_NOT_ALLOWED);
        }

        let protocol = match self.factory.create_receiving_stream(request) {
            Ok(protocol) => protocol,
            Err(e) => {
                debug!(error = %e, "No protocol for stream request");
                return StreamResponse::new(StatusCode::NOT_FOUND);
            }
        };

        let (reply, response) = oneshot::channel();
        let router = self.clone();
        let name = protocol.name();
        let task = async move {
            let outcome = protocol.run(router).await;
            let _ = reply.send(outcome.response);
            if let Some(follow_up) = outcome.follow_up {
                follow_up.await;
            }
        };

        if let Err(e) = self.submit(name, task) {
            debug!(error = %e, "Rejecting stream request");
            return StreamResponse::new(StatusCode::SERVICE_UNAVAILABLE);
        }
        response
            .await
            .unwrap_or_else(|_| StreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR))
    }

    /// Queue a GENA event with `properties` for every subscriber of a local
    /// service.
    pub fn propagate_state_changes(
        self: &Arc<Self>,
        service: &ServiceReference,
        properties: Vec<(String, String)>,
    ) {
        if properties.is_empty() {
            return;
        }
        for subscription in self.registry.local_subscriptions_of(service) {
            subscription.lane.push(properties.clone());
            let router = self.clone();
            let sid = subscription.sid.clone();
            if let Err(e) = self.submit(
                "SendingEvent",
                protocol::gena::sending::send_event(router, sid),
            ) {
                warn!(sid = %subscription.sid, error = %e, "Could not queue event");
            }
        }
    }

    /// Start descriptor retrieval for an advertised device.
    pub(crate) fn retrieve_remote_device(
        self: &Arc<Self>,
        udn: Udn,
        location: Url,
        max_age: u32,
        discovered_on: Option<std::net::IpAddr>,
    ) {
        let key = location.to_string();
        if self.active_retrievals.contains(&key) {
            trace!(%location, "Descriptor retrieval already running");
            return;
        }
        let task = protocol::retrieval::retrieve_remote_descriptors(
            self.clone(),
            udn,
            location,
            max_age,
            discovered_on,
        );
        if let Err(e) = self.submit("RetrieveRemoteDescriptors", task) {
            debug!(error = %e, "Could not queue descriptor retrieval");
        }
    }

    /// Claim a descriptor URL for retrieval; `false` if already claimed.
    pub(crate) fn begin_retrieval(&self, location: &Url) -> bool {
        self.active_retrievals.insert(location.to_string())
    }

    pub(crate) fn end_retrieval(&self, location: &Url) {
        self.active_retrievals.remove(location.as_str());
    }

    /// One maintenance sweep: expire registry entries and queue the
    /// periodic work that is due.
    pub fn maintain(self: &Arc<Self>) {
        if !self.is_enabled() {
            return;
        }
        self.cooldowns.retain(|_, until| *until > Instant::now());

        let work = self.registry.maintain(Instant::now());
        if work.is_empty() {
            return;
        }

        for device in work.alive {
            let router = self.clone();
            let task = async move {
                protocol::discovery::send_alive(&router, &device).await;
            };
            if let Err(e) = self.submit("SendingNotificationAlive", task) {
                debug!(error = %e, "Could not queue ALIVE");
            }
        }

        for subscription in work.renewals {
            self.queue_renewal(subscription);
        }

        for (service, properties) in work.state_changes {
            self.propagate_state_changes(&service, properties);
        }
    }

    fn queue_renewal(self: &Arc<Self>, subscription: RemoteSubscription) {
        let router = self.clone();
        let sid = subscription.sid.clone();
        let task = async move {
            protocol::gena::sending::renew(&router, subscription).await;
        };
        if let Err(e) = self.submit("SendingRenewal", task) {
            warn!(%sid, error = %e, "Could not queue renewal");
        }
    }
}

fn next_backoff(backoff: Duration) -> Duration {
    backoff.saturating_mul(2)
}

/// `host:port` of an absolute URL, the cooldown key.
fn host_key(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) => format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        ),
        Err(_) => uri.to_string(),
    }
}

/// Serves the stream server's requests through a router.
pub struct RouterRequestHandler(pub Arc<Router>);

#[async_trait]
impl RequestHandler for RouterRequestHandler {
    async fn handle(&self, request: StreamRequest) -> StreamResponse {
        self.0.received_stream(request).await
    }
}
