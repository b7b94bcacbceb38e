//! Test helpers: an in-memory network of engines and a switch power device.
//!
//! Every node gets an address `10.0.0.<n>`, SSDP on port 1900 and a stream
//! server at `http://10.0.0.<n>:8080`. Datagrams are encoded and parsed on
//! the way, stream requests are handed straight to the target's router.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stream_transport::{
    RemoteClient, StreamClient, StreamRequest, StreamResponse, TransportError,
};
use tokio::sync::broadcast;
use upnp_engine::{
    Action, ActionArgument, ActionError, ActionExecutor, ActionInvocation, Datatype,
    DatagramTransport, Device, DeviceDetails, DeviceType, EngineConfig, LocalDevice,
    RegistryEvent, Router, ServiceId, ServiceReference, ServiceState, ServiceType,
    StateVariable, Transports, Udn, UpnpService, Value,
};
use upnp_ssdp::{IncomingDatagram, OutgoingDatagram, SsdpError, SsdpMessage};
use url::Url;

const STREAM_PORT: u16 = 8080;
const SSDP_PORT: u16 = 1900;

struct Node {
    ip: Ipv4Addr,
    router: Weak<Router>,
}

/// A shared medium connecting engines built with [`MemoryNetwork::node`].
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: Mutex<Vec<Node>>,
    datagrams: Mutex<Vec<(Ipv4Addr, OutgoingDatagram)>>,
    requests: Mutex<Vec<StreamRequest>>,
    unreachable: Mutex<Vec<Ipv4Addr>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start an engine on the next free address.
    pub fn node(self: &Arc<Self>, config: EngineConfig) -> UpnpService {
        let ip = Ipv4Addr::new(10, 0, 0, self.nodes.lock().len() as u8 + 1);
        let transports = Transports {
            datagrams: Arc::new(MemoryDatagrams {
                network: self.clone(),
                ip,
            }),
            streams: Arc::new(MemoryStreams {
                network: self.clone(),
            }),
            stream_base_url: Some(format!("http://{}:{}", ip, STREAM_PORT)),
        };
        let service = UpnpService::with_transports(config, transports)
            .expect("Failed to start engine on memory network");
        self.nodes.lock().push(Node {
            ip,
            router: Arc::downgrade(service.router()),
        });
        service
    }

    /// Drop every stream request addressed to `ip`.
    pub fn cut(&self, ip: Ipv4Addr) {
        self.unreachable.lock().push(ip);
    }

    pub fn sent_datagrams(&self) -> Vec<(Ipv4Addr, OutgoingDatagram)> {
        self.datagrams.lock().clone()
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }

    fn routers(&self) -> Vec<(Ipv4Addr, Arc<Router>)> {
        self.nodes
            .lock()
            .iter()
            .filter_map(|node| node.router.upgrade().map(|router| (node.ip, router)))
            .collect()
    }

    fn deliver_datagram(&self, from: Ipv4Addr, datagram: &OutgoingDatagram) {
        self.datagrams.lock().push((from, datagram.clone()));
        let encoded = datagram.message.encode();
        let Ok(message) = SsdpMessage::parse(encoded.as_bytes()) else {
            return;
        };

        let multicast = datagram.destination.ip().is_multicast();
        for (ip, router) in self.routers() {
            let addressed = if multicast {
                ip != from
            } else {
                datagram.destination.ip() == IpAddr::V4(ip)
            };
            if addressed {
                router.received_datagram(IncomingDatagram {
                    message: message.clone(),
                    source: SocketAddr::new(IpAddr::V4(from), SSDP_PORT),
                    local_address: Some(IpAddr::V4(ip)),
                });
            }
        }
    }

    async fn deliver_stream(
        &self,
        request: StreamRequest,
    ) -> Result<StreamResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let url = Url::parse(&request.uri)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let target: Ipv4Addr = url
            .host_str()
            .and_then(|host| host.parse().ok())
            .ok_or_else(|| TransportError::Network(format!("unknown host in {}", url)))?;
        if self.unreachable.lock().contains(&target) {
            return Err(TransportError::Network(format!("{} unreachable", target)));
        }

        let router = self
            .routers()
            .into_iter()
            .find(|(ip, _)| *ip == target)
            .map(|(_, router)| router)
            .ok_or_else(|| TransportError::Network(format!("connection refused by {}", target)))?;

        let mut inbound = request;
        inbound.uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        inbound.remote_client = Some(RemoteClient::new(None));
        inbound.local_address = Some(SocketAddr::new(IpAddr::V4(target), STREAM_PORT));
        Ok(router.received_stream(inbound).await)
    }
}

struct MemoryDatagrams {
    network: Arc<MemoryNetwork>,
    ip: Ipv4Addr,
}

#[async_trait]
impl DatagramTransport for MemoryDatagrams {
    async fn send(&self, datagram: &OutgoingDatagram) -> Result<(), SsdpError> {
        self.network.deliver_datagram(self.ip, datagram);
        Ok(())
    }
}

struct MemoryStreams {
    network: Arc<MemoryNetwork>,
}

#[async_trait]
impl StreamClient for MemoryStreams {
    async fn send(&self, request: StreamRequest) -> stream_transport::Result<StreamResponse> {
        self.network.deliver_stream(request).await
    }
}

/// Config with short retries so failure paths finish quickly.
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_workers(8, 64)
        .with_retry(1, Duration::from_millis(20))
        .with_maintenance_interval(Duration::from_millis(50))
        .with_granted_subscription_timeout_range(1, 3600)
}

pub fn switch_power_reference(udn: &Udn) -> ServiceReference {
    ServiceReference::new(udn.clone(), ServiceId::uda("SwitchPower"))
}

/// Sets `Target` and mirrors it into the evented `Status`.
pub struct SwitchPowerExecutor;

#[async_trait]
impl ActionExecutor for SwitchPowerExecutor {
    async fn execute(
        &self,
        invocation: &mut ActionInvocation,
        state: &ServiceState,
    ) -> Result<(), ActionError> {
        match invocation.action().name() {
            "SetTarget" => {
                let target = invocation
                    .input("NewTargetValue")
                    .cloned()
                    .unwrap_or(Value::Boolean(false));
                state.set("Target", target.clone())?;
                state.set("Status", target)?;
            }
            "GetStatus" => {
                let status = state.get("Status").unwrap_or(Value::Boolean(false));
                invocation.set_output("ResultStatus", status)?;
            }
            "GetTarget" => {
                let target = state.get("Target").unwrap_or(Value::Boolean(false));
                invocation.set_output("RetTargetValue", target)?;
            }
            _ => {}
        }
        Ok(())
    }
}

pub fn switch_power_device(udn: Udn) -> LocalDevice {
    let service = upnp_engine::Service::new(
        ServiceType::uda("SwitchPower", 1),
        ServiceId::uda("SwitchPower"),
    )
    .with_state_variable(StateVariable::new("Target", Datatype::Boolean))
    .with_state_variable(StateVariable::new("Status", Datatype::Boolean).evented())
    .with_action(Action::new(
        "SetTarget",
        vec![ActionArgument::input("NewTargetValue", "Target")],
    ))
    .with_action(Action::new(
        "GetTarget",
        vec![ActionArgument::output("RetTargetValue", "Target").as_return_value()],
    ))
    .with_action(Action::new(
        "GetStatus",
        vec![ActionArgument::output("ResultStatus", "Status").as_return_value()],
    ));

    let device = Device::local(
        udn.clone(),
        DeviceType::uda("BinaryLight", 1),
        DeviceDetails {
            friendly_name: "Kitchen Light".to_string(),
            manufacturer: "upnp-sdk".to_string(),
            model_name: "BinaryLight".to_string(),
            ..Default::default()
        },
    )
    .with_service(service);

    LocalDevice::new(device).with_executor(switch_power_reference(&udn), SwitchPowerExecutor)
}

pub fn dimming_reference(udn: &Udn) -> ServiceReference {
    ServiceReference::new(udn.clone(), ServiceId::uda("Dimming"))
}

/// A dimmable light whose `Dimming` service has two evented variables.
pub fn dimmable_light_device(udn: Udn) -> LocalDevice {
    let service = upnp_engine::Service::new(ServiceType::uda("Dimming", 1), ServiceId::uda("Dimming"))
        .with_state_variable(
            StateVariable::new("LoadLevelTarget", Datatype::Ui1).with_allowed_range(0.0, 100.0, None),
        )
        .with_state_variable(
            StateVariable::new("LoadLevelStatus", Datatype::Ui1)
                .evented()
                .with_default("0"),
        )
        .with_state_variable(StateVariable::new("IsRamping", Datatype::Boolean).evented())
        .with_action(Action::new(
            "SetLoadLevelTarget",
            vec![ActionArgument::input("newLoadlevelTarget", "LoadLevelTarget")],
        ));

    let device = Device::local(
        udn,
        DeviceType::uda("DimmableLight", 1),
        DeviceDetails {
            friendly_name: "Hall Dimmer".to_string(),
            manufacturer: "upnp-sdk".to_string(),
            model_name: "DimmableLight".to_string(),
            ..Default::default()
        },
    )
    .with_service(service);

    LocalDevice::new(device)
}

/// Next registry event matching `predicate`, within two seconds.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<RegistryEvent>, mut predicate: F) -> RegistryEvent
where
    F: FnMut(&RegistryEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("Registry event channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for registry event")
}
