//! UPnP protocols.
//!
//! Each inbound message maps to one receiving protocol, chosen by the
//! [`ProtocolFactory`]. Sending protocols are plain async functions the
//! router, the registry maintenance and the control point call directly.
//!
//! | Message                        | Protocol                          |
//! |--------------------------------|-----------------------------------|
//! | NOTIFY alive/update/byebye     | [`ReceivingDatagram::Notification`] |
//! | M-SEARCH                       | [`ReceivingDatagram::Search`]       |
//! | search response                | [`ReceivingDatagram::SearchResponse`] |
//! | GET                            | [`ReceivingStream::Retrieval`]      |
//! | POST on a control path         | [`ReceivingStream::Action`]         |
//! | SUBSCRIBE on an event path     | [`ReceivingStream::Subscribe`]      |
//! | UNSUBSCRIBE on an event path   | [`ReceivingStream::Unsubscribe`]    |
//! | NOTIFY on a callback path      | [`ReceivingStream::Event`]          |

pub mod action;
pub mod discovery;
pub mod gena;
pub mod retrieval;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use stream_transport::{Method, StreamRequest, StreamResponse};
use tracing::{debug, trace};
use upnp_ssdp::{IncomingDatagram, SsdpMessage, StartLine};

use crate::config::ServiceTypeFilter;
use crate::error::ProtocolCreationError;
use crate::model::{NamedServiceType, NotificationSubtype};
use crate::namespace::Namespace;
use crate::router::Router;

/// Protocol for an inbound datagram.
#[derive(Debug)]
pub enum ReceivingDatagram {
    /// NOTIFY alive, update or byebye
    Notification(IncomingDatagram),
    /// M-SEARCH
    Search(IncomingDatagram),
    /// Unicast answer to one of our searches
    SearchResponse(IncomingDatagram),
}

impl ReceivingDatagram {
    pub fn name(&self) -> &'static str {
        match self {
            ReceivingDatagram::Notification(_) => "ReceivingNotification",
            ReceivingDatagram::Search(_) => "ReceivingSearch",
            ReceivingDatagram::SearchResponse(_) => "ReceivingSearchResponse",
        }
    }

    pub async fn run(self, router: Arc<Router>) {
        match self {
            ReceivingDatagram::Notification(datagram) => {
                discovery::receive_notification(&router, datagram)
            }
            ReceivingDatagram::Search(datagram) => {
                discovery::receive_search(&router, datagram).await
            }
            ReceivingDatagram::SearchResponse(datagram) => {
                discovery::receive_search_response(&router, datagram)
            }
        }
    }
}

/// Protocol for an inbound stream request.
#[derive(Debug)]
pub enum ReceivingStream {
    Retrieval(StreamRequest),
    Action(StreamRequest),
    Subscribe(StreamRequest),
    Unsubscribe(StreamRequest),
    Event(StreamRequest),
}

impl ReceivingStream {
    pub fn name(&self) -> &'static str {
        match self {
            ReceivingStream::Retrieval(_) => "ReceivingRetrieval",
            ReceivingStream::Action(_) => "ReceivingAction",
            ReceivingStream::Subscribe(_) => "ReceivingSubscribe",
            ReceivingStream::Unsubscribe(_) => "ReceivingUnsubscribe",
            ReceivingStream::Event(_) => "ReceivingEvent",
        }
    }

    pub async fn run(self, router: Arc<Router>) -> StreamOutcome {
        match self {
            ReceivingStream::Retrieval(request) => {
                StreamOutcome::respond(retrieval::receive_retrieval(&router, request))
            }
            ReceivingStream::Action(request) => action::receive_action(router, request).await,
            ReceivingStream::Subscribe(request) => gena::receiving::receive_subscribe(router, request),
            ReceivingStream::Unsubscribe(request) => {
                StreamOutcome::respond(gena::receiving::receive_unsubscribe(&router, request))
            }
            ReceivingStream::Event(request) => {
                StreamOutcome::respond(gena::receiving::receive_event(&router, request).await)
            }
        }
    }
}

/// Response of a receiving stream protocol, plus work to run once it is
/// handed back to the client.
pub struct StreamOutcome {
    pub response: StreamResponse,
    pub follow_up: Option<BoxFuture<'static, ()>>,
}

impl StreamOutcome {
    pub fn respond(response: StreamResponse) -> Self {
        Self {
            response,
            follow_up: None,
        }
    }

    pub fn then(response: StreamResponse, follow_up: BoxFuture<'static, ()>) -> Self {
        Self {
            response,
            follow_up: Some(follow_up),
        }
    }
}

impl fmt::Debug for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOutcome")
            .field("response", &self.response.status)
            .field("follow_up", &self.follow_up.is_some())
            .finish()
    }
}

/// Chooses the protocol for inbound messages.
#[derive(Debug, Clone)]
pub struct ProtocolFactory {
    namespace: Namespace,
    filter: ServiceTypeFilter,
}

impl ProtocolFactory {
    pub fn new(namespace: Namespace, filter: ServiceTypeFilter) -> Self {
        Self { namespace, filter }
    }

    /// Protocol for a datagram; `Ok(None)` for messages that are valid but
    /// of no interest, such as advertisements the discovery filter rejects.
    pub fn create_receiving_datagram(
        &self,
        datagram: IncomingDatagram,
    ) -> Result<Option<ReceivingDatagram>, ProtocolCreationError> {
        let message = &datagram.message;
        let wrap: fn(IncomingDatagram) -> ReceivingDatagram = match &message.start_line {
            StartLine::Notify => match message.nts().and_then(NotificationSubtype::parse) {
                Some(NotificationSubtype::Byebye) => {
                    if self.filter == ServiceTypeFilter::Disabled {
                        return Ok(None);
                    }
                    ReceivingDatagram::Notification
                }
                Some(NotificationSubtype::Alive | NotificationSubtype::Update) => {
                    if !self.is_supported_advertisement(message) {
                        trace!(usn = ?message.usn(), "Advertisement filtered");
                        return Ok(None);
                    }
                    ReceivingDatagram::Notification
                }
                _ => {
                    debug!(nts = ?message.nts(), "NOTIFY with unknown NTS");
                    return Ok(None);
                }
            },
            StartLine::MSearch => ReceivingDatagram::Search,
            StartLine::Response { .. } => {
                if !self.is_supported_advertisement(message) {
                    return Ok(None);
                }
                ReceivingDatagram::SearchResponse
            }
            StartLine::Other(line) => {
                return Err(ProtocolCreationError::UnsupportedDatagram(line.clone()))
            }
        };
        Ok(Some(wrap(datagram)))
    }

    /// Protocol for a stream request.
    pub fn create_receiving_stream(
        &self,
        mut request: StreamRequest,
    ) -> Result<ReceivingStream, ProtocolCreationError> {
        let path = request.path().to_string();
        let namespace = &self.namespace;

        let method = request.method.clone();
        let protocol = match method {
            Method::Get => ReceivingStream::Retrieval(request),
            Method::Post if namespace.is_control_path(&path) => ReceivingStream::Action(request),
            Method::Subscribe if namespace.is_event_subscription_path(&path) => {
                ReceivingStream::Subscribe(request)
            }
            Method::Unsubscribe if namespace.is_event_subscription_path(&path) => {
                ReceivingStream::Unsubscribe(request)
            }
            Method::Notify if namespace.is_event_callback_path(&path) => {
                ReceivingStream::Event(request)
            }
            Method::Notify => match namespace.truncate_after_callback_marker(&path) {
                Some(truncated) => {
                    debug!(%path, %truncated, "Truncated garbage after event callback path");
                    request.uri = truncated.to_string();
                    ReceivingStream::Event(request)
                }
                None => {
                    return Err(ProtocolCreationError::UnsupportedStream(format!(
                        "NOTIFY {}",
                        path
                    )))
                }
            },
            method => {
                return Err(ProtocolCreationError::UnsupportedStream(format!(
                    "{} {}",
                    method, path
                )))
            }
        };
        Ok(protocol)
    }

    fn is_supported_advertisement(&self, message: &SsdpMessage) -> bool {
        match &self.filter {
            ServiceTypeFilter::Disabled => false,
            ServiceTypeFilter::Any => true,
            ServiceTypeFilter::Only(types) if types.is_empty() => true,
            ServiceTypeFilter::Only(_) => message
                .usn()
                .and_then(|usn| usn.parse::<NamedServiceType>().ok())
                .map_or(false, |named| self.filter.accepts(&named.service_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceType;
    use rstest::rstest;
    use upnp_ssdp::header;

    fn datagram(message: SsdpMessage) -> IncomingDatagram {
        IncomingDatagram {
            message,
            source: "10.0.0.9:1900".parse().unwrap(),
            local_address: None,
        }
    }

    fn alive(usn: &str) -> IncomingDatagram {
        let mut message = SsdpMessage::notify();
        message.headers.add(header::NTS, "ssdp:alive");
        message.headers.add(header::USN, usn);
        datagram(message)
    }

    const SERVICE_USN: &str = "uuid:light-1::urn:schemas-upnp-org:service:SwitchPower:2";

    #[rstest]
    #[case(ServiceTypeFilter::Any, "uuid:light-1::upnp:rootdevice", true)]
    #[case(ServiceTypeFilter::Disabled, SERVICE_USN, false)]
    #[case(ServiceTypeFilter::Only(vec![]), "uuid:light-1", true)]
    #[case(ServiceTypeFilter::Only(vec![ServiceType::uda("SwitchPower", 1)]), SERVICE_USN, true)]
    #[case(ServiceTypeFilter::Only(vec![ServiceType::uda("SwitchPower", 3)]), SERVICE_USN, false)]
    #[case(ServiceTypeFilter::Only(vec![ServiceType::uda("SwitchPower", 1)]), "uuid:light-1::upnp:rootdevice", false)]
    fn test_alive_filtering(
        #[case] filter: ServiceTypeFilter,
        #[case] usn: &str,
        #[case] accepted: bool,
    ) {
        let factory = ProtocolFactory::new(Namespace::new(), filter);
        let protocol = factory.create_receiving_datagram(alive(usn)).unwrap();
        assert_eq!(protocol.is_some(), accepted);
    }

    #[test]
    fn test_byebye_passes_unless_disabled() {
        let mut message = SsdpMessage::notify();
        message.headers.add(header::NTS, "ssdp:byebye");
        message.headers.add(header::USN, "uuid:light-1::upnp:rootdevice");

        let factory = ProtocolFactory::new(
            Namespace::new(),
            ServiceTypeFilter::Only(vec![ServiceType::uda("Dimming", 1)]),
        );
        assert!(matches!(
            factory.create_receiving_datagram(datagram(message.clone())),
            Ok(Some(ReceivingDatagram::Notification(_)))
        ));

        let factory = ProtocolFactory::new(Namespace::new(), ServiceTypeFilter::Disabled);
        assert!(factory
            .create_receiving_datagram(datagram(message))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_callback_path_with_trailing_garbage() {
        let factory = ProtocolFactory::new(Namespace::new(), ServiceTypeFilter::Any);
        let request = StreamRequest::new(
            Method::Notify,
            "/dev/light-1/svc/upnp-org/SwitchPower/event/cbhttp://10.0.0.2/x",
        );
        match factory.create_receiving_stream(request) {
            Ok(ReceivingStream::Event(request)) => {
                assert_eq!(request.path(), "/dev/light-1/svc/upnp-org/SwitchPower/event/cb")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[rstest]
    #[case(Method::Post, "/dev/light-1/desc")]
    #[case(Method::Subscribe, "/dev/light-1/svc/upnp-org/SwitchPower/action")]
    #[case(Method::Notify, "/somewhere/else")]
    fn test_unsupported_streams(#[case] method: Method, #[case] path: &str) {
        let factory = ProtocolFactory::new(Namespace::new(), ServiceTypeFilter::Any);
        assert!(matches!(
            factory.create_receiving_stream(StreamRequest::new(method, path)),
            Err(ProtocolCreationError::UnsupportedStream(_))
        ));
    }
}
