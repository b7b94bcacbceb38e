//! Inbound GENA requests.
//!
//! SUBSCRIBE and UNSUBSCRIBE arrive on the event path of a local service;
//! NOTIFY arrives on the callback path of one of our remote subscriptions.

use std::sync::Arc;

use futures::FutureExt;
use stream_transport::{StatusCode, StreamRequest, StreamResponse};
use tracing::{debug, info, trace, warn};

use super::{CALLBACK, NT, NTS, SEQ, SERVER, SID, TIMEOUT};
use crate::header::{parse_callback, parse_seq, Timeout, GENA_EVENT_NT};
use crate::logging::VIOLATION_TARGET;
use crate::model::{
    LocalSubscription, NotificationSubtype, SequenceCheck, ServiceReference,
    SubscriptionEndReason, SubscriptionEvent, Value,
};
use crate::namespace::Resource;
use crate::protocol::StreamOutcome;
use crate::router::Router;

use super::sending::send_event;

fn status(code: StatusCode) -> StreamResponse {
    StreamResponse::new(code)
}

/// Service addressed by an event subscription path, if it is ours.
fn subscribed_service(router: &Router, request: &StreamRequest) -> Option<ServiceReference> {
    match router.namespace().resolve(request.path()) {
        Some(Resource::EventSubscription(reference)) => router
            .registry()
            .local_service(&reference)
            .map(|_| reference),
        _ => None,
    }
}

fn granted_timeout(router: &Router, requested: Option<Timeout>) -> Timeout {
    let config = router.config();
    match requested {
        Some(Timeout::Seconds(seconds)) if !config.received_subscription_timeout_ignored => {
            Timeout::Seconds(config.clamp_granted_subscription_timeout(seconds))
        }
        _ => Timeout::Seconds(config.default_subscription_timeout),
    }
}

fn subscribed(router: &Router, sid: &str, timeout: Timeout) -> StreamResponse {
    StreamResponse::ok()
        .with_header(SID, sid)
        .with_header(TIMEOUT, &timeout.to_string())
        .with_header(SERVER, &router.config().server_name)
}

/// Answer a new subscription or a renewal on a local service.
///
/// A new subscriber gets the initial event, SEQ 0 with every evented
/// variable, once the response is out.
pub(crate) fn receive_subscribe(router: Arc<Router>, request: StreamRequest) -> StreamOutcome {
    let Some(reference) = subscribed_service(&router, &request) else {
        return StreamOutcome::respond(status(StatusCode::NOT_FOUND));
    };
    let requested = request.header(TIMEOUT).and_then(Timeout::parse);

    if let Some(sid) = request.header(SID) {
        if request.header(CALLBACK).is_some() || request.header(NT).is_some() {
            debug!(%sid, "Renewal carries CALLBACK or NT");
            return StreamOutcome::respond(status(StatusCode::BAD_REQUEST));
        }
        let timeout = granted_timeout(&router, requested);
        let renewed = router
            .registry()
            .local_subscription(sid)
            .filter(|subscription| subscription.service == reference)
            .and_then(|_| router.registry().renew_local_subscription(sid, timeout));
        return StreamOutcome::respond(match renewed {
            Some(subscription) => {
                debug!(sid = %subscription.sid, %timeout, "Local subscription renewed");
                subscribed(&router, &subscription.sid, timeout)
            }
            None => {
                debug!(%sid, "Renewal of unknown or expired subscription");
                status(StatusCode::PRECONDITION_FAILED)
            }
        });
    }

    if request.header(NT).map(str::trim) != Some(GENA_EVENT_NT) {
        return StreamOutcome::respond(status(StatusCode::PRECONDITION_FAILED));
    }
    let callback_urls = request.header(CALLBACK).map(parse_callback).unwrap_or_default();
    if callback_urls.is_empty() {
        debug!(service = %reference, "SUBSCRIBE without usable callback URL");
        return StreamOutcome::respond(status(StatusCode::PRECONDITION_FAILED));
    }
    let Some((service, binding)) = router.registry().local_service(&reference) else {
        return StreamOutcome::respond(status(StatusCode::NOT_FOUND));
    };
    if service.evented_state_variables().next().is_none() {
        debug!(service = %reference, "SUBSCRIBE to a service without evented variables");
        return StreamOutcome::respond(status(StatusCode::PRECONDITION_FAILED));
    }

    let timeout = granted_timeout(&router, requested);
    let subscription = LocalSubscription::new(reference, callback_urls, timeout);
    let sid = subscription.sid.clone();
    subscription.lane.push(binding.state.evented_values());
    router.registry().add_local_subscription(subscription.clone());

    info!(
        %sid,
        service = %subscription.service,
        callbacks = subscription.callback_urls.len(),
        %timeout,
        "Accepted subscription"
    );
    let response = subscribed(&router, &sid, timeout);
    StreamOutcome::then(response, send_event(router, sid).boxed())
}

/// Cancel a subscription on a local service.
pub(crate) fn receive_unsubscribe(router: &Router, request: StreamRequest) -> StreamResponse {
    let Some(reference) = subscribed_service(router, &request) else {
        return status(StatusCode::NOT_FOUND);
    };
    let Some(sid) = request.header(SID) else {
        return status(StatusCode::PRECONDITION_FAILED);
    };
    if request.header(CALLBACK).is_some() || request.header(NT).is_some() {
        return status(StatusCode::BAD_REQUEST);
    }

    let known = router
        .registry()
        .local_subscription(sid)
        .is_some_and(|subscription| subscription.service == reference);
    if !known {
        debug!(%sid, "UNSUBSCRIBE for unknown subscription");
        return status(StatusCode::PRECONDITION_FAILED);
    }
    router
        .registry()
        .remove_local_subscription(sid, SubscriptionEndReason::Unsubscribed);
    StreamResponse::ok()
}

/// Accept an event for one of our remote subscriptions and forward it to
/// the application.
pub(crate) async fn receive_event(router: &Router, request: StreamRequest) -> StreamResponse {
    let (Some(nt), Some(nts)) = (request.header(NT), request.header(NTS)) else {
        return status(StatusCode::BAD_REQUEST);
    };
    if nt.trim() != GENA_EVENT_NT
        || NotificationSubtype::parse(nts) != Some(NotificationSubtype::Propchange)
    {
        return status(StatusCode::PRECONDITION_FAILED);
    }
    let Some(sid) = request.header(SID).map(str::trim) else {
        return status(StatusCode::PRECONDITION_FAILED);
    };
    let Some(seq) = request.header(SEQ).and_then(parse_seq) else {
        return status(StatusCode::BAD_REQUEST);
    };

    let registry = router.registry();
    if registry
        .wait_remote_subscription(sid, router.config().stream_timeout)
        .await
        .is_none()
    {
        debug!(%sid, seq, "Event for unknown subscription");
        return status(StatusCode::PRECONDITION_FAILED);
    }

    let properties = match upnp_soap::read_property_set(&request.body) {
        Ok(properties) => properties,
        Err(e) => {
            warn!(%sid, seq, error = %e, "Unreadable event body");
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let Some((subscription, check)) = registry.advance_remote_sequence(sid, seq) else {
        return status(StatusCode::PRECONDITION_FAILED);
    };
    match check {
        SequenceCheck::InOrder => {}
        SequenceCheck::Skipped { expected } => warn!(
            target: VIOLATION_TARGET,
            %sid,
            seq,
            expected,
            "Event sequence skipped, applying anyway"
        ),
        SequenceCheck::Stale { last } => {
            warn!(
                target: VIOLATION_TARGET,
                %sid,
                seq,
                last,
                "Stale event sequence, dropping event"
            );
            return StreamResponse::ok();
        }
    }

    let service = registry.service(&subscription.service);
    let values = properties
        .into_iter()
        .map(|(name, raw)| {
            let value = service
                .as_ref()
                .and_then(|service| service.state_variable(&name))
                .and_then(|variable| variable.parse_value(&raw).ok())
                .unwrap_or(Value::Text(raw));
            (name, value)
        })
        .collect();

    trace!(%sid, seq, "Forwarding event");
    let event = SubscriptionEvent::Event { seq, values };
    if let Err(e) = subscription
        .events
        .send_timeout(event, router.config().stream_timeout)
        .await
    {
        debug!(%sid, seq, error = %e, "Application did not take the event");
    }
    StreamResponse::ok()
}
