//! Outgoing GENA requests.

use std::sync::Arc;

use stream_transport::{Method, StatusCode, StreamRequest};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{CALLBACK, EVENT_CONTENT_TYPE, NT, NTS, SEQ, SID, TIMEOUT};
use crate::error::SubscriptionError;
use crate::header::{callback_value, parse_sid, Timeout, GENA_EVENT_NT};
use crate::model::{
    next_sequence, LocalSubscription, NotificationSubtype, RemoteSubscription, Service,
    SubscriptionEndReason, SubscriptionEvent,
};
use crate::router::Router;

fn with_subscription_headers(router: &Router, mut request: StreamRequest) -> StreamRequest {
    for (name, value) in &router.config().event_subscription_headers {
        request = request.with_header(name, value);
    }
    request
}

/// Subscribe to a remote service; events are forwarded to `events`.
///
/// [`SubscriptionEvent::Established`] is sent before the subscription can
/// receive its first event.
pub async fn subscribe(
    router: &Router,
    service: &Service,
    requested: Timeout,
    events: mpsc::Sender<SubscriptionEvent>,
) -> Result<RemoteSubscription, SubscriptionError> {
    let reference = service.reference();
    let endpoints = service
        .endpoints
        .as_ref()
        .ok_or_else(|| SubscriptionError::ServiceNotFound(reference.to_string()))?;
    let callback = router.local_url(&router.namespace().event_callback_path(&reference))?;

    // Events racing the response wait for this guard
    let _pending = router.registry().pending_subscription();

    let request = StreamRequest::new(Method::Subscribe, endpoints.event_subscription_url.as_str())
        .with_header(CALLBACK, &callback_value(callback.as_str()))
        .with_header(NT, GENA_EVENT_NT)
        .with_header(TIMEOUT, &requested.to_string());
    let request = with_subscription_headers(router, request);

    let response = router.send_stream(request).await?;
    if response.status != StatusCode::OK {
        debug!(service = %reference, status = %response.status, "SUBSCRIBE rejected");
        return Err(SubscriptionError::Rejected(response.status.as_u16()));
    }
    let sid = response
        .header(SID)
        .and_then(parse_sid)
        .ok_or_else(|| SubscriptionError::InvalidResponse("missing or invalid SID".to_string()))?;
    let timeout = response
        .header(TIMEOUT)
        .and_then(Timeout::parse)
        .ok_or_else(|| {
            SubscriptionError::InvalidResponse("missing or invalid TIMEOUT".to_string())
        })?;

    let subscription = RemoteSubscription {
        sid: sid.clone(),
        service: reference,
        event_subscription_url: endpoints.event_subscription_url.clone(),
        timeout,
        last_sequence: None,
        renewing: false,
        events,
    };
    let _ = subscription
        .events
        .send(SubscriptionEvent::Established {
            sid: sid.clone(),
            timeout,
        })
        .await;
    router.registry().add_remote_subscription(subscription.clone());

    info!(%sid, service = %subscription.service, %timeout, "Subscribed");
    Ok(subscription)
}

/// Renew a remote subscription; a failed renewal ends it.
pub async fn renew(router: &Router, subscription: RemoteSubscription) {
    let sid = subscription.sid.as_str();
    let request = StreamRequest::new(Method::Subscribe, subscription.event_subscription_url.as_str())
        .with_header(SID, sid)
        .with_header(TIMEOUT, &subscription.timeout.to_string());
    let request = with_subscription_headers(router, request);

    let failure = match router.send_stream(request).await {
        Ok(response) if response.status == StatusCode::OK => {
            let granted = response
                .header(TIMEOUT)
                .and_then(Timeout::parse)
                .unwrap_or(subscription.timeout);
            if router.registry().renew_remote_subscription(sid, granted) {
                debug!(%sid, %granted, "Subscription renewed");
            }
            return;
        }
        Ok(response) => format!("publisher answered {}", response.status),
        Err(e) => e.to_string(),
    };

    warn!(%sid, reason = %failure, "Subscription renewal failed");
    router
        .registry()
        .remove_remote_subscription(sid, SubscriptionEndReason::RenewalFailed);
}

/// Cancel a remote subscription. It is removed locally whatever the
/// publisher answers.
pub async fn unsubscribe(
    router: &Router,
    subscription: &RemoteSubscription,
) -> Result<(), SubscriptionError> {
    let request =
        StreamRequest::new(Method::Unsubscribe, subscription.event_subscription_url.as_str())
            .with_header(SID, &subscription.sid);
    let request = with_subscription_headers(router, request);

    let result = router.send_stream(request).await;
    router
        .registry()
        .remove_remote_subscription(&subscription.sid, SubscriptionEndReason::Unsubscribed);

    match result {
        Ok(response) if response.status == StatusCode::OK => {
            debug!(sid = %subscription.sid, "Unsubscribed");
            Ok(())
        }
        Ok(response) => Err(SubscriptionError::Rejected(response.status.as_u16())),
        Err(e) => Err(e.into()),
    }
}

/// Deliver the queued events of a local subscription, in order.
///
/// Whoever holds the lane's sequence lock drains the queue; a task that
/// finds it empty has nothing left to do.
pub async fn send_event(router: Arc<Router>, sid: String) {
    let Some(subscription) = router.registry().local_subscription(&sid) else {
        return;
    };
    let lane = subscription.lane.clone();
    let mut sequence = lane.lock_sequence().await;

    while let Some(properties) = lane.pop() {
        let Some(current) = router.registry().local_subscription(&sid) else {
            trace!(%sid, "Subscription ended, dropping queued events");
            return;
        };

        let seq = *sequence;
        let body = upnp_soap::write_property_set(&properties);
        let delivered = deliver(&router, &current, seq, &body).await;
        *sequence = next_sequence(seq);

        let failures = router.registry().record_delivery(&sid, delivered);
        if let Some(failures) = failures {
            if failures > router.config().retry_attempts {
                warn!(%sid, failures, "Subscriber unreachable, ending subscription");
                router
                    .registry()
                    .remove_local_subscription(&sid, SubscriptionEndReason::DeliveryFailure);
                return;
            }
        }
    }
}

/// Try each callback URL in turn; `true` once one accepts.
async fn deliver(router: &Router, subscription: &LocalSubscription, seq: u32, body: &str) -> bool {
    for url in &subscription.callback_urls {
        let request = notify_request(url, &subscription.sid, seq, body);
        match router.send_stream(request).await {
            Ok(response) if response.status == StatusCode::OK => {
                trace!(sid = %subscription.sid, seq, %url, "Event delivered");
                return true;
            }
            Ok(response) => {
                debug!(sid = %subscription.sid, seq, %url, status = %response.status, "Event refused")
            }
            Err(e) => debug!(sid = %subscription.sid, seq, %url, error = %e, "Event not delivered"),
        }
    }
    false
}

fn notify_request(url: &Url, sid: &str, seq: u32, body: &str) -> StreamRequest {
    StreamRequest::new(Method::Notify, url.as_str())
        .with_header(NT, GENA_EVENT_NT)
        .with_header(NTS, NotificationSubtype::Propchange.header_value())
        .with_header(SID, sid)
        .with_header(SEQ, &seq.to_string())
        .with_body(EVENT_CONTENT_TYPE, body.to_string())
}
