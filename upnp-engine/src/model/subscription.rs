//! GENA subscriptions in both directions.
//!
//! A [`LocalSubscription`] is held by a remote subscriber on one of our local
//! services; we send it events. A [`RemoteSubscription`] is ours, on a service
//! of a remote device; we receive its events and forward them to the
//! application.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::header::Timeout;
use crate::model::{ServiceReference, Value};

/// SEQ following `sequence`; wraps from `u32::MAX` to 1, never back to 0.
pub fn next_sequence(sequence: u32) -> u32 {
    if sequence == u32::MAX {
        1
    } else {
        sequence + 1
    }
}

/// Why a subscription is no longer active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEndReason {
    Unsubscribed,
    Expired,
    RenewalFailed,
    DeviceRemoved,
    DeliveryFailure,
}

impl fmt::Display for SubscriptionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SubscriptionEndReason::Unsubscribed => "unsubscribed",
            SubscriptionEndReason::Expired => "expired",
            SubscriptionEndReason::RenewalFailed => "renewal failed",
            SubscriptionEndReason::DeviceRemoved => "device removed",
            SubscriptionEndReason::DeliveryFailure => "event delivery failed",
        };
        f.write_str(text)
    }
}

/// What the application sees of a remote subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Established { sid: String, timeout: Timeout },
    Event { seq: u32, values: Vec<(String, Value)> },
    Ended { reason: SubscriptionEndReason },
}

/// Ordered outbox of one local subscription.
///
/// Property sets are queued in change order; whoever holds the sequence lock
/// drains the queue, so NOTIFYs of one SID leave strictly in order with
/// consecutive SEQ values.
#[derive(Debug, Default)]
pub struct EventLane {
    queue: parking_lot::Mutex<VecDeque<Vec<(String, String)>>>,
    sequence: tokio::sync::Mutex<u32>,
}

impl EventLane {
    pub fn push(&self, properties: Vec<(String, String)>) {
        self.queue.lock().push_back(properties);
    }

    pub(crate) fn pop(&self) -> Option<Vec<(String, String)>> {
        self.queue.lock().pop_front()
    }

    pub(crate) async fn lock_sequence(&self) -> tokio::sync::MutexGuard<'_, u32> {
        self.sequence.lock().await
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

/// A remote subscriber's subscription to one of our local services.
#[derive(Debug, Clone)]
pub struct LocalSubscription {
    pub sid: String,
    pub service: ServiceReference,
    /// Tried in order until one accepts the NOTIFY
    pub callback_urls: Vec<Url>,
    pub timeout: Timeout,
    pub lane: Arc<EventLane>,
    /// Consecutive events no callback URL accepted
    pub delivery_failures: u32,
}

impl LocalSubscription {
    pub fn new(service: ServiceReference, callback_urls: Vec<Url>, timeout: Timeout) -> Self {
        Self {
            sid: format!("uuid:{}", uuid::Uuid::new_v4()),
            service,
            callback_urls,
            timeout,
            lane: Arc::new(EventLane::default()),
            delivery_failures: 0,
        }
    }
}

/// Our subscription to a service of a remote device.
#[derive(Debug, Clone)]
pub struct RemoteSubscription {
    pub sid: String,
    pub service: ServiceReference,
    pub event_subscription_url: Url,
    /// Granted duration
    pub timeout: Timeout,
    /// SEQ of the last event received
    pub last_sequence: Option<u32>,
    /// A renewal request is outstanding
    pub renewing: bool,
    pub events: mpsc::Sender<SubscriptionEvent>,
}

impl RemoteSubscription {
    /// SEQ the next event should carry.
    pub fn expected_sequence(&self) -> u32 {
        self.last_sequence.map_or(0, next_sequence)
    }

    /// Place a received SEQ relative to the last one seen.
    ///
    /// A SEQ ahead of the last one counts as forward across the
    /// `u32::MAX` to 1 wrap; SEQ 0 only ever starts a subscription.
    pub fn check_sequence(&self, seq: u32) -> SequenceCheck {
        let expected = self.expected_sequence();
        if seq == expected {
            return SequenceCheck::InOrder;
        }
        match self.last_sequence {
            None => SequenceCheck::Skipped { expected },
            Some(last) if seq != 0 && seq != last && seq.wrapping_sub(last) < 1 << 31 => {
                SequenceCheck::Skipped { expected }
            }
            Some(last) => SequenceCheck::Stale { last },
        }
    }
}

/// Where a received event SEQ falls for its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    InOrder,
    /// Ahead of `expected`; events in between were missed
    Skipped { expected: u32 },
    /// Duplicate or late; at or behind `last`
    Stale { last: u32 },
}

/// Either kind, for registry lookups by SID.
#[derive(Debug, Clone)]
pub enum Subscription {
    Local(LocalSubscription),
    Remote(RemoteSubscription),
}

impl Subscription {
    pub fn sid(&self) -> &str {
        match self {
            Subscription::Local(s) => &s.sid,
            Subscription::Remote(s) => &s.sid,
        }
    }

    pub fn service(&self) -> &ServiceReference {
        match self {
            Subscription::Local(s) => &s.service,
            Subscription::Remote(s) => &s.service,
        }
    }
}
