//! GENA eventing.
//!
//! [`sending`] holds the subscriber side (SUBSCRIBE, renewal, UNSUBSCRIBE)
//! and the publisher's event delivery; [`receiving`] answers subscription
//! requests for local services and accepts events for remote subscriptions.

pub mod receiving;
pub mod sending;

pub(crate) const CALLBACK: &str = "CALLBACK";
pub(crate) const NT: &str = "NT";
pub(crate) const NTS: &str = "NTS";
pub(crate) const SID: &str = "SID";
pub(crate) const SEQ: &str = "SEQ";
pub(crate) const TIMEOUT: &str = "TIMEOUT";
pub(crate) const SERVER: &str = "SERVER";

pub(crate) const EVENT_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";
