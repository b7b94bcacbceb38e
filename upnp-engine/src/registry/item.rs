use std::time::Duration;

use tokio::time::Instant;

/// A registry entry with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct RegistryItem<T> {
    pub value: T,
    /// Last time the entry was added or refreshed
    pub refreshed: Instant,
    /// `None` never expires
    pub max_age: Option<Duration>,
}

impl<T> RegistryItem<T> {
    pub fn new(value: T, now: Instant, max_age: Option<Duration>) -> Self {
        Self {
            value,
            refreshed: now,
            max_age,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.max_age.map(|age| self.refreshed + age)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().map_or(false, |at| at <= now)
    }

    pub fn refresh(&mut self, now: Instant, max_age: Option<Duration>) {
        self.refreshed = now;
        self.max_age = max_age;
    }
}
