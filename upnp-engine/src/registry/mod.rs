//! The registry: every device and subscription the engine knows about.
//!
//! Local devices are published by the application and live until removed.
//! Remote devices are discovered on the network and expire when their
//! advertisements stop. Local subscriptions are held by remote subscribers on
//! our services; remote subscriptions are ours, on services of remote devices.
//!
//! # Locking
//!
//! All state sits behind one `RwLock`. Mutations take the write lock, lookups
//! the read lock. Nothing under the lock touches the network: listener events
//! and subscription end notices are collected while locked and delivered
//! after the lock is released.
//!
//! # Maintenance
//!
//! [`Registry::maintain`] removes everything that expired and returns the
//! periodic work that is due (ALIVE announcements, subscription renewals,
//! pending state change events). The caller, normally the
//! [`MaintenanceLoop`], hands that work to the router.

mod item;
mod maintenance;

pub use item::RegistryItem;
pub use maintenance::MaintenanceLoop;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::error::RegistrationError;
use crate::header::Timeout;
use crate::local::{LocalDevice, LocalServiceBinding};
use crate::model::{
    Device, LocalSubscription, RemoteSubscription, SequenceCheck, Service, ServiceReference,
    SubscriptionEndReason, SubscriptionEvent, Udn,
};

/// Capacity of the listener event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something changed in the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// Descriptor retrieval for an advertised device started
    RemoteDeviceDiscoveryStarted { udn: Udn, location: Url },
    /// Descriptor retrieval failed; the device was not added
    RemoteDeviceDiscoveryFailed {
        udn: Udn,
        location: Url,
        reason: String,
    },
    RemoteDeviceAdded(Arc<Device>),
    /// A known device was announced again with the same description
    RemoteDeviceUpdated(Arc<Device>),
    RemoteDeviceRemoved(Arc<Device>),
    LocalDeviceAdded(Arc<Device>),
    LocalDeviceRemoved(Arc<Device>),
    SubscriptionEnded {
        sid: String,
        service: ServiceReference,
        reason: SubscriptionEndReason,
    },
    BeforeShutdown,
}

/// Result of refreshing a remote device from an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Known at the same location; expiry extended
    Refreshed,
    /// No device with this UDN
    Unknown,
    /// Known, but advertised at a different descriptor location
    LocationChanged,
}

/// Periodic work found by [`Registry::maintain`].
#[derive(Debug, Default)]
pub struct MaintenanceWork {
    /// Local devices due for an ALIVE announcement
    pub alive: Vec<Arc<Device>>,
    /// Remote subscriptions due for renewal, already marked as renewing
    pub renewals: Vec<RemoteSubscription>,
    /// Evented state changes of local services not yet sent
    pub state_changes: Vec<(ServiceReference, Vec<(String, String)>)>,
}

impl MaintenanceWork {
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty() && self.renewals.is_empty() && self.state_changes.is_empty()
    }
}

struct LocalEntry {
    device: Arc<Device>,
    bindings: HashMap<ServiceReference, LocalServiceBinding>,
    last_alive: Instant,
}

#[derive(Default)]
struct RegistryState {
    /// Keyed by root UDN
    local: HashMap<Udn, LocalEntry>,
    /// Keyed by root UDN
    remote: HashMap<Udn, RegistryItem<Arc<Device>>>,
    local_subscriptions: HashMap<String, RegistryItem<LocalSubscription>>,
    remote_subscriptions: HashMap<String, RegistryItem<RemoteSubscription>>,
}

impl RegistryState {
    fn local_root_of(&self, udn: &Udn) -> Option<&LocalEntry> {
        self.local
            .values()
            .find(|entry| entry.device.find_device(udn).is_some())
    }

    fn remote_root_of(&self, udn: &Udn) -> Option<Udn> {
        self.remote
            .iter()
            .find(|(_, item)| item.value.find_device(udn).is_some())
            .map(|(root, _)| root.clone())
    }
}

/// Notices collected under the lock, delivered after it is released.
#[derive(Default)]
struct Outbox {
    events: Vec<RegistryEvent>,
    ended: Vec<(mpsc::Sender<SubscriptionEvent>, SubscriptionEndReason)>,
}

impl Outbox {
    fn end_remote(&mut self, subscription: RemoteSubscription, reason: SubscriptionEndReason) {
        self.events.push(RegistryEvent::SubscriptionEnded {
            sid: subscription.sid,
            service: subscription.service,
            reason,
        });
        self.ended.push((subscription.events, reason));
    }

    fn end_local(&mut self, subscription: LocalSubscription, reason: SubscriptionEndReason) {
        self.events.push(RegistryEvent::SubscriptionEnded {
            sid: subscription.sid,
            service: subscription.service,
            reason,
        });
    }
}

/// Thread-safe store of devices and subscriptions.
pub struct Registry {
    state: RwLock<RegistryState>,
    events: broadcast::Sender<RegistryEvent>,
    alive_interval: Option<Duration>,
    renewal_margin: Duration,
    pending_subscriptions: AtomicUsize,
    subscriptions_changed: Notify,
    shutting_down: AtomicBool,
}

impl Registry {
    pub fn new(config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            events,
            alive_interval: config.alive_interval,
            renewal_margin: config.renewal_margin,
            pending_subscriptions: AtomicUsize::new(0),
            subscriptions_changed: Notify::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Receive registry events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: RegistryEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn deliver(&self, outbox: Outbox) {
        for event in outbox.events {
            self.emit(event);
        }
        for (sender, reason) in outbox.ended {
            let notice = SubscriptionEvent::Ended { reason };
            if let Err(mpsc::error::TrySendError::Full(notice)) = sender.try_send(notice) {
                // Let the application drain its queue rather than drop the notice
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = sender.send(notice).await;
                    });
                }
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    // Devices

    /// Publish a local device.
    ///
    /// The device must be valid and none of its UDNs may belong to another
    /// local device. Remote devices sharing a UDN are removed.
    pub fn add_local_device(&self, local: LocalDevice) -> Result<Arc<Device>, RegistrationError> {
        if self.is_shutting_down() {
            return Err(RegistrationError::ShuttingDown);
        }
        let (device, bindings) = local.into_parts();
        if !device.is_local() {
            return Err(RegistrationError::WrongOrigin(device.udn));
        }
        device.validate()?;

        let device = Arc::new(device);
        let udns: HashSet<Udn> = device.udns().into_iter().cloned().collect();
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.write();
            if let Some(udn) = udns.iter().find(|udn| state.local_root_of(udn).is_some()) {
                return Err(RegistrationError::DuplicateUdn(udn.clone()));
            }

            let shadowed: Vec<Udn> = udns
                .iter()
                .filter_map(|udn| state.remote_root_of(udn))
                .collect();
            for root in shadowed {
                if let Some(item) = state.remote.remove(&root) {
                    warn!(udn = %root, "Remote device shadowed by local device, removing it");
                    end_subscriptions_of(&mut state, &item.value, &mut outbox);
                    outbox.events.push(RegistryEvent::RemoteDeviceRemoved(item.value));
                }
            }

            state.local.insert(
                device.udn.clone(),
                LocalEntry {
                    device: device.clone(),
                    bindings,
                    last_alive: Instant::now(),
                },
            );
            outbox.events.push(RegistryEvent::LocalDeviceAdded(device.clone()));
        }
        info!(udn = %device.udn, device_type = %device.device_type, "Local device added");
        self.deliver(outbox);
        Ok(device)
    }

    /// Add or update a remote device.
    ///
    /// An equal device already registered is refreshed. A different device
    /// with the same root UDN is replaced. Devices sharing a UDN with a local
    /// device are rejected.
    pub fn add_remote_device(&self, device: Device) -> Result<Arc<Device>, RegistrationError> {
        if self.is_shutting_down() {
            return Err(RegistrationError::ShuttingDown);
        }
        if device.is_local() {
            return Err(RegistrationError::WrongOrigin(device.udn));
        }
        if let Err(errors) = device.validate() {
            warn!(udn = %device.udn, "Not adding invalid remote device: {}", errors);
            return Err(errors.into());
        }

        let now = Instant::now();
        let max_age = Some(Duration::from_secs(device.max_age as u64));
        let udns: HashSet<Udn> = device.udns().into_iter().cloned().collect();
        let mut outbox = Outbox::default();

        let device = {
            let mut state = self.state.write();
            if let Some(udn) = udns.iter().find(|udn| state.local_root_of(udn).is_some()) {
                debug!(%udn, "Ignoring remote device with the UDN of a local device");
                return Err(RegistrationError::DuplicateUdn(udn.clone()));
            }

            if let Some(item) = state.remote.get_mut(&device.udn) {
                if *item.value == device {
                    item.refresh(now, max_age);
                    let existing = item.value.clone();
                    drop(state);
                    self.emit(RegistryEvent::RemoteDeviceUpdated(existing.clone()));
                    return Ok(existing);
                }
            }

            let replaced: Vec<Udn> = udns
                .iter()
                .filter_map(|udn| state.remote_root_of(udn))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            for root in replaced {
                if let Some(item) = state.remote.remove(&root) {
                    debug!(udn = %root, "Replacing remote device");
                    end_subscriptions_of(&mut state, &item.value, &mut outbox);
                    outbox.events.push(RegistryEvent::RemoteDeviceRemoved(item.value));
                }
            }

            let device = Arc::new(device);
            state
                .remote
                .insert(device.udn.clone(), RegistryItem::new(device.clone(), now, max_age));
            outbox.events.push(RegistryEvent::RemoteDeviceAdded(device.clone()));
            device
        };

        info!(
            udn = %device.udn,
            device_type = %device.device_type,
            name = %device.details.friendly_name,
            "Remote device added"
        );
        self.deliver(outbox);
        Ok(device)
    }

    /// Extend the expiry of the remote device tree containing `udn`.
    pub fn refresh_remote_device(&self, udn: &Udn, location: &Url, max_age: u32) -> RefreshOutcome {
        let mut state = self.state.write();
        let Some(root) = state.remote_root_of(udn) else {
            return RefreshOutcome::Unknown;
        };
        let Some(item) = state.remote.get_mut(&root) else {
            return RefreshOutcome::Unknown;
        };

        let known_location = item.value.remote_identity().map(|id| &id.descriptor_url);
        if known_location != Some(location) {
            return RefreshOutcome::LocationChanged;
        }
        item.refresh(Instant::now(), Some(Duration::from_secs(max_age as u64)));
        RefreshOutcome::Refreshed
    }

    /// Remove the device tree whose root has `udn`, local or remote.
    ///
    /// Subscriptions on its services end with
    /// [`SubscriptionEndReason::DeviceRemoved`]. Unknown UDNs are a no-op.
    pub fn remove_device(&self, udn: &Udn) -> Option<Arc<Device>> {
        let mut outbox = Outbox::default();
        let removed = {
            let mut state = self.state.write();
            if let Some(entry) = state.local.remove(udn) {
                end_subscriptions_of(&mut state, &entry.device, &mut outbox);
                outbox
                    .events
                    .push(RegistryEvent::LocalDeviceRemoved(entry.device.clone()));
                Some(entry.device)
            } else if let Some(item) = state.remote.remove(udn) {
                end_subscriptions_of(&mut state, &item.value, &mut outbox);
                outbox
                    .events
                    .push(RegistryEvent::RemoteDeviceRemoved(item.value.clone()));
                Some(item.value)
            } else {
                None
            }
        };
        if let Some(device) = &removed {
            info!(udn = %device.udn, local = device.is_local(), "Device removed");
        }
        self.deliver(outbox);
        removed
    }

    /// Remove the remote device tree containing `udn`.
    pub fn remove_remote_device(&self, udn: &Udn) -> Option<Arc<Device>> {
        let root = self.state.read().remote_root_of(udn)?;
        self.remove_device(&root)
    }

    /// Device with `udn`, searched among roots only or the whole trees.
    pub fn get_device(&self, udn: &Udn, root_only: bool) -> Option<Arc<Device>> {
        let state = self.state.read();
        let roots = state
            .local
            .values()
            .map(|entry| &entry.device)
            .chain(state.remote.values().map(|item| &item.value));

        for root in roots {
            if &root.udn == udn {
                return Some(root.clone());
            }
            if !root_only {
                if let Some(embedded) = root.find_device(udn) {
                    return Some(Arc::new(embedded.clone()));
                }
            }
        }
        None
    }

    pub fn local_devices(&self) -> Vec<Arc<Device>> {
        self.state
            .read()
            .local
            .values()
            .map(|entry| entry.device.clone())
            .collect()
    }

    pub fn remote_devices(&self) -> Vec<Arc<Device>> {
        self.state
            .read()
            .remote
            .values()
            .map(|item| item.value.clone())
            .collect()
    }

    pub fn is_local_udn(&self, udn: &Udn) -> bool {
        self.state.read().local_root_of(udn).is_some()
    }

    /// A service of a local device with its binding.
    pub fn local_service(
        &self,
        reference: &ServiceReference,
    ) -> Option<(Arc<Service>, LocalServiceBinding)> {
        let state = self.state.read();
        let entry = state.local_root_of(&reference.udn)?;
        let service = entry.device.find_service(reference)?.clone();
        let binding = entry.bindings.get(reference)?.clone();
        Some((service, binding))
    }

    /// A service of any device.
    pub fn service(&self, reference: &ServiceReference) -> Option<Arc<Service>> {
        let state = self.state.read();
        if let Some(entry) = state.local_root_of(&reference.udn) {
            return entry.device.find_service(reference).cloned();
        }
        let root = state.remote_root_of(&reference.udn)?;
        state.remote.get(&root)?.value.find_service(reference).cloned()
    }

    // Local subscriptions

    pub fn add_local_subscription(&self, subscription: LocalSubscription) {
        let max_age = timeout_duration(subscription.timeout);
        debug!(sid = %subscription.sid, service = %subscription.service, "Local subscription added");
        self.state.write().local_subscriptions.insert(
            subscription.sid.clone(),
            RegistryItem::new(subscription, Instant::now(), max_age),
        );
    }

    pub fn local_subscription(&self, sid: &str) -> Option<LocalSubscription> {
        self.state
            .read()
            .local_subscriptions
            .get(sid)
            .map(|item| item.value.clone())
    }

    pub fn local_subscriptions_of(&self, service: &ServiceReference) -> Vec<LocalSubscription> {
        self.state
            .read()
            .local_subscriptions
            .values()
            .filter(|item| &item.value.service == service)
            .map(|item| item.value.clone())
            .collect()
    }

    /// Extend an active local subscription; `None` if unknown or expired.
    pub fn renew_local_subscription(&self, sid: &str, timeout: Timeout) -> Option<LocalSubscription> {
        let now = Instant::now();
        let mut state = self.state.write();
        let item = state.local_subscriptions.get_mut(sid)?;
        if item.is_expired(now) {
            return None;
        }
        item.value.timeout = timeout;
        item.refresh(now, timeout_duration(timeout));
        Some(item.value.clone())
    }

    pub fn remove_local_subscription(
        &self,
        sid: &str,
        reason: SubscriptionEndReason,
    ) -> Option<LocalSubscription> {
        let removed = self.state.write().local_subscriptions.remove(sid)?;
        debug!(%sid, %reason, "Local subscription removed");
        let mut outbox = Outbox::default();
        outbox.end_local(removed.value.clone(), reason);
        self.deliver(outbox);
        Some(removed.value)
    }

    /// Record the outcome of one event delivery; returns the consecutive
    /// failure count, or `None` if the subscription is gone.
    pub(crate) fn record_delivery(&self, sid: &str, delivered: bool) -> Option<u32> {
        let mut state = self.state.write();
        let item = state.local_subscriptions.get_mut(sid)?;
        if delivered {
            item.value.delivery_failures = 0;
        } else {
            item.value.delivery_failures += 1;
        }
        Some(item.value.delivery_failures)
    }

    // Remote subscriptions

    pub fn add_remote_subscription(&self, subscription: RemoteSubscription) {
        let max_age = timeout_duration(subscription.timeout);
        debug!(sid = %subscription.sid, service = %subscription.service, "Remote subscription added");
        self.state.write().remote_subscriptions.insert(
            subscription.sid.clone(),
            RegistryItem::new(subscription, Instant::now(), max_age),
        );
        self.subscriptions_changed.notify_waiters();
    }

    pub fn remote_subscription(&self, sid: &str) -> Option<RemoteSubscription> {
        self.state
            .read()
            .remote_subscriptions
            .get(sid)
            .map(|item| item.value.clone())
    }

    pub fn remote_subscriptions(&self) -> Vec<RemoteSubscription> {
        self.state
            .read()
            .remote_subscriptions
            .values()
            .map(|item| item.value.clone())
            .collect()
    }

    /// Record a successful renewal; `false` if the subscription is gone.
    pub fn renew_remote_subscription(&self, sid: &str, timeout: Timeout) -> bool {
        let mut state = self.state.write();
        match state.remote_subscriptions.get_mut(sid) {
            Some(item) => {
                item.value.timeout = timeout;
                item.value.renewing = false;
                item.refresh(Instant::now(), timeout_duration(timeout));
                true
            }
            None => false,
        }
    }

    /// Store the SEQ of a received event unless it is stale; returns the
    /// subscription and where the SEQ fell.
    pub(crate) fn advance_remote_sequence(
        &self,
        sid: &str,
        seq: u32,
    ) -> Option<(RemoteSubscription, SequenceCheck)> {
        let mut state = self.state.write();
        let item = state.remote_subscriptions.get_mut(sid)?;
        let check = item.value.check_sequence(seq);
        if !matches!(check, SequenceCheck::Stale { .. }) {
            item.value.last_sequence = Some(seq);
        }
        Some((item.value.clone(), check))
    }

    /// Remove a remote subscription and tell its application channel why.
    pub fn remove_remote_subscription(
        &self,
        sid: &str,
        reason: SubscriptionEndReason,
    ) -> Option<RemoteSubscription> {
        let removed = self.state.write().remote_subscriptions.remove(sid)?;
        debug!(%sid, %reason, "Remote subscription removed");
        let mut outbox = Outbox::default();
        outbox.end_remote(removed.value.clone(), reason);
        self.deliver(outbox);
        Some(removed.value)
    }

    /// Mark a SUBSCRIBE as in flight until the guard drops.
    ///
    /// Events that arrive for an unknown SID while subscriptions are pending
    /// wait for them, since the initial event can overtake the response.
    pub(crate) fn pending_subscription(&self) -> PendingSubscription<'_> {
        self.pending_subscriptions.fetch_add(1, Ordering::AcqRel);
        PendingSubscription { registry: self }
    }

    /// Remote subscription `sid`, waiting up to `timeout` while SUBSCRIBE
    /// requests are still in flight.
    pub async fn wait_remote_subscription(
        &self,
        sid: &str,
        timeout: Duration,
    ) -> Option<RemoteSubscription> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.subscriptions_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(subscription) = self.remote_subscription(sid) {
                return Some(subscription);
            }
            if self.pending_subscriptions.load(Ordering::Acquire) == 0 {
                return None;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.remote_subscription(sid);
            }
        }
    }

    // Maintenance

    /// Remove everything expired at `now` and collect due periodic work.
    pub fn maintain(&self, now: Instant) -> MaintenanceWork {
        let mut outbox = Outbox::default();
        let mut work = MaintenanceWork::default();
        let bindings: Vec<(ServiceReference, LocalServiceBinding)>;

        {
            let mut state = self.state.write();

            let expired: Vec<Udn> = state
                .remote
                .iter()
                .filter(|(_, item)| item.is_expired(now))
                .map(|(udn, _)| udn.clone())
                .collect();
            for udn in expired {
                if let Some(item) = state.remote.remove(&udn) {
                    info!(%udn, "Remote device expired");
                    end_subscriptions_of(&mut state, &item.value, &mut outbox);
                    outbox.events.push(RegistryEvent::RemoteDeviceRemoved(item.value));
                }
            }

            let expired: Vec<String> = state
                .local_subscriptions
                .iter()
                .filter(|(_, item)| item.is_expired(now))
                .map(|(sid, _)| sid.clone())
                .collect();
            for sid in expired {
                if let Some(item) = state.local_subscriptions.remove(&sid) {
                    debug!(%sid, "Local subscription expired");
                    outbox.end_local(item.value, SubscriptionEndReason::Expired);
                }
            }

            let expired: Vec<String> = state
                .remote_subscriptions
                .iter()
                .filter(|(_, item)| item.is_expired(now))
                .map(|(sid, _)| sid.clone())
                .collect();
            for sid in expired {
                if let Some(item) = state.remote_subscriptions.remove(&sid) {
                    warn!(%sid, "Remote subscription expired before it was renewed");
                    outbox.end_remote(item.value, SubscriptionEndReason::Expired);
                }
            }

            for item in state.remote_subscriptions.values_mut() {
                let Some(granted) = item.value.timeout.seconds() else {
                    continue;
                };
                let due = item.refreshed + renewal_delay(granted, self.renewal_margin);
                if !item.value.renewing && now >= due {
                    item.value.renewing = true;
                    work.renewals.push(item.value.clone());
                }
            }

            for entry in state.local.values_mut() {
                let interval = self
                    .alive_interval
                    .unwrap_or_else(|| Duration::from_secs(entry.device.max_age as u64 / 2))
                    .max(Duration::from_secs(1));
                if now >= entry.last_alive + interval {
                    entry.last_alive = now;
                    work.alive.push(entry.device.clone());
                }
            }

            bindings = state
                .local
                .values()
                .flat_map(|entry| entry.bindings.iter())
                .map(|(reference, binding)| (reference.clone(), binding.clone()))
                .collect();
        }

        self.deliver(outbox);

        for (reference, binding) in bindings {
            let changes = binding.state.take_changes();
            if !changes.is_empty() {
                work.state_changes.push((reference, changes));
            }
        }
        work
    }

    /// Stop accepting devices and announce the shutdown; returns the local
    /// devices so the caller can say goodbye.
    pub fn shutdown(&self) -> Vec<Arc<Device>> {
        self.shutting_down.store(true, Ordering::Release);
        self.emit(RegistryEvent::BeforeShutdown);
        self.local_devices()
    }

    /// Drop all state without notices.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = RegistryState::default();
    }
}

/// Guard of an in-flight SUBSCRIBE, see [`Registry::pending_subscription`].
pub(crate) struct PendingSubscription<'a> {
    registry: &'a Registry,
}

impl Drop for PendingSubscription<'_> {
    fn drop(&mut self) {
        self.registry
            .pending_subscriptions
            .fetch_sub(1, Ordering::AcqRel);
        self.registry.subscriptions_changed.notify_waiters();
    }
}

/// End every subscription on a service of `device`'s tree.
fn end_subscriptions_of(state: &mut RegistryState, device: &Device, outbox: &mut Outbox) {
    let udns: HashSet<&Udn> = device.udns().into_iter().collect();

    let local: Vec<String> = state
        .local_subscriptions
        .iter()
        .filter(|(_, item)| udns.contains(&item.value.service.udn))
        .map(|(sid, _)| sid.clone())
        .collect();
    for sid in local {
        if let Some(item) = state.local_subscriptions.remove(&sid) {
            outbox.end_local(item.value, SubscriptionEndReason::DeviceRemoved);
        }
    }

    let remote: Vec<String> = state
        .remote_subscriptions
        .iter()
        .filter(|(_, item)| udns.contains(&item.value.service.udn))
        .map(|(sid, _)| sid.clone())
        .collect();
    for sid in remote {
        if let Some(item) = state.remote_subscriptions.remove(&sid) {
            outbox.end_remote(item.value, SubscriptionEndReason::DeviceRemoved);
        }
    }
}

fn timeout_duration(timeout: Timeout) -> Option<Duration> {
    timeout.seconds().map(|s| Duration::from_secs(s as u64))
}

/// Delay after a (re)subscription at which to renew: half the granted
/// duration, but no later than `margin` before expiry. Grants no longer
/// than the margin renew at half time.
pub(crate) fn renewal_delay(granted_seconds: u32, margin: Duration) -> Duration {
    let granted = Duration::from_secs(granted_seconds as u64);
    let half = granted / 2;
    match granted.checked_sub(margin) {
        Some(latest) if !latest.is_zero() => half.min(latest),
        _ => half,
    }
}
