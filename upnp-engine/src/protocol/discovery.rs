//! SSDP discovery: advertisements, searches and search responses.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, trace, warn};
use upnp_ssdp::{header, IncomingDatagram, OutgoingDatagram, SsdpMessage};
use url::Url;

use crate::error::RouterError;
use crate::header::{SearchTarget, Usn};
use crate::logging::VIOLATION_TARGET;
use crate::model::{
    Device, NamedDeviceType, NamedServiceType, NotificationSubtype, Udn, DEFAULT_MAX_AGE_SECONDS,
};
use crate::registry::RefreshOutcome;
use crate::router::Router;

/// Upper bound of MX honoured when answering searches.
const MAX_MX: u32 = 120;

/// NT and USN of every advertisement of a device tree.
///
/// The root announces itself as root device, by UDN and by type; embedded
/// devices by UDN and type; every device once per distinct service type.
pub(crate) fn advertisements(root: &Device) -> Vec<(String, Usn)> {
    let mut out = vec![(
        SearchTarget::RootDevice.to_string(),
        Usn::RootDevice(root.udn.clone()),
    )];
    for device in root.all_devices() {
        out.push((device.udn.to_string(), Usn::Udn(device.udn.clone())));
        out.push((device.device_type.to_string(), named_device(device)));
        for service_type in device.service_types() {
            out.push((
                service_type.to_string(),
                Usn::ServiceType(NamedServiceType {
                    udn: device.udn.clone(),
                    service_type: service_type.clone(),
                }),
            ));
        }
    }
    out
}

/// ST and USN of every search response `root` owes for `target`.
///
/// Type targets match any device or service implementing at least the
/// requested version; responses carry the actual type.
pub(crate) fn search_matches(root: &Device, target: &SearchTarget) -> Vec<(String, Usn)> {
    match target {
        SearchTarget::All => advertisements(root),
        SearchTarget::RootDevice => vec![(
            SearchTarget::RootDevice.to_string(),
            Usn::RootDevice(root.udn.clone()),
        )],
        SearchTarget::Udn(udn) => root
            .find_device(udn)
            .map(|device| (device.udn.to_string(), Usn::Udn(device.udn.clone())))
            .into_iter()
            .collect(),
        SearchTarget::DeviceType(wanted) => root
            .all_devices()
            .into_iter()
            .filter(|device| device.device_type.implements_version(wanted))
            .map(|device| (device.device_type.to_string(), named_device(device)))
            .collect(),
        SearchTarget::ServiceType(wanted) => root
            .all_devices()
            .into_iter()
            .flat_map(|device| {
                device
                    .service_types()
                    .into_iter()
                    .filter(|t| t.implements_version(wanted))
                    .map(move |t| {
                        (
                            t.to_string(),
                            Usn::ServiceType(NamedServiceType {
                                udn: device.udn.clone(),
                                service_type: t.clone(),
                            }),
                        )
                    })
            })
            .collect(),
    }
}

fn named_device(device: &Device) -> Usn {
    Usn::DeviceType(NamedDeviceType {
        udn: device.udn.clone(),
        device_type: device.device_type.clone(),
    })
}

fn location_of(router: &Router, base_url: &str, device: &Device) -> String {
    format!(
        "{}{}",
        base_url,
        router.namespace().device_descriptor_path(&device.udn)
    )
}

/// Announce a local device tree with `ssdp:alive`.
pub async fn send_alive(router: &Router, device: &Device) {
    let Some(base_url) = router.stream_base_url() else {
        warn!(udn = %device.udn, "No stream server, cannot announce device");
        return;
    };
    let location = location_of(router, &base_url, device);

    let advertisements = advertisements(device);
    let count = advertisements.len();
    for (nt, usn) in advertisements {
        let mut message = SsdpMessage::notify();
        message
            .headers
            .add(header::CACHE_CONTROL, format!("max-age={}", device.max_age));
        message.headers.add(header::LOCATION, location.as_str());
        message.headers.add(header::NT, nt);
        message
            .headers
            .add(header::NTS, NotificationSubtype::Alive.header_value());
        message
            .headers
            .add(header::SERVER, router.config().server_name.as_str());
        message.headers.add(header::USN, usn.to_string());

        if let Err(e) = send_multicast(router, message).await {
            warn!(udn = %device.udn, error = %e, "Failed to send ALIVE");
            return;
        }
    }
    debug!(udn = %device.udn, count, "Sent ALIVE notifications");
}

/// Announce the departure of a local device tree with `ssdp:byebye`.
pub async fn send_byebye(router: &Router, device: &Device) {
    let advertisements = advertisements(device);
    let count = advertisements.len();
    for (nt, usn) in advertisements {
        let mut message = SsdpMessage::notify();
        message.headers.add(header::NT, nt);
        message
            .headers
            .add(header::NTS, NotificationSubtype::Byebye.header_value());
        message.headers.add(header::USN, usn.to_string());

        if let Err(e) = send_multicast(router, message).await {
            warn!(udn = %device.udn, error = %e, "Failed to send BYEBYE");
            return;
        }
    }
    debug!(udn = %device.udn, count, "Sent BYEBYE notifications");
}

/// Multicast one M-SEARCH.
pub async fn send_search(router: &Router, target: &SearchTarget, mx: u32) -> Result<(), RouterError> {
    let message = SsdpMessage::search(&target.to_string(), mx);
    send_multicast(router, message).await?;
    debug!(%target, mx, "Sent M-SEARCH");
    Ok(())
}

async fn send_multicast(router: &Router, message: SsdpMessage) -> Result<(), RouterError> {
    let destination = router.config().multicast_address;
    router
        .send_datagram(OutgoingDatagram::unicast(message, destination))
        .await
}

/// Handle NOTIFY alive, update and byebye.
pub(crate) fn receive_notification(router: &Arc<Router>, datagram: IncomingDatagram) {
    let message = &datagram.message;
    let Some(usn) = message.usn().and_then(Usn::parse) else {
        warn!(
            target: VIOLATION_TARGET,
            source = %datagram.source,
            usn = ?message.usn(),
            "Notification without a valid USN"
        );
        return;
    };

    let udn = usn.udn();
    if router.registry().is_local_udn(udn) {
        trace!(%udn, "Ignoring notification of a local device");
        return;
    }

    match message.nts().and_then(NotificationSubtype::parse) {
        Some(NotificationSubtype::Byebye) => {
            if let Some(device) = router.registry().remove_remote_device(udn) {
                info!(udn = %device.udn, "Remote device said goodbye");
            }
        }
        _ => advertised(router, udn.clone(), &datagram),
    }
}

/// Handle a unicast response to one of our searches.
pub(crate) fn receive_search_response(router: &Arc<Router>, datagram: IncomingDatagram) {
    let message = &datagram.message;
    let Some(usn) = message.usn().and_then(Usn::parse) else {
        warn!(
            target: VIOLATION_TARGET,
            source = %datagram.source,
            usn = ?message.usn(),
            "Search response without a valid USN"
        );
        return;
    };

    let udn = usn.udn();
    if router.registry().is_local_udn(udn) {
        return;
    }
    advertised(router, udn.clone(), &datagram);
}

/// Refresh a known device, or retrieve the descriptors of a new one.
fn advertised(router: &Arc<Router>, udn: Udn, datagram: &IncomingDatagram) {
    let message = &datagram.message;
    let Some(location) = message.location().and_then(|l| Url::parse(l.trim()).ok()) else {
        warn!(
            target: VIOLATION_TARGET,
            source = %datagram.source,
            %udn,
            "Advertisement without a valid LOCATION"
        );
        return;
    };
    let max_age = router
        .config()
        .remote_device_max_age
        .or_else(|| message.max_age())
        .unwrap_or(DEFAULT_MAX_AGE_SECONDS);

    let registry = router.registry();
    match registry.refresh_remote_device(&udn, &location, max_age) {
        RefreshOutcome::Refreshed => trace!(%udn, max_age, "Remote device refreshed"),
        RefreshOutcome::Unknown => {
            router.retrieve_remote_device(udn, location, max_age, datagram.local_address)
        }
        RefreshOutcome::LocationChanged => {
            info!(%udn, %location, "Remote device moved, retrieving it again");
            registry.remove_remote_device(&udn);
            router.retrieve_remote_device(udn, location, max_age, datagram.local_address);
        }
    }
}

/// Answer an M-SEARCH for our local devices.
pub(crate) async fn receive_search(router: &Arc<Router>, datagram: IncomingDatagram) {
    let message = &datagram.message;
    let discover = message
        .header(header::MAN)
        .map_or(false, |man| man.trim().trim_matches('"') == "ssdp:discover");
    if !discover {
        warn!(
            target: VIOLATION_TARGET,
            source = %datagram.source,
            man = ?message.header(header::MAN),
            "M-SEARCH without MAN \"ssdp:discover\""
        );
        return;
    }
    let Some(mx) = message.mx() else {
        warn!(
            target: VIOLATION_TARGET,
            source = %datagram.source,
            "M-SEARCH without a valid MX"
        );
        return;
    };
    let Some(target) = message.st().and_then(SearchTarget::parse) else {
        debug!(st = ?message.st(), "Unsupported search target");
        return;
    };

    let devices = router.registry().local_devices();
    if devices.is_empty() {
        return;
    }
    let Some(base_url) = router.stream_base_url() else {
        debug!("No stream server, not answering searches");
        return;
    };

    let window_ms = u64::from(mx.min(MAX_MX)) * 1000;
    let jitter = if window_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..window_ms)
    };
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    let mut sent = 0;
    for device in &devices {
        let location = location_of(router, &base_url, device);
        for (st, usn) in search_matches(device, &target) {
            let mut response = SsdpMessage::response_ok();
            response
                .headers
                .add(header::CACHE_CONTROL, format!("max-age={}", device.max_age));
            response.headers.add(header::DATE, date.as_str());
            response.headers.add(header::EXT, "");
            response.headers.add(header::LOCATION, location.as_str());
            response
                .headers
                .add(header::SERVER, router.config().server_name.as_str());
            response.headers.add(header::ST, st);
            response.headers.add(header::USN, usn.to_string());

            let outgoing = OutgoingDatagram::unicast(response, datagram.source);
            if let Err(e) = router.send_datagram(outgoing).await {
                warn!(error = %e, "Failed to send search response");
                return;
            }
            sent += 1;
        }
    }
    trace!(%target, sent, source = %datagram.source, "Answered M-SEARCH");
}
