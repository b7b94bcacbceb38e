//! Discovery between engines on an in-memory network.
//!
//! A device node publishes a switch power light; control point nodes find it
//! through its announcements or by searching, retrieve its descriptors and
//! drop it again on byebye or expiry.

mod common;

use std::time::Duration;

use common::{switch_power_device, test_config, wait_for, MemoryNetwork};
use upnp_engine::{
    RegistryEvent, SearchTarget, ServiceId, ServiceType, ServiceTypeFilter, Udn,
};
use upnp_ssdp::header;

#[tokio::test]
async fn test_announced_device_is_hydrated() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config());
    let device_node = network.node(test_config());
    let mut events = control_point.registry().subscribe();

    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .expect("Failed to add local device");

    let event = wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;
    let RegistryEvent::RemoteDeviceAdded(device) = event else {
        unreachable!()
    };
    assert_eq!(device.udn, udn);
    assert_eq!(device.details.friendly_name, "Kitchen Light");
    assert_eq!(
        device.remote_identity().unwrap().descriptor_url.as_str(),
        format!("http://10.0.0.2:8080/dev/{}/desc", udn.id())
    );

    let service = &device.services[0];
    assert_eq!(service.service_id, ServiceId::uda("SwitchPower"));
    assert_eq!(service.actions.len(), 3);
    assert!(service.action("GetStatus").unwrap().return_value().is_some());
    assert!(service.state_variable("Status").unwrap().send_events);

    let endpoints = service.endpoints.as_ref().unwrap();
    assert!(endpoints.control_url.as_str().ends_with("/action"));
    assert!(endpoints.event_subscription_url.as_str().ends_with("/event"));
}

#[tokio::test]
async fn test_alive_fan_out() {
    let network = MemoryNetwork::new();
    let device_node = network.node(test_config());

    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .unwrap();

    let alive: Vec<_> = network
        .sent_datagrams()
        .into_iter()
        .filter(|(_, d)| d.message.nts() == Some("ssdp:alive"))
        .collect();
    // rootdevice, uuid, device type, one service type
    assert_eq!(alive.len(), 4);
    assert!(alive
        .iter()
        .all(|(_, d)| d.destination.ip().is_multicast()));
    assert!(alive.iter().any(|(_, d)| {
        d.message.nt() == Some("upnp:rootdevice")
            && d.message.usn() == Some(format!("uuid:{}::upnp:rootdevice", udn.id()).as_str())
    }));
    assert!(alive
        .iter()
        .all(|(_, d)| d.message.header(header::CACHE_CONTROL) == Some("max-age=1800")));
}

#[tokio::test]
async fn test_search_finds_device_by_service_type() {
    let network = MemoryNetwork::new();
    let device_node = network.node(test_config());
    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .unwrap();

    // Joins after the announcements went out
    let mut config = test_config();
    config.search_mx = 1;
    let late = network.node(config);
    let mut events = late.registry().subscribe();
    late.control_point()
        .search(SearchTarget::ServiceType(ServiceType::uda("SwitchPower", 1)))
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;
    let RegistryEvent::RemoteDeviceAdded(device) = event else {
        unreachable!()
    };
    assert_eq!(device.udn, udn);

    let responses: Vec<_> = network
        .sent_datagrams()
        .into_iter()
        .filter(|(_, d)| d.message.st().is_some() && !d.message.is_request())
        .collect();
    assert_eq!(responses.len(), 1);
    let (_, response) = &responses[0];
    assert_eq!(
        response.message.st(),
        Some("urn:schemas-upnp-org:service:SwitchPower:1")
    );
    assert!(!response.destination.ip().is_multicast());
    assert!(response.message.header(header::EXT).is_some());
    assert!(response.message.header(header::DATE).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_rootdevice_search_answered_within_mx() {
    let network = MemoryNetwork::new();
    let device_node = network.node(test_config());
    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .unwrap();

    let late = network.node(test_config());
    let mut events = late.registry().subscribe();
    let started = tokio::time::Instant::now();
    late.control_point()
        .search(SearchTarget::RootDevice)
        .await
        .unwrap();

    let device = tokio::time::timeout(Duration::from_secs(4), async {
        loop {
            if let Ok(RegistryEvent::RemoteDeviceAdded(device)) = events.recv().await {
                return device;
            }
        }
    })
    .await
    .expect("Device not added after searching for root devices");
    assert_eq!(device.udn, udn);
    assert!(started.elapsed() <= Duration::from_secs(3));

    let datagrams = network.sent_datagrams();
    let search = datagrams
        .iter()
        .map(|(_, d)| &d.message)
        .find(|m| m.is_request() && m.st().is_some())
        .expect("M-SEARCH sent");
    assert_eq!(search.st(), Some("upnp:rootdevice"));
    assert_eq!(search.mx(), Some(3));

    let responses: Vec<_> = datagrams
        .iter()
        .map(|(_, d)| &d.message)
        .filter(|m| !m.is_request() && m.st().is_some())
        .collect();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].st(), Some("upnp:rootdevice"));
    assert_eq!(
        responses[0].usn(),
        Some(format!("uuid:{}::upnp:rootdevice", udn.id()).as_str())
    );
}

#[tokio::test]
async fn test_byebye_removes_device() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config());
    let device_node = network.node(test_config());
    let mut events = control_point.registry().subscribe();

    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;

    device_node.remove_local_device(&udn).await.unwrap();
    let event =
        wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceRemoved(_))).await;
    let RegistryEvent::RemoteDeviceRemoved(device) = event else {
        unreachable!()
    };
    assert_eq!(device.udn, udn);
    assert!(control_point.registry().remote_devices().is_empty());
}

#[tokio::test]
async fn test_remote_device_expires() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config().with_remote_device_max_age(1));
    let device_node = network.node(test_config());
    let mut events = control_point.registry().subscribe();

    device_node
        .add_local_device(switch_power_device(Udn::random()))
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;

    wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceRemoved(_))).await;
    assert!(control_point.registry().remote_devices().is_empty());
}

#[tokio::test]
async fn test_filtered_advertisements_are_ignored() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config().with_discovery_filter(
        ServiceTypeFilter::Only(vec![ServiceType::uda("ContentDirectory", 1)]),
    ));
    let device_node = network.node(test_config());

    device_node
        .add_local_device(switch_power_device(Udn::random()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(control_point.registry().remote_devices().is_empty());
    assert!(network.stream_requests().is_empty());
}

#[tokio::test]
async fn test_shutdown_says_goodbye() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config());
    let device_node = network.node(test_config());
    let mut events = control_point.registry().subscribe();

    device_node
        .add_local_device(switch_power_device(Udn::random()))
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;

    device_node.shutdown().await.unwrap();
    wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceRemoved(_))).await;
    assert_eq!(
        network
            .sent_datagrams()
            .iter()
            .filter(|(_, d)| d.message.nts() == Some("ssdp:byebye"))
            .count(),
        4
    );
}
