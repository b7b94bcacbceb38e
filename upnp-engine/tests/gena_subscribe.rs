//! GENA eventing between a control point and a published switch power light.

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use common::{
    dimmable_light_device, dimming_reference, switch_power_device, switch_power_reference,
    test_config, wait_for, MemoryNetwork,
};
use stream_transport::{Method, StatusCode, StreamRequest};
use upnp_engine::{
    ActionInvocation, Namespace, RegistryEvent, Service, SubscriptionEndReason,
    SubscriptionEvent, SubscriptionHandle, Timeout, Udn, UpnpService, Value,
};

struct Setup {
    network: Arc<MemoryNetwork>,
    control_point: UpnpService,
    device_node: UpnpService,
    udn: Udn,
    service: Arc<Service>,
}

async fn setup() -> Setup {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config());
    let mut events = control_point.registry().subscribe();
    let device_node = network.node(test_config());
    let udn = Udn::random();
    device_node
        .add_local_device(switch_power_device(udn.clone()))
        .await
        .expect("Failed to add local device");

    let event = wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;
    let RegistryEvent::RemoteDeviceAdded(device) = event else {
        unreachable!()
    };
    let service = device.services[0].clone();
    Setup {
        network,
        control_point,
        device_node,
        udn,
        service,
    }
}

async fn next(handle: &mut SubscriptionHandle) -> SubscriptionEvent {
    tokio::time::timeout(Duration::from_secs(2), handle.next_event())
        .await
        .expect("Timed out waiting for subscription event")
        .expect("Subscription event channel closed")
}

/// Skip past `Established` and the initial event.
async fn subscribed(setup: &Setup, timeout: Timeout) -> SubscriptionHandle {
    let mut handle = setup
        .control_point
        .control_point()
        .subscribe(&setup.service, timeout)
        .await
        .expect("Subscribe failed");
    assert!(matches!(next(&mut handle).await, SubscriptionEvent::Established { .. }));
    assert!(matches!(next(&mut handle).await, SubscriptionEvent::Event { seq: 0, .. }));
    handle
}

#[tokio::test]
async fn test_initial_event_follows_established() {
    let setup = setup().await;
    let mut handle = setup
        .control_point
        .control_point()
        .subscribe(&setup.service, Timeout::Seconds(300))
        .await
        .unwrap();

    match next(&mut handle).await {
        SubscriptionEvent::Established { sid, timeout } => {
            assert_eq!(sid, handle.sid());
            assert!(sid.starts_with("uuid:"));
            assert_eq!(timeout, Timeout::Seconds(300));
        }
        other => panic!("Expected Established, got {:?}", other),
    }
    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Event {
            seq: 0,
            values: vec![("Status".to_string(), Value::Boolean(false))],
        }
    );

    let local = setup
        .device_node
        .registry()
        .local_subscriptions_of(&switch_power_reference(&setup.udn));
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].sid, handle.sid());
}

#[tokio::test]
async fn test_initial_event_carries_every_evented_variable() {
    let network = MemoryNetwork::new();
    let control_point = network.node(test_config());
    let mut events = control_point.registry().subscribe();
    let device_node = network.node(test_config());
    let udn = Udn::random();
    device_node
        .add_local_device(dimmable_light_device(udn.clone()))
        .await
        .expect("Failed to add local device");

    let event = wait_for(&mut events, |e| matches!(e, RegistryEvent::RemoteDeviceAdded(_))).await;
    let RegistryEvent::RemoteDeviceAdded(device) = event else {
        unreachable!()
    };
    let mut handle = control_point
        .control_point()
        .subscribe(&device.services[0], Timeout::Seconds(300))
        .await
        .unwrap();

    assert!(matches!(next(&mut handle).await, SubscriptionEvent::Established { .. }));
    match next(&mut handle).await {
        SubscriptionEvent::Event { seq, values } => {
            assert_eq!(seq, 0);
            assert_eq!(values.len(), 2);
            assert!(values.contains(&("LoadLevelStatus".to_string(), Value::Unsigned(0))));
            assert!(values.contains(&("IsRamping".to_string(), Value::Boolean(false))));
        }
        other => panic!("Expected the initial event, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.try_next_event().is_none());
    let initial_notifies = network
        .stream_requests()
        .into_iter()
        .filter(|r| {
            r.method == Method::Notify
                && r.header("SID") == Some(handle.sid())
                && r.header("SEQ") == Some("0")
        })
        .count();
    assert_eq!(initial_notifies, 1);
    assert_eq!(
        device_node
            .registry()
            .local_subscriptions_of(&dimming_reference(&udn))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_state_changes_are_sequenced() {
    let setup = setup().await;
    let mut handle = subscribed(&setup, Timeout::Seconds(300)).await;

    let mut invocation = ActionInvocation::new(setup.service.clone(), "SetTarget").unwrap();
    invocation.set_input("NewTargetValue", true).unwrap();
    setup
        .control_point
        .control_point()
        .execute(invocation)
        .await
        .unwrap();
    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Event {
            seq: 1,
            values: vec![("Status".to_string(), Value::Boolean(true))],
        }
    );

    setup
        .device_node
        .set_state_variable(&switch_power_reference(&setup.udn), "Status", false)
        .unwrap();
    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Event {
            seq: 2,
            values: vec![("Status".to_string(), Value::Boolean(false))],
        }
    );
}

/// NOTIFY as the publisher would send it, delivered straight to the
/// control point's router.
async fn notify(setup: &Setup, sid: &str, seq: u32, status: &str) -> StatusCode {
    let path = Namespace::new().event_callback_path(&setup.service.reference());
    let request = StreamRequest::new(Method::Notify, path)
        .with_header("NT", "upnp:event")
        .with_header("NTS", "upnp:propchange")
        .with_header("SID", sid)
        .with_header("SEQ", &seq.to_string())
        .with_body(
            "text/xml",
            upnp_soap::write_property_set(&[("Status".to_string(), status.to_string())]),
        );
    setup.control_point.router().received_stream(request).await.status
}

#[tokio::test]
async fn test_skipped_sequence_is_forwarded_and_stale_dropped() {
    let setup = setup().await;
    let mut handle = subscribed(&setup, Timeout::Seconds(300)).await;
    let sid = handle.sid().to_string();

    assert_eq!(notify(&setup, &sid, 3, "1").await, StatusCode::OK);
    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Event {
            seq: 3,
            values: vec![("Status".to_string(), Value::Boolean(true))],
        }
    );

    // Late delivery of an older event
    assert_eq!(notify(&setup, &sid, 2, "0").await, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.try_next_event().is_none());
    assert_eq!(
        setup
            .control_point
            .registry()
            .remote_subscription(&sid)
            .unwrap()
            .last_sequence,
        Some(3)
    );

    assert_eq!(notify(&setup, &sid, 4, "0").await, StatusCode::OK);
    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Event {
            seq: 4,
            values: vec![("Status".to_string(), Value::Boolean(false))],
        }
    );
}

#[tokio::test]
async fn test_unchanged_value_sends_nothing() {
    let setup = setup().await;
    let mut handle = subscribed(&setup, Timeout::Seconds(300)).await;

    setup
        .device_node
        .set_state_variable(&switch_power_reference(&setup.udn), "Status", false)
        .unwrap();
    setup
        .device_node
        .set_state_variable(&switch_power_reference(&setup.udn), "Target", true)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.try_next_event().is_none());
}

#[tokio::test]
async fn test_unsubscribe_ends_both_sides() {
    let setup = setup().await;
    let mut handle = subscribed(&setup, Timeout::Seconds(300)).await;
    let mut device_events = setup.device_node.registry().subscribe();

    setup
        .control_point
        .control_point()
        .unsubscribe(&handle)
        .await
        .expect("Unsubscribe failed");

    assert_eq!(
        next(&mut handle).await,
        SubscriptionEvent::Ended {
            reason: SubscriptionEndReason::Unsubscribed
        }
    );
    assert!(setup
        .control_point
        .registry()
        .remote_subscription(handle.sid())
        .is_none());

    let event = wait_for(&mut device_events, |e| {
        matches!(e, RegistryEvent::SubscriptionEnded { .. })
    })
    .await;
    assert!(matches!(
        event,
        RegistryEvent::SubscriptionEnded {
            reason: SubscriptionEndReason::Unsubscribed,
            ..
        }
    ));
    assert!(setup
        .device_node
        .registry()
        .local_subscriptions_of(&switch_power_reference(&setup.udn))
        .is_empty());
}

#[tokio::test]
async fn test_unreachable_subscriber_is_dropped() {
    let setup = setup().await;
    let _handle = subscribed(&setup, Timeout::Seconds(300)).await;
    let mut device_events = setup.device_node.registry().subscribe();

    // Control point is the first node on the network
    setup.network.cut(Ipv4Addr::new(10, 0, 0, 1));
    let reference = switch_power_reference(&setup.udn);
    setup
        .device_node
        .set_state_variable(&reference, "Status", true)
        .unwrap();
    setup
        .device_node
        .set_state_variable(&reference, "Status", false)
        .unwrap();

    let event = wait_for(&mut device_events, |e| {
        matches!(e, RegistryEvent::SubscriptionEnded { .. })
    })
    .await;
    assert!(matches!(
        event,
        RegistryEvent::SubscriptionEnded {
            reason: SubscriptionEndReason::DeliveryFailure,
            ..
        }
    ));
    assert!(setup
        .device_node
        .registry()
        .local_subscriptions_of(&reference)
        .is_empty());
}

#[tokio::test]
async fn test_short_subscription_is_renewed() {
    let setup = setup().await;
    let mut handle = subscribed(&setup, Timeout::Seconds(2)).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let renewals = setup
        .network
        .stream_requests()
        .into_iter()
        .filter(|r| r.method == Method::Subscribe && r.header("SID") == Some(handle.sid()))
        .count();
    assert!(renewals >= 1);
    assert!(setup
        .control_point
        .registry()
        .remote_subscription(handle.sid())
        .is_some());
    assert_eq!(
        setup
            .device_node
            .registry()
            .local_subscriptions_of(&switch_power_reference(&setup.udn))
            .len(),
        1
    );
    assert!(!matches!(
        handle.try_next_event(),
        Some(SubscriptionEvent::Ended { .. })
    ));
}

#[tokio::test]
async fn test_subscribe_to_vanished_device_fails() {
    let setup = setup().await;
    setup.device_node.shutdown().await.unwrap();

    let result = setup
        .control_point
        .control_point()
        .subscribe(&setup.service, Timeout::Seconds(300))
        .await;
    assert!(result.is_err());
}
