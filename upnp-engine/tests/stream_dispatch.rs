//! Inbound stream requests answered by a device node's router.

mod common;

use common::{switch_power_device, switch_power_reference, test_config, MemoryNetwork};
use rstest::rstest;
use stream_transport::{Method, StatusCode, StreamRequest};
use upnp_engine::{Namespace, Udn, UpnpService};

async fn light() -> (UpnpService, Udn) {
    let network = MemoryNetwork::new();
    let node = network.node(test_config());
    let udn = Udn::random();
    node.add_local_device(switch_power_device(udn.clone()))
        .await
        .expect("Failed to add local device");
    (node, udn)
}

#[tokio::test]
async fn test_device_descriptor_is_served() {
    let (node, udn) = light().await;
    let path = Namespace::new().device_descriptor_path(&udn);

    let response = node
        .router()
        .received_stream(StreamRequest::new(Method::Get, path))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let xml = response.body_text();
    assert!(xml.contains("<friendlyName>Kitchen Light</friendlyName>"));
    assert!(xml.contains(&format!("<UDN>uuid:{}</UDN>", udn.id())));
}

#[tokio::test]
async fn test_service_descriptor_is_served() {
    let (node, udn) = light().await;
    let path = Namespace::new().service_descriptor_path(&switch_power_reference(&udn));

    let response = node
        .router()
        .received_stream(StreamRequest::new(Method::Get, path))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let xml = response.body_text();
    assert!(xml.contains("<name>SetTarget</name>"));
    assert!(xml.contains("sendEvents=\"yes\""));
}

#[rstest]
#[case::unknown_method(Method::Other("PATCH".to_string()), "/dev/x/desc", StatusCode::METHOD_NOT_ALLOWED)]
#[case::post_outside_control(Method::Post, "/nowhere", StatusCode::NOT_FOUND)]
#[case::get_unknown_device(Method::Get, "/dev/nobody/desc", StatusCode::NOT_FOUND)]
#[case::notify_outside_callback(Method::Notify, "/dev/x/svc/upnp-org/SwitchPower/action", StatusCode::NOT_FOUND)]
#[tokio::test]
async fn test_unroutable_requests(
    #[case] method: Method,
    #[case] path: &str,
    #[case] expected: StatusCode,
) {
    let (node, _) = light().await;
    let response = node
        .router()
        .received_stream(StreamRequest::new(method, path))
        .await;
    assert_eq!(response.status, expected);
}

#[tokio::test]
async fn test_disabled_router_is_unavailable() {
    let (node, udn) = light().await;
    node.router().disable();

    let response = node
        .router()
        .received_stream(StreamRequest::new(
            Method::Get,
            Namespace::new().device_descriptor_path(&udn),
        ))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_subscribe_without_callback_is_refused() {
    let (node, udn) = light().await;
    let path = Namespace::new().event_subscription_path(&switch_power_reference(&udn));

    let request = StreamRequest::new(Method::Subscribe, path)
        .with_header("NT", "upnp:event")
        .with_header("TIMEOUT", "Second-300");
    let response = node.router().received_stream(request).await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_subscribe_is_granted() {
    let (node, udn) = light().await;
    let reference = switch_power_reference(&udn);
    let path = Namespace::new().event_subscription_path(&reference);

    let request = StreamRequest::new(Method::Subscribe, path)
        .with_header("CALLBACK", "<http://10.0.0.9:8080/cb>")
        .with_header("NT", "upnp:event")
        .with_header("TIMEOUT", "Second-120");
    let response = node.router().received_stream(request).await;

    assert_eq!(response.status, StatusCode::OK);
    let sid = response.header("SID").expect("SID header").to_string();
    assert!(sid.starts_with("uuid:"));
    assert_eq!(response.header("TIMEOUT"), Some("Second-120"));
    assert!(node.registry().local_subscription(&sid).is_some());
}

#[rstest]
#[case::zero_raised_to_minimum("Second-0", "Second-1")]
#[case::huge_lowered_to_maximum("Second-4294967295", "Second-3600")]
#[case::infinite_gets_default("Second-infinite", "Second-1800")]
#[tokio::test]
async fn test_granted_timeout_is_clamped(#[case] requested: &str, #[case] granted: &str) {
    let (node, udn) = light().await;
    let path = Namespace::new().event_subscription_path(&switch_power_reference(&udn));

    let request = StreamRequest::new(Method::Subscribe, path)
        .with_header("CALLBACK", "<http://10.0.0.9:8080/cb>")
        .with_header("NT", "upnp:event")
        .with_header("TIMEOUT", requested);
    let response = node.router().received_stream(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("TIMEOUT"), Some(granted));
    let sid = response.header("SID").expect("SID header");
    assert!(node.registry().local_subscription(sid).is_some());
}

#[rstest]
#[case::renewal_with_callback(&[("SID", "uuid:whatever"), ("CALLBACK", "<http://10.0.0.9/cb>")], StatusCode::BAD_REQUEST)]
#[case::renewal_of_unknown_sid(&[("SID", "uuid:whatever")], StatusCode::PRECONDITION_FAILED)]
#[case::wrong_nt(&[("CALLBACK", "<http://10.0.0.9/cb>"), ("NT", "upnp:propchange")], StatusCode::PRECONDITION_FAILED)]
#[tokio::test]
async fn test_bad_subscribe_requests(
    #[case] headers: &[(&str, &str)],
    #[case] expected: StatusCode,
) {
    let (node, udn) = light().await;
    let path = Namespace::new().event_subscription_path(&switch_power_reference(&udn));

    let request = headers
        .iter()
        .fold(StreamRequest::new(Method::Subscribe, path), |request, (name, value)| {
            request.with_header(name, value)
        });
    let response = node.router().received_stream(request).await;
    assert_eq!(response.status, expected);
}

#[tokio::test]
async fn test_unsubscribe_without_sid_is_refused() {
    let (node, udn) = light().await;
    let path = Namespace::new().event_subscription_path(&switch_power_reference(&udn));

    let response = node
        .router()
        .received_stream(StreamRequest::new(Method::Unsubscribe, path))
        .await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
}

#[rstest]
#[case::missing_nt(&[("NTS", "upnp:propchange"), ("SID", "uuid:x"), ("SEQ", "0")], StatusCode::BAD_REQUEST)]
#[case::wrong_nts(&[("NT", "upnp:event"), ("NTS", "ssdp:alive"), ("SID", "uuid:x"), ("SEQ", "0")], StatusCode::PRECONDITION_FAILED)]
#[case::missing_sid(&[("NT", "upnp:event"), ("NTS", "upnp:propchange"), ("SEQ", "0")], StatusCode::PRECONDITION_FAILED)]
#[case::bad_seq(&[("NT", "upnp:event"), ("NTS", "upnp:propchange"), ("SID", "uuid:x"), ("SEQ", "first")], StatusCode::BAD_REQUEST)]
#[case::unknown_sid(&[("NT", "upnp:event"), ("NTS", "upnp:propchange"), ("SID", "uuid:x"), ("SEQ", "0")], StatusCode::PRECONDITION_FAILED)]
#[tokio::test]
async fn test_bad_event_notifications(
    #[case] headers: &[(&str, &str)],
    #[case] expected: StatusCode,
) {
    let (node, udn) = light().await;
    let path = Namespace::new().event_callback_path(&switch_power_reference(&udn));

    let request = headers.iter().fold(
        StreamRequest::new(Method::Notify, path).with_body(
            "text/xml",
            upnp_soap::write_property_set(&[("Status".to_string(), "1".to_string())]),
        ),
        |request, (name, value)| request.with_header(name, value),
    );
    let response = node.router().received_stream(request).await;
    assert_eq!(response.status, expected);
}
