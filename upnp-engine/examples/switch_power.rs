//! Publish a binary light and drive it from a control point.
//!
//! Two engines run in this process: one publishes a `BinaryLight` with a
//! `SwitchPower` service, the other discovers it, subscribes to its events
//! and toggles it a few times.
//!
//! ```text
//! UPNP_LOG_LEVEL=debug cargo run --example switch_power
//! ```

use std::time::Duration;

use async_trait::async_trait;
use upnp_engine::logging::{init_logging, LoggingMode};
use upnp_engine::{
    Action, ActionArgument, ActionError, ActionExecutor, ActionInvocation, Datatype, Device,
    DeviceDetails, DeviceType, EngineConfig, LocalDevice, RegistryEvent, SearchTarget, Service,
    ServiceId, ServiceReference, ServiceState, ServiceType, StateVariable, SubscriptionEvent,
    Timeout, Udn, UpnpService, Value,
};

struct SwitchPower;

#[async_trait]
impl ActionExecutor for SwitchPower {
    async fn execute(
        &self,
        invocation: &mut ActionInvocation,
        state: &ServiceState,
    ) -> Result<(), ActionError> {
        match invocation.action().name() {
            "SetTarget" => {
                let target = invocation
                    .input("NewTargetValue")
                    .cloned()
                    .unwrap_or(Value::Boolean(false));
                state.set("Target", target.clone())?;
                state.set("Status", target)?;
            }
            "GetStatus" => {
                let status = state.get("Status").unwrap_or(Value::Boolean(false));
                invocation.set_output("ResultStatus", status)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn binary_light(udn: Udn) -> LocalDevice {
    let service_id = ServiceId::uda("SwitchPower");
    let service = Service::new(ServiceType::uda("SwitchPower", 1), service_id.clone())
        .with_state_variable(StateVariable::new("Target", Datatype::Boolean))
        .with_state_variable(StateVariable::new("Status", Datatype::Boolean).evented())
        .with_action(Action::new(
            "SetTarget",
            vec![ActionArgument::input("NewTargetValue", "Target")],
        ))
        .with_action(Action::new(
            "GetStatus",
            vec![ActionArgument::output("ResultStatus", "Status").as_return_value()],
        ));

    let device = Device::local(
        udn.clone(),
        DeviceType::uda("BinaryLight", 1),
        DeviceDetails {
            friendly_name: "Example Light".to_string(),
            manufacturer: "upnp-sdk".to_string(),
            model_name: "BinaryLight".to_string(),
            ..Default::default()
        },
    )
    .with_service(service);

    LocalDevice::new(device).with_executor(ServiceReference::new(udn, service_id), SwitchPower)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingMode::Development)?;

    let light = UpnpService::start(EngineConfig::new()).await?;
    let udn = Udn::random();
    light.add_local_device(binary_light(udn.clone())).await?;
    println!("Published light {}", udn);

    let control_point = UpnpService::start(EngineConfig::control_point()).await?;
    let mut events = control_point.registry().subscribe();
    control_point
        .control_point()
        .search(SearchTarget::Udn(udn.clone()))
        .await?;

    let device = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::RemoteDeviceAdded(device)) if device.udn == udn => {
                    return Some(device)
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
    .ok_or("Light was not discovered")?;
    println!("Found {}", device.details.friendly_name);

    let service = device.services[0].clone();
    let cp = control_point.control_point();
    let mut subscription = cp.subscribe(&service, Timeout::Seconds(300)).await?;

    for target in [true, false, true] {
        let mut set = ActionInvocation::new(service.clone(), "SetTarget")?;
        set.set_input("NewTargetValue", target)?;
        cp.execute(set).await?;

        let status = cp
            .execute(ActionInvocation::new(service.clone(), "GetStatus")?)
            .await?;
        println!("Status is now {:?}", status.output("ResultStatus"));
    }

    // Established, the initial event and one per change
    for _ in 0..5 {
        match tokio::time::timeout(Duration::from_secs(2), subscription.next_event()).await {
            Ok(Some(SubscriptionEvent::Event { seq, values })) => {
                println!("Event {}: {:?}", seq, values)
            }
            Ok(Some(other)) => println!("{:?}", other),
            Ok(None) | Err(_) => break,
        }
    }

    cp.unsubscribe(&subscription).await?;
    control_point.shutdown().await?;
    light.shutdown().await?;
    Ok(())
}
