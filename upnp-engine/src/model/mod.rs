//! Device, service and subscription model.

mod action;
mod datatype;
mod device;
mod service;
mod state_variable;
mod subscription;
mod types;

pub use action::{Action, ActionArgument, ActionInvocation, Direction};
pub use datatype::{Datatype, Value};
pub use device::{
    Device, DeviceDetails, DeviceOrigin, Icon, RemoteIdentity, DEFAULT_MAX_AGE_SECONDS,
};
pub use service::{Service, ServiceEndpoints, ServiceReference};
pub use state_variable::{AllowedValueRange, StateVariable};
pub use subscription::{
    next_sequence, EventLane, LocalSubscription, RemoteSubscription, SequenceCheck, Subscription,
    SubscriptionEndReason, SubscriptionEvent,
};
pub use types::{
    DeviceType, InvalidType, NamedDeviceType, NamedServiceType, NotificationSubtype, ServiceId,
    ServiceType, Udn, UDA_NAMESPACE, UDA_SERVICE_ID_NAMESPACE,
};
