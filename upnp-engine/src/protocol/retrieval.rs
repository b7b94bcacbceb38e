//! Descriptor retrieval, in both directions.
//!
//! Remote devices are hydrated from their device descriptor plus one service
//! descriptor per service before they enter the registry. Local devices get
//! their descriptors and icons served from the namespace paths.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use stream_transport::{Method, StatusCode, StreamRequest, StreamResponse};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{DescriptorError, RegistrationError};
use crate::model::{Device, DeviceOrigin, Service, ServiceReference, Udn};
use crate::namespace::Resource;
use crate::registry::RegistryEvent;
use crate::router::Router;

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Releases the claim on a descriptor URL.
struct RetrievalClaim {
    router: Arc<Router>,
    location: Url,
}

impl Drop for RetrievalClaim {
    fn drop(&mut self) {
        self.router.end_retrieval(&self.location);
    }
}

/// Retrieve and parse all descriptors of an advertised device and add it to
/// the registry. Concurrent retrievals of one URL collapse into the first.
pub async fn retrieve_remote_descriptors(
    router: Arc<Router>,
    udn: Udn,
    location: Url,
    max_age: u32,
    discovered_on: Option<IpAddr>,
) {
    if !router.begin_retrieval(&location) {
        trace!(%location, "Descriptor retrieval already running");
        return;
    }
    let _claim = RetrievalClaim {
        router: router.clone(),
        location: location.clone(),
    };

    let registry = router.registry();
    registry.emit(RegistryEvent::RemoteDeviceDiscoveryStarted {
        udn: udn.clone(),
        location: location.clone(),
    });

    let failure = match hydrate(&router, &location, max_age, discovered_on).await {
        Ok(device) => match registry.add_remote_device(device) {
            Ok(device) => {
                debug!(udn = %device.udn, %location, "Remote device hydrated");
                return;
            }
            Err(RegistrationError::ShuttingDown) => return,
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    warn!(%udn, %location, reason = %failure, "Remote device discovery failed");
    registry.emit(RegistryEvent::RemoteDeviceDiscoveryFailed {
        udn,
        location,
        reason: failure,
    });
}

async fn hydrate(
    router: &Router,
    location: &Url,
    max_age: u32,
    discovered_on: Option<IpAddr>,
) -> Result<Device, DescriptorError> {
    let xml = fetch(router, location).await?;
    let mut device = router.binder().parse_device(&xml, location)?;
    stamp(&mut device, max_age, discovered_on);

    let mut hydrated = HashMap::new();
    for service in device.all_services() {
        let endpoints = service.endpoints.as_ref().ok_or_else(|| {
            DescriptorError::Invalid(format!("Service {} has no SCPD URL", service.service_id))
        })?;
        let xml = fetch(router, &endpoints.descriptor_url).await?;
        let parsed = router.binder().parse_service(&xml, service)?;
        hydrated.insert(service.reference(), parsed);
    }
    replace_services(&mut device, &mut hydrated);

    info!(
        udn = %device.udn,
        name = %device.details.friendly_name,
        services = device.all_services().len(),
        "Retrieved remote device descriptors"
    );
    Ok(device)
}

async fn fetch(router: &Router, url: &Url) -> Result<String, DescriptorError> {
    let mut request = StreamRequest::new(Method::Get, url.as_str());
    for (name, value) in &router.config().descriptor_retrieval_headers {
        request = request.with_header(name, value);
    }

    let response = router
        .send_stream(request)
        .await
        .map_err(|e| DescriptorError::Retrieval(format!("{}: {}", url, e)))?;
    if !response.is_success() {
        return Err(DescriptorError::Retrieval(format!(
            "{} answered {}",
            url, response.status
        )));
    }
    Ok(response.body_text())
}

/// Set expiry and discovery interface on every device of the tree.
fn stamp(device: &mut Device, max_age: u32, discovered_on: Option<IpAddr>) {
    device.max_age = max_age;
    if let DeviceOrigin::Remote(identity) = &mut device.origin {
        identity.discovered_on = discovered_on;
    }
    for embedded in &mut device.embedded {
        stamp(embedded, max_age, discovered_on);
    }
}

fn replace_services(device: &mut Device, hydrated: &mut HashMap<ServiceReference, Service>) {
    for service in &mut device.services {
        if let Some(parsed) = hydrated.remove(&service.reference()) {
            *service = Arc::new(parsed);
        }
    }
    for embedded in &mut device.embedded {
        replace_services(embedded, hydrated);
    }
}

/// Serve descriptors and icons of local devices.
pub(crate) fn receive_retrieval(router: &Router, request: StreamRequest) -> StreamResponse {
    if !request.is_open() {
        debug!(path = request.path(), "Client gone, skipping retrieval");
        return StreamResponse::new(StatusCode::REQUEST_TIMEOUT);
    }

    let registry = router.registry();
    let local_root = |udn: &Udn| {
        registry
            .local_devices()
            .into_iter()
            .find(|root| root.find_device(udn).is_some())
    };

    let result = match router.namespace().resolve(request.path()) {
        Some(Resource::DeviceDescriptor(udn)) => match local_root(&udn) {
            Some(root) => router
                .binder()
                .generate_device(&root, router.namespace())
                .map(xml_response),
            None => Ok(not_found()),
        },
        Some(Resource::ServiceDescriptor(reference)) => match registry.local_service(&reference) {
            Some((service, _)) => router.binder().generate_service(&service).map(xml_response),
            None => Ok(not_found()),
        },
        Some(Resource::Icon(udn, index)) => {
            let icon = local_root(&udn).and_then(|root| {
                root.find_device(&udn)
                    .and_then(|device| device.icons.get(index))
                    .and_then(|icon| icon.data.clone().map(|data| (icon.mime_type.clone(), data)))
            });
            Ok(match icon {
                Some((mime_type, data)) => StreamResponse::ok().with_body(&mime_type, data),
                None => not_found(),
            })
        }
        _ => Ok(not_found()),
    };

    result.unwrap_or_else(|e| {
        warn!(path = request.path(), error = %e, "Failed to generate descriptor");
        StreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

fn xml_response(xml: String) -> StreamResponse {
    StreamResponse::ok().with_body(XML_CONTENT_TYPE, xml)
}

fn not_found() -> StreamResponse {
    StreamResponse::new(StatusCode::NOT_FOUND)
}
