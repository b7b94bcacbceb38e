//! Device descriptor parsing.

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::DescriptorError;
use crate::logging::VIOLATION_TARGET;
use crate::model::{
    Device, DeviceDetails, DeviceType, Icon, RemoteIdentity, Service, ServiceEndpoints, ServiceId,
    ServiceType, Udn,
};

/// UPnP device description root element.
#[derive(Debug, Deserialize)]
struct Root {
    #[serde(rename = "URLBase")]
    url_base: Option<String>,
    device: DeviceDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceDescription {
    device_type: String,
    #[serde(default)]
    friendly_name: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(rename = "manufacturerURL")]
    manufacturer_url: Option<String>,
    model_description: Option<String>,
    #[serde(default)]
    model_name: String,
    model_number: Option<String>,
    #[serde(rename = "modelURL")]
    model_url: Option<String>,
    serial_number: Option<String>,
    #[serde(rename = "UDN")]
    udn: String,
    #[serde(rename = "UPC")]
    upc: Option<String>,
    #[serde(rename = "presentationURL")]
    presentation_url: Option<String>,
    icon_list: Option<IconList>,
    service_list: Option<ServiceList>,
    device_list: Option<DeviceList>,
}

#[derive(Debug, Deserialize)]
struct IconList {
    #[serde(rename = "icon", default)]
    icons: Vec<IconDescription>,
}

#[derive(Debug, Deserialize)]
struct IconDescription {
    #[serde(default)]
    mimetype: String,
    width: Option<String>,
    height: Option<String>,
    depth: Option<String>,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(rename = "service", default)]
    services: Vec<ServiceDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDescription {
    service_type: String,
    service_id: String,
    #[serde(rename = "SCPDURL")]
    scpd_url: String,
    #[serde(rename = "controlURL")]
    control_url: String,
    #[serde(rename = "eventSubURL", default)]
    event_sub_url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceDescription>,
}

pub(super) fn parse_device(xml: &str, descriptor_url: &Url) -> Result<Device, DescriptorError> {
    let root: Root = quick_xml::de::from_str(xml)
        .map_err(|e| DescriptorError::Parse(format!("Failed to parse device XML: {}", e)))?;

    // URLBase is deprecated but still sent by older stacks
    let base = root
        .url_base
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .and_then(|b| Url::parse(b).ok())
        .unwrap_or_else(|| descriptor_url.clone());

    let identity = RemoteIdentity {
        descriptor_url: descriptor_url.clone(),
        discovered_on: None,
    };
    root.device.into_device(&base, &identity)
}

impl DeviceDescription {
    fn into_device(self, base: &Url, identity: &RemoteIdentity) -> Result<Device, DescriptorError> {
        let udn: Udn = self
            .udn
            .parse()
            .map_err(|e| DescriptorError::Invalid(format!("{}", e)))?;
        let device_type: DeviceType = self
            .device_type
            .parse()
            .map_err(|e| DescriptorError::Invalid(format!("{}", e)))?;

        let details = DeviceDetails {
            friendly_name: self.friendly_name.trim().to_string(),
            manufacturer: self.manufacturer.trim().to_string(),
            manufacturer_url: trimmed(self.manufacturer_url),
            model_name: self.model_name.trim().to_string(),
            model_description: trimmed(self.model_description),
            model_number: trimmed(self.model_number),
            model_url: trimmed(self.model_url),
            serial_number: trimmed(self.serial_number),
            upc: trimmed(self.upc),
            presentation_url: trimmed(self.presentation_url)
                .and_then(|u| resolve(base, &u).ok())
                .map(|u| u.to_string()),
        };

        let mut device = Device::remote(udn.clone(), device_type, details, identity.clone());

        for icon in self.icon_list.map(|l| l.icons).unwrap_or_default() {
            match resolve(base, &icon.url) {
                Ok(url) => {
                    device = device.with_icon(Icon {
                        mime_type: icon.mimetype.trim().to_string(),
                        width: number(icon.width),
                        height: number(icon.height),
                        depth: number(icon.depth),
                        url: url.to_string(),
                        data: None,
                    })
                }
                Err(e) => warn!(
                    target: VIOLATION_TARGET,
                    %udn, url = %icon.url, "Skipping icon with invalid URL: {}", e
                ),
            }
        }

        for description in self.service_list.map(|l| l.services).unwrap_or_default() {
            match description.into_service(base) {
                Ok(service) => device = device.with_service(service),
                Err(e) => warn!(target: VIOLATION_TARGET, %udn, "Skipping service: {}", e),
            }
        }

        for embedded in self.device_list.map(|l| l.devices).unwrap_or_default() {
            device = device.with_embedded(embedded.into_device(base, identity)?);
        }

        Ok(device)
    }
}

impl ServiceDescription {
    fn into_service(self, base: &Url) -> Result<Service, DescriptorError> {
        let service_type: ServiceType = self
            .service_type
            .parse()
            .map_err(|e| DescriptorError::Invalid(format!("{}", e)))?;
        let service_id = ServiceId::parse_lenient(&self.service_id).ok_or_else(|| {
            DescriptorError::Invalid(format!("Invalid serviceId: {}", self.service_id))
        })?;

        let endpoints = ServiceEndpoints {
            descriptor_url: resolve(base, &self.scpd_url)?,
            control_url: resolve(base, &self.control_url)?,
            event_subscription_url: resolve(base, &self.event_sub_url)?,
        };

        Ok(Service::new(service_type, service_id).with_endpoints(endpoints))
    }
}

/// Resolve a descriptor URL, absolute or relative to `base`.
fn resolve(base: &Url, value: &str) -> Result<Url, DescriptorError> {
    base.join(value.trim())
        .map_err(|e| DescriptorError::Invalid(format!("Invalid URL '{}': {}", value, e)))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number(value: Option<String>) -> u32 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <URLBase>http://192.168.1.1:49152/</URLBase>
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName> Router </friendlyName>
    <manufacturer>MiniUPnP</manufacturer>
    <modelName>MiniUPnPd</modelName>
    <UDN>uuid:9f0865b3-f5da-4ad5-85b7-7404637fdf37</UDN>
    <iconList>
      <icon><mimetype>image/png</mimetype><width>48</width><height>48</height><depth>24</depth><url>/icon.png</url></icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-microsoft-com:service:OSInfo:1</serviceType>
        <serviceId>urn:microsoft-com:serviceId:OSInfo1</serviceId>
        <SCPDURL>/osinfo.xml</SCPDURL>
        <controlURL>/ctl/OSInfo</controlURL>
        <eventSubURL>/evt/OSInfo</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <friendlyName>WANDevice</friendlyName>
        <UDN>uuid:9f0865b3-f5da-4ad5-85b7-7404637fdf38</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:WANCommonIFC1</serviceId>
            <SCPDURL>wancommonifc.xml</SCPDURL>
            <controlURL>/ctl/CommonIfCfg</controlURL>
            <eventSubURL>/evt/CommonIfCfg</eventSubURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_router_with_url_base() {
        let location = Url::parse("http://192.168.1.1:5000/rootDesc.xml").unwrap();
        let device = parse_device(ROUTER_XML, &location).unwrap();

        assert_eq!(device.udn, Udn::new("9f0865b3-f5da-4ad5-85b7-7404637fdf37"));
        assert_eq!(device.details.friendly_name, "Router");
        assert_eq!(device.icons[0].url, "http://192.168.1.1:49152/icon.png");
        assert_eq!(device.icons[0].width, 48);

        let service = &device.services[0];
        assert_eq!(service.udn, device.udn);
        assert_eq!(
            service.endpoints.as_ref().unwrap().control_url.as_str(),
            "http://192.168.1.1:49152/ctl/OSInfo"
        );

        let wan = &device.embedded[0];
        assert_eq!(wan.details.friendly_name, "WANDevice");
        assert_eq!(
            wan.services[0].endpoints.as_ref().unwrap().descriptor_url.as_str(),
            "http://192.168.1.1:49152/wancommonifc.xml"
        );
        assert_eq!(
            device.remote_identity().unwrap().descriptor_url,
            location
        );
    }

    #[test]
    fn test_relative_urls_resolve_against_location() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0"><device>
            <deviceType>urn:schemas-upnp-org:device:BinaryLight:1</deviceType>
            <UDN>uuid:light</UDN>
            <serviceList><service>
              <serviceType>urn:schemas-upnp-org:service:SwitchPower:1</serviceType>
              <serviceId>urn:upnp-org:serviceId:SwitchPower</serviceId>
              <SCPDURL>svc/desc</SCPDURL>
              <controlURL>svc/action</controlURL>
              <eventSubURL>svc/event</eventSubURL>
            </service></serviceList>
        </device></root>"#;

        let location = Url::parse("http://10.0.0.9:8080/dev/light/desc").unwrap();
        let device = parse_device(xml, &location).unwrap();
        let endpoints = device.services[0].endpoints.as_ref().unwrap();
        assert_eq!(
            endpoints.event_subscription_url.as_str(),
            "http://10.0.0.9:8080/dev/light/svc/event"
        );
    }

    #[test]
    fn test_invalid_services_are_skipped() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:BinaryLight:1</deviceType>
            <UDN>uuid:light</UDN>
            <serviceList><service>
              <serviceType>SwitchPower</serviceType>
              <serviceId>urn:upnp-org:serviceId:SwitchPower</serviceId>
              <SCPDURL>/desc</SCPDURL>
              <controlURL>/action</controlURL>
            </service></serviceList>
        </device></root>"#;

        let location = Url::parse("http://10.0.0.9/desc").unwrap();
        let device = parse_device(xml, &location).unwrap();
        assert!(device.services.is_empty());
    }

    #[test]
    fn test_invalid_udn_or_xml() {
        let location = Url::parse("http://10.0.0.9/desc").unwrap();
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:BinaryLight:1</deviceType>
            <UDN>light</UDN>
        </device></root>"#;

        assert!(matches!(
            parse_device(xml, &location),
            Err(DescriptorError::Invalid(_))
        ));
        assert!(matches!(
            parse_device("<html>", &location),
            Err(DescriptorError::Parse(_))
        ));
    }
}
