//! Decoding tests against datagrams captured from real devices.
//!
//! Devices disagree on header case, spacing and line endings; the codec must
//! accept all of them.

use rstest::rstest;
use upnp_ssdp::{SsdpMessage, StartLine};

const ROUTER_ALIVE: &str = "NOTIFY * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
CACHE-CONTROL: max-age=120\r\n\
LOCATION: http://192.168.1.1:49152/rootDesc.xml\r\n\
SERVER: Linux/4.4 UPnP/1.1 MiniUPnPd/2.1\r\n\
NT: urn:schemas-upnp-org:service:WANIPConnection:2\r\n\
USN: uuid:9f0865b3-f5da-4ad5-85b7-7404637fdf37::urn:schemas-upnp-org:service:WANIPConnection:2\r\n\
NTS: ssdp:alive\r\n\
OPT: \"http://schemas.upnp.org/upnp/1/0/\"; ns=01\r\n\
01-NLS: 1\r\n\
BOOTID.UPNP.ORG: 1\r\n\
CONFIGID.UPNP.ORG: 1337\r\n\
\r\n";

const RENDERER_BYEBYE: &str = "NOTIFY * HTTP/1.1\n\
Host:239.255.255.250:1900\n\
Nt:urn:schemas-upnp-org:device:MediaRenderer:1\n\
Nts:ssdp:byebye\n\
Usn:uuid:5f9ec1b3-ed59-1900-4530-00a0dee8d1b0::urn:schemas-upnp-org:device:MediaRenderer:1\n\
\n";

const TV_SEARCH_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
Cache-Control: max-age = 1800\r\n\
Date: Thu, 01 Jan 1970 00:03:21 GMT\r\n\
Ext: \r\n\
Location: http://192.168.1.20:52235/dmr/SamsungMRDesc.xml\r\n\
Server: SHP, UPnP/1.0, Samsung UPnP SDK/1.0\r\n\
ST: upnp:rootdevice\r\n\
USN: uuid:0a4b2d8a-00be-1000-b7f8-a8a1a2b3c4d5::upnp:rootdevice\r\n\
Content-Length: 0\r\n\
\r\n";

const WINDOWS_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
Host:239.255.255.250:1900\r\n\
ST:urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\
Man:\"ssdp:discover\"\r\n\
MX:3\r\n\
\r\n";

#[test]
fn test_router_alive() {
    let message = SsdpMessage::parse(ROUTER_ALIVE.as_bytes()).unwrap();

    assert_eq!(message.start_line, StartLine::Notify);
    assert_eq!(message.nts(), Some("ssdp:alive"));
    assert_eq!(message.max_age(), Some(120));
    assert_eq!(
        message.location(),
        Some("http://192.168.1.1:49152/rootDesc.xml")
    );
    assert_eq!(message.header("configid.upnp.org"), Some("1337"));
}

#[test]
fn test_renderer_byebye_without_spaces() {
    let message = SsdpMessage::parse(RENDERER_BYEBYE.as_bytes()).unwrap();

    assert_eq!(message.nts(), Some("ssdp:byebye"));
    assert_eq!(message.nt(), Some("urn:schemas-upnp-org:device:MediaRenderer:1"));
    assert!(message.location().is_none());
    assert!(message.max_age().is_none());
}

#[test]
fn test_tv_search_response() {
    let message = SsdpMessage::parse(TV_SEARCH_RESPONSE.as_bytes()).unwrap();

    assert_eq!(
        message.start_line,
        StartLine::Response {
            status: 200,
            reason: "OK".to_string()
        }
    );
    assert_eq!(message.max_age(), Some(1800));
    assert_eq!(message.st(), Some("upnp:rootdevice"));
}

#[test]
fn test_windows_search() {
    let message = SsdpMessage::parse(WINDOWS_SEARCH.as_bytes()).unwrap();

    assert_eq!(message.start_line, StartLine::MSearch);
    assert_eq!(message.mx(), Some(3));
    assert_eq!(message.header("MAN"), Some("\"ssdp:discover\""));
}

#[rstest]
#[case(ROUTER_ALIVE)]
#[case(RENDERER_BYEBYE)]
#[case(TV_SEARCH_RESPONSE)]
#[case(WINDOWS_SEARCH)]
fn test_reencoding_is_stable(#[case] raw: &str) {
    let first = SsdpMessage::parse(raw.as_bytes()).unwrap();
    let second = SsdpMessage::parse(first.encode().as_bytes()).unwrap();
    assert_eq!(first, second);
}
