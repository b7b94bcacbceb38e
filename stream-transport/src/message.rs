//! Transport-neutral HTTP messages.
//!
//! The server converts warp requests into [`StreamRequest`] and the client
//! converts [`StreamRequest`] into reqwest calls, so protocol code never sees
//! either library.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

pub use warp::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// HTTP methods used by UPnP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Subscribe,
    Unsubscribe,
    Notify,
    /// Anything else, kept verbatim so it can be rejected by the handler
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "SUBSCRIBE" => Method::Subscribe,
            "UNSUBSCRIBE" => Method::Unsubscribe,
            "NOTIFY" => Method::Notify,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Subscribe => "SUBSCRIBE",
            Method::Unsubscribe => "UNSUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Other(method) => method,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory view of the client connection behind an inbound request.
///
/// The flag flips to closed when the server drops the request future, which
/// hyper does when the peer disconnects. Long-running handlers poll
/// [`RemoteClient::is_open`] and may stop early; nothing is signalled.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    address: Option<SocketAddr>,
    open: Arc<AtomicBool>,
}

impl RemoteClient {
    pub fn new(address: Option<SocketAddr>) -> Self {
        Self {
            address,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn close_guard(&self) -> ConnectionGuard {
        ConnectionGuard {
            open: self.open.clone(),
        }
    }
}

/// Marks the connection closed when dropped.
pub(crate) struct ConnectionGuard {
    open: Arc<AtomicBool>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// An HTTP request.
///
/// For inbound requests `uri` is the path (and query) as received; for
/// outbound requests it is an absolute URL.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set on inbound requests
    pub remote_client: Option<RemoteClient>,
    /// Local address the request arrived on, set on inbound requests
    pub local_address: Option<SocketAddr>,
}

impl StreamRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_client: None,
            local_address: None,
        }
    }

    /// Add a header, silently skipping names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        insert_header(&mut self.headers, "CONTENT-TYPE", content_type);
        self.body = body.into();
        self
    }

    /// First value of `name` as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// Path component of `uri`, without query.
    pub fn path(&self) -> &str {
        let uri = self.uri.as_str();
        let without_scheme = match uri.find("://") {
            Some(idx) => {
                let rest = &uri[idx + 3..];
                rest.find('/').map(|p| &rest[p..]).unwrap_or("/")
            }
            None => uri,
        };
        without_scheme.split('?').next().unwrap_or(without_scheme)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_open(&self) -> bool {
        self.remote_client.as_ref().map_or(true, RemoteClient::is_open)
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        insert_header(&mut self.headers, "CONTENT-TYPE", content_type);
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)
    }
}

/// Append a header to `headers`, skipping invalid names or values.
pub fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.append(name, value);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("subscribe"), Method::Subscribe);
        assert_eq!(Method::parse("NOTIFY"), Method::Notify);
        assert_eq!(Method::parse("PATCH"), Method::Other("PATCH".to_string()));
        assert_eq!(Method::Unsubscribe.as_str(), "UNSUBSCRIBE");
    }

    #[test]
    fn test_path_of_relative_and_absolute_uri() {
        let relative = StreamRequest::new(Method::Get, "/dev/abc/desc?x=1");
        assert_eq!(relative.path(), "/dev/abc/desc");

        let absolute = StreamRequest::new(Method::Post, "http://10.0.0.2:8080/ctl/switch");
        assert_eq!(absolute.path(), "/ctl/switch");

        let host_only = StreamRequest::new(Method::Get, "http://10.0.0.2:8080");
        assert_eq!(host_only.path(), "/");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let request = StreamRequest::new(Method::Notify, "/cb")
            .with_header("SID", "uuid:1")
            .with_header("Bad Header", "x");

        assert_eq!(request.header("sid"), Some("uuid:1"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_remote_client_closes_on_guard_drop() {
        let client = RemoteClient::new(None);
        let guard = client.close_guard();
        assert!(client.is_open());
        drop(guard);
        assert!(!client.is_open());
    }
}
