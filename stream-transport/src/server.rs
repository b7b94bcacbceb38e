//! HTTP server for inbound UPnP stream traffic.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};
use warp::Filter;

use crate::error::{Result, TransportError};
use crate::message::{HeaderMap, Method, RemoteClient, StreamRequest, StreamResponse};

/// Receives every request the server accepts.
///
/// The server itself has no routing: descriptor GETs, control POSTs,
/// SUBSCRIBE/UNSUBSCRIBE and event NOTIFYs all reach the handler, which
/// decides on the response.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: StreamRequest) -> StreamResponse;
}

/// Bind options for [`StreamServer`].
#[derive(Debug, Clone)]
pub struct StreamServerConfig {
    /// Address to bind
    /// Default: 0.0.0.0
    pub bind_address: IpAddr,

    /// Range of ports to try, inclusive; `(0, 0)` lets the OS choose
    /// Default: (0, 0)
    pub port_range: (u16, u16),

    /// Address advertised in callback and descriptor URLs
    /// Default: detected from the routing table
    pub advertised_address: Option<IpAddr>,
}

impl Default for StreamServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_range: (0, 0),
            advertised_address: None,
        }
    }
}

/// HTTP server accepting GET, POST, SUBSCRIBE, UNSUBSCRIBE and NOTIFY.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use stream_transport::{RequestHandler, StreamRequest, StreamResponse, StreamServer, StreamServerConfig};
///
/// struct Hello;
///
/// #[async_trait]
/// impl RequestHandler for Hello {
///     async fn handle(&self, _request: StreamRequest) -> StreamResponse {
///         StreamResponse::ok().with_body("text/plain", "hello")
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let server = StreamServer::bind(StreamServerConfig::default(), Arc::new(Hello))
///         .await
///         .expect("Failed to start stream server");
///     println!("Listening at {}", server.base_url());
///     server.shutdown().await;
/// }
/// ```
pub struct StreamServer {
    /// The bound socket address
    local_address: SocketAddr,
    /// `http://<advertised ip>:<port>`
    base_url: String,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl StreamServer {
    /// Bind a port in the configured range and start serving.
    pub async fn bind(config: StreamServerConfig, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        let (start, end) = config.port_range;
        let port = Self::find_available_port(config.bind_address, start, end).ok_or_else(|| {
            TransportError::Bind(format!("No available port found in range {}-{}", start, end))
        })?;

        let advertised = match config.advertised_address {
            Some(ip) => ip,
            None if !config.bind_address.is_unspecified() => config.bind_address,
            None => Self::detect_local_ip().ok_or_else(|| {
                TransportError::Bind("Failed to detect local IP address".to_string())
            })?,
        };

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let routes = Self::routes(handler);

        let (local_address, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(SocketAddr::new(config.bind_address, port), async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        let base_url = format!("http://{}:{}", advertised, local_address.port());
        info!(%local_address, %base_url, "Stream server listening");

        let server_handle = tokio::spawn(server);

        Ok(Self {
            local_address,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL of this server for callback and descriptor URLs.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.local_address.port()
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        debug!(local_address = %self.local_address, "Stream server stopped");
    }

    fn routes(
        handler: Arc<dyn RequestHandler>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
        warp::method()
            .and(warp::path::full())
            .and(
                warp::query::raw()
                    .map(Some)
                    .or(warp::any().map(|| None::<String>))
                    .unify(),
            )
            .and(warp::header::headers_cloned())
            .and(warp::addr::remote())
            .and(warp::body::bytes())
            .and_then(
                move |method: warp::http::Method,
                      path: warp::path::FullPath,
                      query: Option<String>,
                      headers: HeaderMap,
                      remote: Option<SocketAddr>,
                      body: bytes::Bytes| {
                    let handler = handler.clone();
                    async move {
                        let uri = match query {
                            Some(q) => format!("{}?{}", path.as_str(), q),
                            None => path.as_str().to_string(),
                        };
                        let remote_client = RemoteClient::new(remote);
                        // Flips `is_open` when hyper drops this future
                        let _guard = remote_client.close_guard();

                        let request = StreamRequest {
                            method: Method::parse(method.as_str()),
                            uri,
                            headers,
                            body,
                            remote_client: Some(remote_client),
                            local_address: None,
                        };
                        debug!(%request, ?remote, "Incoming stream request");

                        let response = handler.handle(request).await;
                        Ok::<_, warp::Rejection>(into_reply(response))
                    }
                },
            )
            .recover(handle_rejection)
    }

    /// Find an available port in the given range.
    fn find_available_port(bind: IpAddr, start: u16, end: u16) -> Option<u16> {
        if start == 0 {
            return Some(0);
        }
        (start..=end).find(|&port| Self::is_port_available(bind, port))
    }

    /// Check if a port is available for binding.
    fn is_port_available(bind: IpAddr, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(bind, port)).is_ok()
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// This uses a UDP socket connection to determine the local IP address
    /// that would be used for outbound connections. No data is actually sent.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> std::result::Result<impl warp::Reply, std::convert::Infallible> {
    let code = if err.is_not_found() {
        warp::http::StatusCode::NOT_FOUND
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        warp::http::StatusCode::PAYLOAD_TOO_LARGE
    } else {
        warp::http::StatusCode::BAD_REQUEST
    };
    debug!(?err, %code, "Rejected stream request");

    Ok(warp::reply::with_status(code.canonical_reason().unwrap_or(""), code))
}

fn into_reply(response: StreamResponse) -> warp::reply::Response {
    let mut reply = warp::reply::Response::new(response.body.into());
    *reply.status_mut() = response.status;
    *reply.headers_mut() = response.headers;
    reply
}
