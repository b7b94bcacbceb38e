//! HTTP stream transport for UPnP.
//!
//! This crate is the byte-level HTTP boundary of the stack. It knows HTTP
//! methods, paths, headers and bodies, and nothing about devices, actions or
//! subscriptions.
//!
//! # Overview
//!
//! - [`StreamServer`]: warp-based HTTP server that accepts the UPnP verbs (GET,
//!   POST, SUBSCRIBE, UNSUBSCRIBE, NOTIFY) on any path and hands each request to
//!   a [`RequestHandler`].
//! - [`StreamClient`] / [`HttpStreamClient`]: sends a [`StreamRequest`] to an
//!   absolute URL with a bounded timeout, including the non-standard verbs.
//! - [`StreamRequest`] / [`StreamResponse`]: transport-neutral messages shared by
//!   both directions.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use stream_transport::{
//!     HttpStreamClient, Method, RequestHandler, StreamClient, StreamRequest, StreamResponse,
//!     StreamServer, StreamServerConfig,
//! };
//!
//! struct Events;
//!
//! #[async_trait]
//! impl RequestHandler for Events {
//!     async fn handle(&self, request: StreamRequest) -> StreamResponse {
//!         println!("{} with SID {:?}", request, request.header("SID"));
//!         StreamResponse::ok()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = StreamServer::bind(StreamServerConfig::default(), Arc::new(Events)).await?;
//!     let client = HttpStreamClient::new(Duration::from_secs(5), "example/1.0")?;
//!
//!     let notify = StreamRequest::new(Method::Notify, format!("{}/event/cb", server.base_url()))
//!         .with_header("SID", "uuid:1234")
//!         .with_header("SEQ", "0");
//!     let response = client.send(notify).await?;
//!     assert!(response.is_success());
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod message;
mod server;

pub use client::{HttpStreamClient, StreamClient};
pub use error::{Result, TransportError};
pub use message::{
    insert_header, HeaderMap, HeaderName, HeaderValue, Method, RemoteClient, StatusCode,
    StreamRequest, StreamResponse,
};
pub use server::{RequestHandler, StreamServer, StreamServerConfig};
