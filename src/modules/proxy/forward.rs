//! Outbound calls to backends.

use super::error::{ProxyError, ProxyResult};
use super::headers::strip_hop_by_hop;
use super::request::ProxyResponse;
use bytes::Bytes;
use http::{HeaderMap, Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A request bound for a specific backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Request method.
    pub method: Method,
    /// Absolute backend URL including path and query.
    pub url: String,
    /// Headers to send.
    pub headers: HeaderMap,
    /// Body to send.
    pub body: Bytes,
}

/// Boxed future returned by [`Forwarder::forward`].
pub type ForwardFuture<'a> = Pin<Box<dyn Future<Output = ProxyResult<ProxyResponse>> + Send + 'a>>;

/// Performs the backend exchange.
///
/// Any response the backend sends, whatever its status, is `Ok`; `Err` means
/// the exchange itself failed.
pub trait Forwarder: Send + Sync {
    /// Send `request` and buffer the response.
    fn forward(&self, request: OutboundRequest) -> ForwardFuture<'_>;
}

/// HTTP/1.1 forwarder over a pooled hyper client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpForwarder {
    /// Create a forwarder bounding each exchange by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, timeout }
    }

    async fn exchange(&self, request: OutboundRequest) -> ProxyResult<ProxyResponse> {
        let mut outbound = Request::builder()
            .method(request.method)
            .uri(request.url.as_str())
            .body(Full::new(request.body))
            .map_err(|e| ProxyError::Upstream(format!("invalid backend request: {e}")))?;
        *outbound.headers_mut() = request.headers;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?
            .to_bytes();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        Ok(ProxyResponse {
            status: parts.status,
            headers,
            body,
        })
    }
}

impl Forwarder for HttpForwarder {
    fn forward(&self, request: OutboundRequest) -> ForwardFuture<'_> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, self.exchange(request))
                .await
                .map_err(|_| ProxyError::Timeout(self.timeout))?
        })
    }
}
