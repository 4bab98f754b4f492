//! Transport-neutral request and response.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;
use std::net::SocketAddr;

/// An inbound request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Request method.
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Address of the immediate peer.
    pub remote_addr: SocketAddr,
    /// Inbound scheme.
    pub scheme: String,
    /// Host the client addressed.
    pub host: String,
    /// Port the client addressed.
    pub port: u16,
    /// Buffered request body.
    pub body: Bytes,
}

impl ProxyRequest {
    /// Create a bodiless plain-HTTP request from a peer to `localhost:80`.
    #[must_use]
    pub fn new(method: Method, path_and_query: &str, remote_addr: SocketAddr) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            remote_addr,
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 80,
            body: Bytes::new(),
        }
    }

    /// Build from hyper request parts.
    ///
    /// Host and port come from the `Host` header, falling back to the local
    /// socket address.
    #[must_use]
    pub fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Self {
        let (host, port) = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| split_host(h, 80))
            .unwrap_or_else(|| (local_addr.ip().to_string(), local_addr.port()));

        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            remote_addr,
            scheme: "http".to_string(),
            host,
            port,
            body,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host(authority: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port)) = authority.rsplit_once(':') {
        if !host.is_empty() && !port.contains(']') {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
    }
    (authority.to_string(), default_port)
}

/// A response produced by the pipeline or relayed from a backend.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Buffered body.
    pub body: Bytes,
}

impl ProxyResponse {
    /// Create a response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Plain-text response.
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status, body.into());
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// JSON response. Falls back to a 500 if `value` cannot be serialized.
    #[must_use]
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut response = Self::new(status, body);
                response
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            },
            Err(e) => Self::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("serialization failed: {e}"),
            ),
        }
    }

    /// Body as UTF-8 text, lossily.
    #[must_use]
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Convert into a hyper response.
    #[must_use]
    pub fn into_hyper(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
