//! Path rewriting, session cookies and forwarding headers.

use super::request::ProxyRequest;
use http::header::{COOKIE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-authenticate",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Split `/service/rest` into `("service", "/rest")`.
///
/// Returns `None` when the path has no service segment.
#[must_use]
pub fn split_service(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (service, rest) = match trimmed.find('/') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    if service.is_empty() {
        None
    } else {
        Some((service, rest))
    }
}

/// Whether `path` is `prefix` or lies below it.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    !prefix.is_empty()
        && path
            .strip_prefix(prefix)
            .is_some_and(|tail| tail.is_empty() || tail.starts_with('/'))
}

/// Path to request from the backend.
///
/// The service segment is stripped, unless the remainder is under the
/// introspection prefix, in which case the original path is kept.
#[must_use]
pub fn backend_path(full_path: &str, rest: &str, introspection_prefix: &str) -> String {
    if under_prefix(rest, introspection_prefix) {
        full_path.to_string()
    } else if rest.is_empty() {
        "/".to_string()
    } else {
        rest.to_string()
    }
}

/// Client identity: first `X-Forwarded-For` entry, else the peer IP.
#[must_use]
pub fn client_ip(request: &ProxyRequest) -> String {
    request
        .headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| request.remote_addr.ip().to_string(), str::to_string)
}

/// `host`, plus `:port` unless the port is 80 or 443.
#[must_use]
pub fn forwarded_host(host: &str, port: u16) -> String {
    if port == 80 || port == 443 {
        host.to_string()
    } else {
        format!("{host}:{port}")
    }
}

/// Value of the named cookie, if present and non-empty.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value binding a session.
#[must_use]
pub fn session_cookie(name: &str, session_id: &str, max_age_secs: u64) -> String {
    format!("{name}={session_id}; Path=/; HttpOnly; Max-Age={max_age_secs}")
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Headers for the backend request: inbound headers minus hop-by-hop and
/// `Host`, plus the forwarding headers.
#[must_use]
pub fn upstream_headers(request: &ProxyRequest, client_ip: &str) -> HeaderMap {
    let mut headers = request.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);

    let peer = request.remote_addr.ip().to_string();
    let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {peer}"),
        _ => peer,
    };

    set(&mut headers, X_FORWARDED_FOR, &chain);
    set(&mut headers, X_FORWARDED_PROTO, &request.scheme);
    set(&mut headers, X_REAL_IP, client_ip);
    set(
        &mut headers,
        X_FORWARDED_HOST,
        &forwarded_host(&request.host, request.port),
    );
    headers
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
