//! Header hygiene at the proxy boundary.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions (RFC 7230 list plus any
//!   header named in Connection)
//! - Strip the proxy's own front-side credential headers
//! - Append X-Forwarded-For and set X-Forwarded-Proto

use std::net::SocketAddr;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};

/// Hop-by-hop headers that must not cross the proxy boundary.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Remove hop-by-hop headers, including any named by the Connection header.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection can nominate additional single-hop headers.
    let nominated: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in nominated {
        headers.remove(&name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Remove the proxy's own front-side credential headers.
pub fn strip_front_credentials(headers: &mut HeaderMap, credential_headers: &[HeaderName]) {
    for name in credential_headers {
        headers.remove(name);
    }
}

/// Append the immediate peer to X-Forwarded-For and set X-Forwarded-Proto.
pub fn set_forwarded(headers: &mut HeaderMap, peer: SocketAddr, proto: &str) {
    let peer_ip = peer.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, peer_ip),
        None => peer_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
    if let Ok(value) = HeaderValue::from_str(proto) {
        headers.insert(X_FORWARDED_PROTO.clone(), value);
    }
}
