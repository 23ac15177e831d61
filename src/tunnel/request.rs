//! CONNECT request validation.
//!
//! Only the method is checked. The target authority is forwarded to the
//! dialer exactly as received; a malformed `host:port` surfaces as a dial
//! failure rather than a validation failure.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, Method, Uri};

use super::error::TunnelError;

/// An accepted CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub method: Method,
    /// Target authority (`host:port`), untouched.
    pub target: String,
    pub client_addr: SocketAddr,
}

/// Extract the tunnel target from a request.
///
/// CONNECT carries the authority as its request target; the `Host` header is
/// only consulted when the URI has none.
pub fn target_authority(uri: &Uri, headers: &HeaderMap) -> String {
    if let Some(authority) = uri.authority() {
        return authority.as_str().to_string();
    }

    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Accept CONNECT, reject everything else.
pub fn validate(
    method: &Method,
    target: String,
    client_addr: SocketAddr,
) -> Result<TunnelRequest, TunnelError> {
    if *method != Method::CONNECT {
        return Err(TunnelError::MethodNotAllowed {
            method: method.clone(),
        });
    }

    Ok(TunnelRequest {
        method: method.clone(),
        target,
        client_addr,
    })
}
