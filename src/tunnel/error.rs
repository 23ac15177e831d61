//! Tunnel error taxonomy and its HTTP mapping.

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::relay::Direction;

/// Body sent for every failure that is not the client's fault.
pub const GENERIC_FAILURE_BODY: &str = "an unknown error occurred... try again later";

/// Everything that can go wrong between receiving a request and closing its tunnel.
///
/// Each error is scoped to a single tunnel; none is retried and none is fatal
/// to the process.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The request used a method other than CONNECT.
    #[error("only CONNECT is allowed, but got {method}")]
    MethodNotAllowed { method: Method },

    /// The target could not be reached within the dial timeout.
    #[error("failed to dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The client transport cannot be detached from HTTP framing.
    #[error("client transport does not support hijacking")]
    TransportUnsupported,

    /// Detaching the client transport failed.
    #[error("failed to hijack client connection: {0}")]
    Hijack(#[source] hyper::Error),

    /// A copy direction failed mid-stream. Never user visible.
    #[error("relay {direction} failed: {source}")]
    Relay {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },
}

impl TunnelError {
    /// Short label used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            TunnelError::MethodNotAllowed { .. } => "validation",
            TunnelError::Dial { .. } => "dial",
            TunnelError::TransportUnsupported => "transport",
            TunnelError::Hijack(_) => "hijack",
            TunnelError::Relay { .. } => "relay",
        }
    }

    /// Status code reported to the client, or `None` once the response is
    /// already committed and the error can only be logged.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TunnelError::MethodNotAllowed { .. } => Some(StatusCode::METHOD_NOT_ALLOWED),
            TunnelError::Dial { .. } | TunnelError::Hijack(_) => {
                Some(StatusCode::SERVICE_UNAVAILABLE)
            }
            TunnelError::TransportUnsupported => Some(StatusCode::INTERNAL_SERVER_ERROR),
            TunnelError::Relay { .. } => None,
        }
    }

    /// Whether the error can still be delivered as an HTTP response.
    pub fn is_user_visible(&self) -> bool {
        self.status().is_some()
    }
}

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        if !self.is_user_visible() {
            tracing::warn!(error_kind = self.kind(), "Rendering an error after the response was committed");
        }

        let body = match &self {
            TunnelError::MethodNotAllowed { .. } => self.to_string(),
            _ => GENERIC_FAILURE_BODY.to_string(),
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn status_mapping() {
        let method = TunnelError::MethodNotAllowed { method: Method::GET };
        assert_eq!(method.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(method.kind(), "validation");

        let dial = TunnelError::Dial {
            target: "example.com:443".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(dial.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(dial.is_user_visible());

        assert_eq!(
            TunnelError::TransportUnsupported.status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );

        let relay = TunnelError::Relay {
            direction: Direction::TargetToClient,
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert!(!relay.is_user_visible());
        assert_eq!(relay.status(), None);
        assert_eq!(relay.kind(), "relay");
    }

    #[test]
    fn committed_errors_never_render_as_success() {
        let response = TunnelError::Relay {
            direction: Direction::ClientToTarget,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn method_body_names_the_method() {
        let response = TunnelError::MethodNotAllowed {
            method: Method::DELETE,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"only CONNECT is allowed, but got DELETE");
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response = TunnelError::Dial {
            target: "10.0.0.7:22".into(),
            source: io::Error::from(io::ErrorKind::TimedOut),
        }
        .into_response();

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], GENERIC_FAILURE_BODY.as_bytes());
    }
}
