//! Tunnel lifecycle events.
//!
//! The pipeline never logs directly. It reports what happened to an
//! [`EventSink`], and the sink decides how to record it. [`TracingSink`] is
//! the production sink and writes structured `tracing` events.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::Method;

use super::error::TunnelError;
use super::relay::RelayOutcome;
use super::request::TunnelRequest;
use crate::net::connection::{TunnelId, TunnelState};

/// Something observable that happened while serving a request.
#[derive(Debug)]
pub enum TunnelEvent<'a> {
    /// A request with a method other than CONNECT was refused.
    MethodRejected {
        method: &'a Method,
        path: &'a str,
        client_addr: SocketAddr,
    },

    /// A CONNECT request passed validation.
    ConnectReceived { request: &'a TunnelRequest },

    /// The target could not be dialed; the client gets a 503.
    DialFailed {
        request: &'a TunnelRequest,
        error: &'a TunnelError,
    },

    /// The client transport could not be taken over. The dialed target has
    /// already been released when this is reported.
    HijackFailed {
        request: &'a TunnelRequest,
        error: &'a TunnelError,
    },

    /// Both connections are owned by a new tunnel.
    Established {
        id: TunnelId,
        request: &'a TunnelRequest,
        dial_timeout: Duration,
    },

    /// The tunnel moved along its state machine.
    StateChanged {
        id: TunnelId,
        from: TunnelState,
        to: TunnelState,
    },

    /// Both directions have finished and both connections are closed.
    RelayFinished {
        id: TunnelId,
        request: &'a TunnelRequest,
        outcome: &'a RelayOutcome,
    },
}

impl TunnelEvent<'_> {
    /// Stable name of the event variant.
    pub fn name(&self) -> &'static str {
        match self {
            TunnelEvent::MethodRejected { .. } => "method_rejected",
            TunnelEvent::ConnectReceived { .. } => "connect_received",
            TunnelEvent::DialFailed { .. } => "dial_failed",
            TunnelEvent::HijackFailed { .. } => "hijack_failed",
            TunnelEvent::Established { .. } => "established",
            TunnelEvent::StateChanged { .. } => "state_changed",
            TunnelEvent::RelayFinished { .. } => "relay_finished",
        }
    }
}

/// Receives tunnel events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: TunnelEvent<'_>);
}

/// Sink that writes every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: TunnelEvent<'_>) {
        match event {
            TunnelEvent::MethodRejected {
                method,
                path,
                client_addr,
            } => {
                tracing::debug!(
                    method = %method,
                    path = %path,
                    client_addr = %client_addr,
                    "Received non-CONNECT request"
                );
            }
            TunnelEvent::ConnectReceived { request } => {
                tracing::debug!(
                    client_addr = %request.client_addr,
                    target_addr = %request.target,
                    "Received new CONNECT request"
                );
            }
            TunnelEvent::DialFailed { request, error } => {
                tracing::error!(
                    client_addr = %request.client_addr,
                    target_addr = %request.target,
                    error_kind = error.kind(),
                    error = %error,
                    "Failed to dial target"
                );
            }
            TunnelEvent::HijackFailed { request, error } => {
                tracing::error!(
                    client_addr = %request.client_addr,
                    target_addr = %request.target,
                    error_kind = error.kind(),
                    error = %error,
                    "Failed to hijack client connection"
                );
            }
            TunnelEvent::Established {
                id,
                request,
                dial_timeout,
            } => {
                tracing::debug!(
                    tunnel_id = %id,
                    client_addr = %request.client_addr,
                    target_addr = %request.target,
                    dial_timeout_ms = dial_timeout.as_millis() as u64,
                    "Tunnel established"
                );
            }
            TunnelEvent::StateChanged { id, from, to } => {
                tracing::trace!(tunnel_id = %id, from = %from, to = %to, "Tunnel state changed");
            }
            TunnelEvent::RelayFinished {
                id,
                request,
                outcome,
            } => match &outcome.error {
                Some(error) => {
                    tracing::error!(
                        tunnel_id = %id,
                        client_addr = %request.client_addr,
                        target_addr = %request.target,
                        error_kind = error.kind(),
                        error = %error,
                        bytes_to_target = outcome.client_to_target,
                        bytes_to_client = outcome.target_to_client,
                        "Failed to forward bytes between client and target"
                    );
                }
                None => {
                    tracing::debug!(
                        tunnel_id = %id,
                        client_addr = %request.client_addr,
                        target_addr = %request.target,
                        bytes_to_target = outcome.client_to_target,
                        bytes_to_client = outcome.target_to_client,
                        "Tunnel closed"
                    );
                }
            },
        }
    }
}
