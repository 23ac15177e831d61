//! Request-to-tunnel pipeline.
//!
//! ```text
//! validate → dial → claim transport → 200 → hijack → relay
//! ```
//!
//! Every stage before the response short-circuits to an error response.
//! Once the 200 is returned the client only ever sees raw bytes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::net::TcpStream;

use super::dialer::Dialer;
use super::events::{EventSink, TunnelEvent};
use super::hijack::Hijacker;
use super::relay::Tunnel;
use super::request::{target_authority, validate, TunnelRequest};
use crate::net::connection::{TunnelGuard, TunnelTracker};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub dialer: Dialer,
    pub events: Arc<dyn EventSink>,
    pub tracker: TunnelTracker,
}

/// Handle one inbound exchange. Only CONNECT ever gets past validation.
pub async fn connect_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
) -> Response {
    let target = target_authority(req.uri(), req.headers());
    let request = match validate(req.method(), target, client_addr) {
        Ok(request) => request,
        Err(error) => {
            state.events.record(TunnelEvent::MethodRejected {
                method: req.method(),
                path: req.uri().path(),
                client_addr,
            });
            return error.into_response();
        }
    };
    state
        .events
        .record(TunnelEvent::ConnectReceived { request: &request });

    let target = match state.dialer.dial(&request.target).await {
        Ok(target) => target,
        Err(error) => {
            state.events.record(TunnelEvent::DialFailed {
                request: &request,
                error: &error,
            });
            return error.into_response();
        }
    };

    let hijacker = match Hijacker::claim(&mut req) {
        Ok(hijacker) => hijacker,
        Err(error) => {
            // The target will never be used; release it before answering.
            drop(target);
            state.events.record(TunnelEvent::HijackFailed {
                request: &request,
                error: &error,
            });
            return error.into_response();
        }
    };

    let guard = state.tracker.track();
    tokio::spawn(run_tunnel(
        guard,
        request,
        target,
        hijacker,
        state.dialer.timeout(),
        state.events.clone(),
    ));

    StatusCode::OK.into_response()
}

/// Runs after the 200 has been handed to hyper. Owns the tunnel until it closes.
async fn run_tunnel(
    guard: TunnelGuard,
    request: TunnelRequest,
    target: TcpStream,
    hijacker: Hijacker,
    dial_timeout: Duration,
    events: Arc<dyn EventSink>,
) {
    let client = match hijacker.hijack().await {
        Ok(client) => client,
        Err(error) => {
            drop(target);
            events.record(TunnelEvent::HijackFailed {
                request: &request,
                error: &error,
            });
            return;
        }
    };

    let tunnel = Tunnel::new(guard.id(), request, client, target, dial_timeout);
    events.record(TunnelEvent::Established {
        id: tunnel.id(),
        request: tunnel.request(),
        dial_timeout: tunnel.dial_timeout(),
    });
    tunnel.run(events.as_ref()).await;

    drop(guard);
}
