//! Transport takeover.
//!
//! hyper exposes the raw client connection through the `OnUpgrade` request
//! extension. Claiming it happens while the request is still being handled;
//! the connection itself is only handed over after hyper has written the
//! response head, so a failure at that point can no longer change the status
//! the client saw.

use axum::http::Request;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

use super::error::TunnelError;

/// The detached client connection, ready for raw byte traffic.
pub type ClientIo = TokioIo<Upgraded>;

/// A claimed, not yet detached, client transport.
#[derive(Debug)]
pub struct Hijacker {
    on_upgrade: OnUpgrade,
}

impl Hijacker {
    /// Take exclusive ownership of the client transport behind `req`.
    ///
    /// Fails when the transport cannot be detached from HTTP framing.
    pub fn claim<B>(req: &mut Request<B>) -> Result<Self, TunnelError> {
        req.extensions_mut()
            .remove::<OnUpgrade>()
            .map(|on_upgrade| Self { on_upgrade })
            .ok_or(TunnelError::TransportUnsupported)
    }

    /// Wait for hyper to release the connection.
    pub async fn hijack(self) -> Result<ClientIo, TunnelError> {
        self.on_upgrade
            .await
            .map(TokioIo::new)
            .map_err(TunnelError::Hijack)
    }
}
