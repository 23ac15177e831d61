//! CONNECT tunneling subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP exchange (already TLS-terminated)
//!     → request.rs (CONNECT only, target authority untouched)
//!     → dialer.rs (TCP connect bounded by the dial timeout)
//!     → hijack.rs (take the client transport away from HTTP framing)
//!     → relay.rs (copy both ways, abort the idle side, close both)
//! ```
//!
//! # Design Decisions
//! - Errors before the hijack become HTTP responses; after it they are only logged
//! - The dialed target is released on every path that does not reach the relay
//! - Components report to an injected [`EventSink`] instead of logging directly

pub mod dialer;
pub mod error;
pub mod events;
pub mod handler;
pub mod hijack;
pub mod relay;
pub mod request;

pub use dialer::{Dialer, DEFAULT_DIAL_TIMEOUT};
pub use error::TunnelError;
pub use events::{EventSink, TracingSink, TunnelEvent};
pub use handler::{connect_handler, AppState};
pub use hijack::Hijacker;
pub use relay::{Direction, RelayOutcome, Tunnel};
pub use request::TunnelRequest;
