//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (TLS handshake, ALPN pinned to http/1.1)
//!     → HTTP layer (CONNECT exchange)
//!     → connection.rs (tunnel id, state machine, live-tunnel tracking)
//!
//! Tunnel States:
//!     Created → Relaying → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - TLS is mandatory; the proxy is only reachable over HTTPS
//! - Each tunnel tracked so shutdown can report and wait for it

pub mod connection;
pub mod tls;
