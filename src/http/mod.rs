//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (ALPN http/1.1)
//!     → server.rs (axum-server, Router fallback)
//!     → tunnel::handler (CONNECT pipeline)
//!     → 200 and hijack, or an error response
//! ```

pub mod server;

pub use server::{build_router, ProxyServer};
