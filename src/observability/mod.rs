//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! tunnel pipeline
//!     → tunnel::events (TunnelEvent into an EventSink)
//!     → TracingSink (structured tracing events)
//!     → logging.rs (subscriber: filter + pretty/JSON output)
//! ```

pub mod logging;
