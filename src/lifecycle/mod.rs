//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Wait for tunnels (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Established tunnels are never cancelled; shutdown only stops new ones
//! - Waiting for tunnels has a deadline: forced exit after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
