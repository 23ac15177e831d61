//! Tunnel identity, state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for tracing
//! - Define the tunnel state machine (Created → Relaying → Closing → Closed)
//! - Count live tunnels so shutdown can wait for them to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global atomic counter for tunnel IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    /// Generate a new unique tunnel ID.
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Tunnel state for lifecycle tracking.
///
/// ```text
/// Created → Relaying → Closing → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Both connections exist; bytes are not flowing yet.
    Created,
    /// Both directions are copying.
    Relaying,
    /// One direction has terminated; the other is being forced down.
    Closing,
    /// Both directions have unwound and both connections are released.
    Closed,
}

impl TunnelState {
    /// Whether `next` is the single legal successor of this state.
    pub fn can_transition_to(self, next: TunnelState) -> bool {
        matches!(
            (self, next),
            (TunnelState::Created, TunnelState::Relaying)
                | (TunnelState::Relaying, TunnelState::Closing)
                | (TunnelState::Closing, TunnelState::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == TunnelState::Closed
    }
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TunnelState::Created => "created",
            TunnelState::Relaying => "relaying",
            TunnelState::Closing => "closing",
            TunnelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks live tunnels for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    /// Current count of live tunnels.
    active_count: Arc<AtomicU64>,
}

impl TunnelTracker {
    /// Create a new tunnel tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live tunnel. Returns a guard that decrements on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        TunnelGuard {
            active_count: Arc::clone(&self.active_count),
            id: TunnelId::new(),
        }
    }

    /// Get current live tunnel count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tunnel has closed.
    pub async fn wait_for_drain(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a tunnel's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct TunnelGuard {
    active_count: Arc<AtomicU64>,
    id: TunnelId,
}

impl TunnelGuard {
    /// Get this tunnel's ID.
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(tunnel_id = %self.id, "Tunnel released");
    }
}
