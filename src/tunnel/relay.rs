//! Duplex relay between the client and target connections.
//!
//! # Responsibilities
//! - Copy bytes client → target and target → client on two tasks
//! - When one direction ends, force the other to end promptly
//! - Close both connections exactly once after both directions unwind
//! - Report the first error in completion order
//!
//! # Design Decisions
//! - Each connection carries a deadline. A direction that finishes expires
//!   the deadline of the connection it was writing to; the sibling direction
//!   reads from that connection and fails its pending operation at once
//!   instead of waiting on a half-open peer.
//! - An abort caused by the sibling is not an error of its own and is never
//!   reported as the tunnel's outcome.
//! - There is no bound on tunnel lifetime. Only the close is time-limited.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use super::error::TunnelError;
use super::events::{EventSink, TunnelEvent};
use super::request::TunnelRequest;
use crate::net::connection::{TunnelId, TunnelState};

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound on the orderly shutdown of one connection.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which way bytes were flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToTarget => f.write_str("client->target"),
            Direction::TargetToClient => f.write_str("target->client"),
        }
    }
}

/// What a finished tunnel reports. Only used for logging.
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// First error by completion order, tagged with its direction.
    pub error: Option<TunnelError>,
    /// The direction that terminated first.
    pub first_finished: Option<Direction>,
    pub client_to_target: u64,
    pub target_to_client: u64,
}

impl RelayOutcome {
    /// Both directions ended without an I/O error.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    fn from_reports(reports: Vec<DirectionReport>) -> Self {
        let mut outcome = RelayOutcome {
            first_finished: reports.first().map(|r| r.direction),
            ..Default::default()
        };

        for report in reports {
            match report.direction {
                Direction::ClientToTarget => outcome.client_to_target = report.bytes,
                Direction::TargetToClient => outcome.target_to_client = report.bytes,
            }
            if let CopyEnd::Failed(source) = report.end {
                if outcome.error.is_none() {
                    outcome.error = Some(TunnelError::Relay {
                        direction: report.direction,
                        source,
                    });
                }
            }
        }

        outcome
    }
}

/// How one copy direction ended.
#[derive(Debug)]
enum CopyEnd {
    /// The source reached end-of-stream.
    Eof,
    /// The source or sink raised an I/O error.
    Failed(io::Error),
    /// The sibling direction expired the source's deadline.
    Aborted,
}

#[derive(Debug)]
struct DirectionReport {
    direction: Direction,
    bytes: u64,
    end: CopyEnd,
}

/// Pending-operation deadline of one connection.
///
/// Expiring it is safe while another task is blocked on that connection; the
/// blocked operation observes it and fails.
#[derive(Debug, Clone)]
struct Deadline {
    expired: Arc<watch::Sender<bool>>,
}

impl Deadline {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            expired: Arc::new(tx),
        }
    }

    /// Move the deadline into the past.
    fn expire(&self) {
        self.expired.send_replace(true);
    }

    async fn expired(&self) {
        let mut rx = self.expired.subscribe();
        // The sender lives in `self`, so this only returns once expired.
        let _ = rx.wait_for(|expired| *expired).await;
    }
}

/// A client connection and a target connection, exclusively owned.
///
/// Created only after a successful hijack. Running it consumes it, so each
/// side is closed exactly once however the relay ends.
pub struct Tunnel<C, T> {
    id: TunnelId,
    request: TunnelRequest,
    client: C,
    target: T,
    dial_timeout: Duration,
}

impl<C, T> Tunnel<C, T>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(
        id: TunnelId,
        request: TunnelRequest,
        client: C,
        target: T,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            id,
            request,
            client,
            target,
            dial_timeout,
        }
    }

    pub fn id(&self) -> TunnelId {
        self.id
    }

    pub fn request(&self) -> &TunnelRequest {
        &self.request
    }

    /// The timeout the target side was dialed with.
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Relay until both directions have terminated, then close both sides.
    pub async fn run(self, events: &dyn EventSink) -> RelayOutcome {
        let Tunnel {
            id,
            request,
            client,
            target,
            ..
        } = self;
        let mut state = TunnelState::Created;

        advance(id, &mut state, TunnelState::Relaying, events);

        let (client_rd, client_wr) = tokio::io::split(client);
        let (target_rd, target_wr) = tokio::io::split(target);
        let client_deadline = Deadline::new();
        let target_deadline = Deadline::new();
        let (report_tx, mut report_rx) = mpsc::channel(2);

        let upstream = tokio::spawn(copy_direction(
            Direction::ClientToTarget,
            client_rd,
            target_wr,
            client_deadline.clone(),
            target_deadline.clone(),
            report_tx.clone(),
        ));
        let downstream = tokio::spawn(copy_direction(
            Direction::TargetToClient,
            target_rd,
            client_wr,
            target_deadline,
            client_deadline,
            report_tx,
        ));

        let mut reports = Vec::with_capacity(2);
        if let Some(first) = report_rx.recv().await {
            reports.push(first);
        }
        advance(id, &mut state, TunnelState::Closing, events);

        let (upstream, downstream) = tokio::join!(upstream, downstream);
        match (upstream, downstream) {
            (Ok((client_rd, target_wr)), Ok((target_rd, client_wr))) => {
                close(client_rd.unsplit(client_wr)).await;
                close(target_rd.unsplit(target_wr)).await;
            }
            (upstream, downstream) => {
                // A copy task died; whatever halves survived are dropped here,
                // which closes their sockets.
                for (direction, joined) in [
                    (Direction::ClientToTarget, upstream.err()),
                    (Direction::TargetToClient, downstream.err()),
                ] {
                    if let Some(join_error) = joined {
                        reports.push(DirectionReport {
                            direction,
                            bytes: 0,
                            end: CopyEnd::Failed(io::Error::new(io::ErrorKind::Other, join_error)),
                        });
                    }
                }
            }
        }

        while let Ok(report) = report_rx.try_recv() {
            reports.push(report);
        }
        advance(id, &mut state, TunnelState::Closed, events);
        debug_assert!(state.is_terminal());

        let outcome = RelayOutcome::from_reports(reports);
        events.record(TunnelEvent::RelayFinished {
            id,
            request: &request,
            outcome: &outcome,
        });
        outcome
    }
}

fn advance(id: TunnelId, state: &mut TunnelState, to: TunnelState, events: &dyn EventSink) {
    debug_assert!(state.can_transition_to(to), "{} -> {}", state, to);
    let from = *state;
    *state = to;
    events.record(TunnelEvent::StateChanged { id, from, to });
}

/// Copy `src` into `dst` until EOF, an I/O error, or `src`'s deadline expires.
///
/// Hands both halves back so the caller can close the reunited connections.
async fn copy_direction<R, W>(
    direction: Direction,
    mut src: R,
    mut dst: W,
    src_deadline: Deadline,
    dst_deadline: Deadline,
    reports: mpsc::Sender<DirectionReport>,
) -> (R, W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes = 0u64;

    let end = tokio::select! {
        end = pump(&mut src, &mut dst, &mut buf, &mut bytes) => end,
        _ = src_deadline.expired() => CopyEnd::Aborted,
    };

    dst_deadline.expire();

    // Capacity 2 with one report per direction: never waits.
    let _ = reports
        .send(DirectionReport {
            direction,
            bytes,
            end,
        })
        .await;

    (src, dst)
}

async fn pump<R, W>(src: &mut R, dst: &mut W, buf: &mut [u8], bytes: &mut u64) -> CopyEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = match src.read(buf).await {
            Ok(0) => return CopyEnd::Eof,
            Ok(n) => n,
            Err(e) => return CopyEnd::Failed(e),
        };
        if let Err(e) = dst.write_all(&buf[..n]).await {
            return CopyEnd::Failed(e);
        }
        if let Err(e) = dst.flush().await {
            return CopyEnd::Failed(e);
        }
        *bytes += n as u64;
    }
}

async fn close<S>(mut stream: S)
where
    S: AsyncWrite + Unpin,
{
    // Errors here only mean the peer is already gone.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await;
    drop(stream);
}
