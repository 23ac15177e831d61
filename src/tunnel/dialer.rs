//! Timeout-bounded TCP dialing of tunnel targets.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

use super::error::TunnelError;

/// Dial timeout used when none is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens raw TCP connections to tunnel targets.
///
/// The timeout is fixed when the dialer is built; the connection it returns
/// has had no handshake of any kind performed on it.
#[derive(Debug, Clone, Copy)]
pub struct Dialer {
    timeout: Duration,
}

impl Dialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect to `target` (`host:port`), resolving names as needed.
    pub async fn dial(&self, target: &str) -> Result<TcpStream, TunnelError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(target_addr = %target, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok(stream)
            }
            Ok(Err(source)) => Err(TunnelError::Dial {
                target: target.to_string(),
                source,
            }),
            Err(_) => Err(TunnelError::Dial {
                target: target.to_string(),
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.timeout),
                ),
            }),
        }
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}
