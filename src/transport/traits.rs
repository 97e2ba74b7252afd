//! Transport trait abstraction for the probe's single outbound connection

use anyhow::Result;
use async_trait::async_trait;
use probe_shared::Endpoint;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a dial attempt produced no connection
#[derive(Error, Debug)]
pub enum DialError {
    #[error("connection refused by {0}")]
    Refused(Endpoint),

    #[error("{endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("connect to {endpoint} timed out after {elapsed:?}")]
    TimedOut { endpoint: Endpoint, elapsed: Duration },

    #[error("connect to {endpoint} failed: {source}")]
    Other {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    /// Classify a connect error returned by the socket layer after `elapsed`
    pub fn classify(endpoint: Endpoint, err: io::Error, elapsed: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => DialError::Refused(endpoint),
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => DialError::Unreachable {
                endpoint,
                source: err,
            },
            io::ErrorKind::TimedOut => DialError::TimedOut { endpoint, elapsed },
            _ => DialError::Other {
                endpoint,
                source: err,
            },
        }
    }

    /// Short label used in log records
    pub fn kind(&self) -> &'static str {
        match self {
            DialError::Refused(_) => "refused",
            DialError::Unreachable { .. } => "unreachable",
            DialError::TimedOut { .. } => "timed-out",
            DialError::Other { .. } => "other",
        }
    }
}

/// An open, exclusively owned byte stream to the peer
#[async_trait]
pub trait TransportStream: Send + Sync + 'static {
    /// Write the whole buffer
    async fn send_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait for data without consuming it; `Ok(0)` means the peer closed
    async fn peek(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait for data and consume it; `Ok(0)` means the peer closed
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume only data that is already available
    ///
    /// Fails with `WouldBlock` when nothing is available right now.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Shut the stream down and release it
///
/// Taking the stream by value means it cannot be used, or closed, again.
pub async fn close<S: TransportStream>(mut stream: S) {
    if let Err(e) = stream.shutdown().await {
        debug!("Transport shutdown failed: {}", e);
    }
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Make a single connection attempt; never retries
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream, DialError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
