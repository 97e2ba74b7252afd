//! TCP transport implementation for the status exchange

use crate::transport::traits::{DialError, TransportConnector, TransportStream};
use anyhow::Result;
use async_trait::async_trait;
use probe_shared::{defaults, Endpoint};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// One TCP socket owned by the current cycle
///
/// Dropping the connection closes the socket.
pub struct Connection {
    inner: TcpStream,
    peer: Endpoint,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: Endpoint) -> Self {
        Self {
            inner: stream,
            peer,
        }
    }
}

#[async_trait]
impl TransportStream for Connection {
    async fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }

    async fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.peek(buf).await
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.try_read(buf)
    }

    async fn shutdown(&mut self) -> Result<()> {
        debug!("Closing connection to {}", self.peer);
        AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// TCP connector dialing literal addresses
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector bounding each attempt by `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(defaults::CONNECT_TIMEOUT_MS))
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = Connection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream, DialError> {
        let started = Instant::now();
        match timeout(self.connect_timeout, TcpStream::connect(endpoint.socket_addr())).await {
            Ok(Ok(stream)) => {
                // Request is written in one go; no reason to delay it
                let _ = stream.set_nodelay(true);
                Ok(Connection::new(stream, *endpoint))
            }
            Ok(Err(e)) => Err(DialError::classify(*endpoint, e, started.elapsed())),
            Err(_) => Err(DialError::TimedOut {
                endpoint: *endpoint,
                elapsed: self.connect_timeout,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::transport::traits::close;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_connector_name() {
        assert_eq!(TcpConnector::default().name(), "TCP");
    }

    #[tokio::test]
    async fn test_dial_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());

        let connector = TcpConnector::default();
        let conn = connector.connect(&endpoint).await.expect("dial should succeed");

        let (_peer, _) = listener.accept().await.unwrap();
        close(conn).await;
    }

    #[tokio::test]
    async fn test_dial_without_listener_fails() {
        let endpoint = closed_endpoint().await;
        let connector = TcpConnector::new(Duration::from_secs(2));

        let err = connector.connect(&endpoint).await.err().expect("dial should fail");
        assert!(matches!(err, DialError::Refused(ep) if ep == endpoint));
    }

    #[tokio::test]
    async fn test_close_is_seen_by_peer() {
        let (conn, mut peer) = connected_pair().await;
        close(conn).await;

        let mut buf = [0u8; 8];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
