//! First-byte wait with a monotonic deadline

use crate::transport::TransportStream;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// What the peer did before the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one response byte is available
    Ready,
    /// Nothing arrived before the deadline
    TimedOut,
    /// The peer closed (or reset) the connection without sending anything
    Closed,
}

/// Wait up to `limit` for response data, without consuming it
///
/// Call right after the request was fully sent: the deadline is taken from
/// the monotonic clock on entry. The wait is a readiness await, not a spin.
pub async fn await_first_byte<S: TransportStream>(stream: &S, limit: Duration) -> WaitOutcome {
    let started = Instant::now();
    let deadline = started + limit;
    let mut probe = [0u8; 1];

    match timeout_at(deadline, stream.peek(&mut probe)).await {
        Ok(Ok(0)) => {
            debug!("Peer closed after {:?} without data", started.elapsed());
            WaitOutcome::Closed
        }
        Ok(Ok(_)) => {
            debug!("First response byte after {:?}", started.elapsed());
            WaitOutcome::Ready
        }
        Ok(Err(e)) => {
            warn!("Error while waiting for response: {}", e);
            WaitOutcome::Closed
        }
        Err(_) => WaitOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tcp::test_support::connected_pair;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_ready_when_peer_writes() {
        let (conn, mut peer) = connected_pair().await;
        peer.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();

        let outcome = await_first_byte(&conn, Duration::from_secs(2)).await;
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test]
    async fn test_times_out_on_silent_peer() {
        let (conn, _peer) = connected_pair().await;
        let limit = Duration::from_millis(150);

        let started = std::time::Instant::now();
        let outcome = await_first_byte(&conn, limit).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(elapsed >= limit, "returned early after {:?}", elapsed);
        assert!(elapsed < limit + Duration::from_secs(1), "overran: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_closed_when_peer_hangs_up() {
        let (conn, peer) = connected_pair().await;
        drop(peer);

        let outcome = await_first_byte(&conn, Duration::from_secs(2)).await;
        assert_eq!(outcome, WaitOutcome::Closed);
    }

    #[tokio::test]
    async fn test_wait_does_not_consume_data() {
        let (mut conn, mut peer) = connected_pair().await;
        peer.write_all(b"abc").await.unwrap();

        assert_eq!(await_first_byte(&conn, Duration::from_secs(2)).await, WaitOutcome::Ready);

        let mut buf = [0u8; 8];
        let n = conn.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abc");
    }
}
