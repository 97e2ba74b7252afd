//! Response draining: forward response lines to the operator

use crate::operator::OperatorSink;
use crate::transport::TransportStream;
use probe_shared::codec::{LineDecoder, MAX_LINE_SIZE};
use std::io;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// When the drain stops reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Stop as soon as no data is currently available.
    ///
    /// A peer that pauses between packets can be cut short.
    #[default]
    BestEffort,
    /// Read until the peer closes, giving up after `idle` without data
    UntilClosed,
}

/// What a drain observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    pub lines: usize,
    pub bytes: usize,
    /// Whether the peer's end-of-stream was seen
    pub peer_closed: bool,
    /// Lines cut at the length limit rather than at a delimiter
    pub overlong_lines: usize,
}

/// Read the response and emit each line to the operator as it is read
///
/// Lines are delimited by carriage returns. `idle` only applies to
/// `DrainPolicy::UntilClosed`.
pub async fn drain_and_emit<S: TransportStream>(
    stream: &mut S,
    policy: DrainPolicy,
    idle: Duration,
    sink: &mut dyn OperatorSink,
) -> DrainSummary {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 1024];
    let mut summary = DrainSummary::default();

    loop {
        let read = match policy {
            DrainPolicy::BestEffort => match stream.try_recv(&mut buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!("No more data available, drain stops");
                    break;
                }
                other => other,
            },
            DrainPolicy::UntilClosed => match timeout(idle, stream.recv(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    warn!("Peer idle for {:?} before closing, drain stops", idle);
                    break;
                }
            },
        };

        match read {
            Ok(0) => {
                summary.peer_closed = true;
                break;
            }
            Ok(n) => {
                summary.bytes += n;
                decoder.extend(&buf[..n]);
                while let Some(line) = decoder.decode_next() {
                    sink.line(&line);
                    summary.lines += 1;
                }
            }
            Err(e) => {
                warn!("Read error while draining response: {}", e);
                break;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        sink.line(&rest);
        summary.lines += 1;
    }

    summary.overlong_lines = decoder.forced_splits();
    if summary.overlong_lines > 0 {
        warn!(
            "{} response lines exceeded {} bytes and were split",
            summary.overlong_lines, MAX_LINE_SIZE
        );
    }

    debug!(
        "Drained {} bytes in {} lines (peer closed: {})",
        summary.bytes, summary.lines, summary.peer_closed
    );
    summary
}
