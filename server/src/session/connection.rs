//! A single request/response exchange with one reporting device

use crate::routes::{self, Response};
use anyhow::Result;
use probe_shared::codec::{HttpRequest, RequestDecoder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How an exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A response with this status was written
    Answered(u16),
    /// The client went away before a full request arrived
    Abandoned,
}

/// One accepted connection
pub struct ReportSession {
    stream: TcpStream,
    addr: SocketAddr,
    decoder: RequestDecoder,
    read_buf: Vec<u8>,
    read_timeout: Duration,
}

impl ReportSession {
    pub fn new(stream: TcpStream, addr: SocketAddr, read_timeout: Duration) -> Self {
        Self {
            stream,
            addr,
            decoder: RequestDecoder::new(),
            read_buf: vec![0u8; 4096],
            read_timeout,
        }
    }

    /// Read one request, answer it and close the connection
    pub async fn serve(mut self) -> Result<SessionOutcome> {
        let response = match self.recv().await {
            Ok(Some(request)) => routes::route(&request, &routes::timestamp()),
            Ok(None) => {
                debug!("Client {} disconnected before completing a request", self.addr);
                return Ok(SessionOutcome::Abandoned);
            }
            Err(e) => {
                warn!("Bad request from {}: {}", self.addr, e);
                routes::malformed(&e.to_string(), &routes::timestamp())
            }
        };

        self.respond(&response).await?;
        Ok(SessionOutcome::Answered(response.status))
    }

    /// Read until a full request is buffered
    ///
    /// Returns `Ok(None)` if the client closes or stalls first.
    async fn recv(&mut self) -> Result<Option<HttpRequest>> {
        loop {
            if let Some(request) = self.decoder.decode_next()? {
                return Ok(Some(request));
            }

            match timeout(self.read_timeout, self.stream.read(&mut self.read_buf)).await {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => self.decoder.extend(&self.read_buf[..n]),
                Ok(Err(e)) => {
                    warn!("Read error from {}: {}", self.addr, e);
                    return Ok(None);
                }
                Err(_) => {
                    warn!(
                        "Client {} idle for {:?} with {} bytes buffered",
                        self.addr,
                        self.read_timeout,
                        self.decoder.buffer_len()
                    );
                    return Ok(None);
                }
            }
        }
    }

    async fn respond(&mut self, response: &Response) -> Result<()> {
        self.stream.write_all(&response.encode()).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        debug!("Answered {} with {}", self.addr, response.status);
        Ok(())
    }
}
