//! Shared types for the direct TCP status probe
//!
//! This crate provides the endpoint and payload types, the HTTP request codec,
//! the per-cycle state machine and the operator-facing diagnosis used by the
//! probe binary and the status receiver.

pub mod codec;
pub mod diagnosis;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Fixed parameters of the probe
pub mod defaults {
    use std::net::Ipv4Addr;

    /// Peer address used when none is configured
    pub const HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 4);

    /// Peer port used when none is configured
    pub const PORT: u16 = 3000;

    /// Request target of the status report
    pub const STATUS_PATH: &str = "/esp32-status";

    /// Device identifier carried in the status payload
    pub const DEVICE_ID: &str = "ESP32";

    /// Content type of the status payload
    pub const CONTENT_TYPE: &str = "application/json";

    /// How long to wait for the first response byte after the request was sent
    pub const RESPONSE_TIMEOUT_MS: u64 = 5000;

    /// Delay between the end of one cycle and the start of the next
    pub const CYCLE_INTERVAL_MS: u64 = 30000;

    /// Poll period while waiting for network association
    pub const ASSOCIATION_POLL_MS: u64 = 500;

    /// Upper bound on a single TCP connect attempt
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Byte that terminates a response line
    pub const LINE_DELIMITER: u8 = b'\r';
}

/// Errors raised while constructing an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Host is not a numeric address: {0}")]
    NotAnAddress(String),

    #[error("Port out of range: {0}")]
    InvalidPort(u16),
}

/// Peer identity for every dial attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    host: IpAddr,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from a literal address; no name resolution is done
    pub fn new(host: &str, port: u16) -> Result<Self, EndpointError> {
        let host: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| EndpointError::NotAnAddress(host.to_string()))?;
        if port == 0 {
            return Err(EndpointError::InvalidPort(port));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(defaults::HOST),
            port: defaults::PORT,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Body of the status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    pub device: String,
}

impl StatusPayload {
    /// The "connected" report for a device
    pub fn connected(device: impl Into<String>) -> Self {
        Self {
            status: "connected".into(),
            device: device.into(),
        }
    }

    /// Serialize to the compact JSON text sent on the wire
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for StatusPayload {
    fn default() -> Self {
        Self::connected(defaults::DEVICE_ID)
    }
}

/// Result of one test cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Connected and the peer sent a response
    Responded,
    /// Connected but the peer stayed silent past the response timeout
    TimedOut,
    /// The peer could not be reached
    ConnectFailed,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Responded => write!(f, "responded"),
            CycleOutcome::TimedOut => write!(f, "response timeout"),
            CycleOutcome::ConnectFailed => write!(f, "connect failed"),
        }
    }
}
