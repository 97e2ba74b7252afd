//! Network association: bring the link up and block until it has an address

use crate::operator::OperatorSink;
use anyhow::Result;
use async_trait::async_trait;
use probe_shared::Endpoint;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Association state reported by a link adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Not yet associated
    Pending,
    /// Associated with the given local address
    Connected(IpAddr),
}

/// A network interface that can join a network
#[async_trait]
pub trait LinkAdapter: Send {
    /// Start joining the network identified by `ssid`
    async fn begin(&mut self, ssid: &str, credential: &str) -> Result<()>;

    /// Current association state
    async fn status(&mut self) -> LinkStatus;
}

/// Host link: associated once the OS can route to the peer
///
/// The local address is the one the OS picks for traffic to the peer. It is
/// found by connecting a UDP socket, which sends no packets.
pub struct RouteLink {
    peer: Endpoint,
}

impl RouteLink {
    pub fn new(peer: Endpoint) -> Self {
        Self { peer }
    }
}

#[async_trait]
impl LinkAdapter for RouteLink {
    async fn begin(&mut self, ssid: &str, _credential: &str) -> Result<()> {
        // Joining is owned by the host OS; the credential is not used here
        info!("Using host network (configured network: {:?})", ssid);
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        let unspecified: IpAddr = match self.peer.host() {
            IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };

        let socket = match UdpSocket::bind(SocketAddr::new(unspecified, 0)).await {
            Ok(s) => s,
            Err(e) => {
                debug!("Link probe bind failed: {}", e);
                return LinkStatus::Pending;
            }
        };
        if let Err(e) = socket.connect(self.peer.socket_addr()).await {
            debug!("No route to {}: {}", self.peer, e);
            return LinkStatus::Pending;
        }
        match socket.local_addr() {
            Ok(addr) if !addr.ip().is_unspecified() => LinkStatus::Connected(addr.ip()),
            _ => LinkStatus::Pending,
        }
    }
}

/// Join the network and block until associated, retrying forever
///
/// Prints a progress dot for every poll that finds the link still pending.
pub async fn ensure_associated<L: LinkAdapter + ?Sized>(
    link: &mut L,
    ssid: &str,
    credential: &str,
    poll_interval: Duration,
    sink: &mut dyn OperatorSink,
) -> Result<IpAddr> {
    sink.line("Connecting to WiFi...");
    link.begin(ssid, credential).await?;

    let mut polls: u64 = 0;
    let local = loop {
        match link.status().await {
            LinkStatus::Connected(ip) => break ip,
            LinkStatus::Pending => {
                polls += 1;
                tokio::time::sleep(poll_interval).await;
                sink.partial(".");
            }
        }
    };

    sink.line("");
    sink.line("WiFi connected!");
    sink.line(&format!("IP address: {}", local));
    info!("Associated after {} pending polls, local address {}", polls, local);
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::MemorySink;

    /// Reports pending a fixed number of times, then connected
    struct ScriptedLink {
        pending_polls: u32,
        began_with: Option<String>,
    }

    #[async_trait]
    impl LinkAdapter for ScriptedLink {
        async fn begin(&mut self, ssid: &str, _credential: &str) -> Result<()> {
            self.began_with = Some(ssid.to_string());
            Ok(())
        }

        async fn status(&mut self) -> LinkStatus {
            if self.pending_polls == 0 {
                LinkStatus::Connected(IpAddr::from([10, 0, 0, 7]))
            } else {
                self.pending_polls -= 1;
                LinkStatus::Pending
            }
        }
    }

    #[tokio::test]
    async fn test_waits_until_associated() {
        let mut link = ScriptedLink {
            pending_polls: 3,
            began_with: None,
        };
        let mut sink = MemorySink::new();

        let ip = ensure_associated(&mut link, "lab-net", "secret", Duration::from_millis(1), &mut sink)
            .await
            .unwrap();

        assert_eq!(ip, IpAddr::from([10, 0, 0, 7]));
        assert_eq!(link.began_with.as_deref(), Some("lab-net"));
        assert_eq!(sink.lines()[1], "...");
        assert!(sink.position("IP address: 10.0.0.7").is_some());
    }

    #[tokio::test]
    async fn test_route_link_to_loopback() {
        let mut link = RouteLink::new(Endpoint::new("127.0.0.1", 3000).unwrap());
        assert_eq!(link.status().await, LinkStatus::Connected(IpAddr::from([127, 0, 0, 1])));
    }
}
