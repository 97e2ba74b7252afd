pub mod link;
pub mod tcp;
pub mod traits;

pub use link::{ensure_associated, RouteLink};
pub use tcp::TcpConnector;
pub use traits::{close, DialError, TransportConnector, TransportStream};
