//! Network transport for the RTSP control connection.
//!
//! The controller talks to the network only through [`NetworkSession`]:
//! it sends framed messages, closes connections and asks whether a
//! connection is still alive. Incoming data and closures arrive as
//! [`Event`](crate::controller::Event)s in the controller's inbox.
//!
//! [`tcp`] is the default implementation: a tokio accept loop with one
//! reader and one writer task per connection.

pub mod tcp;

use std::fmt;

pub use tcp::TcpTransport;

/// Opaque identity of an accepted transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outbound half of the network session provider.
pub trait NetworkSession: Send {
    /// Queue bytes for delivery. Fails if the connection is unknown or
    /// its writer has stopped.
    fn send(&mut self, conn: ConnectionId, data: &[u8]) -> std::io::Result<()>;

    /// Close the connection. No further events are delivered for it.
    fn close(&mut self, conn: ConnectionId);

    /// Whether the connection is still usable.
    fn is_alive(&self, conn: ConnectionId) -> bool;
}
