//! Fire-and-forget network client for frequent, small, loss-tolerant
//! messages such as statsd metrics.
//!
//! ```no_run
//! use ephemeral_socket::{EphemeralSocket, SocketOptions};
//!
//! let client = EphemeralSocket::new(&SocketOptions::default())?;
//! client.send("requests:1|c");
//! client.close();
//! # Ok::<(), ephemeral_socket::BuildError>(())
//! ```

pub mod builder;
pub mod rate_limited_warner;
pub mod socket;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use builder::{BuildError, EphemeralSocketBuilder};
pub use socket::{
    ClientSnapshot, ClientState, ConnectionPhase, Dialer, EphemeralSocket, SocketConfig,
    SocketOptions, SocketTransport, TcpTransport, TlsOptions, Transport, TransportEvent,
    UnixTransport,
};
