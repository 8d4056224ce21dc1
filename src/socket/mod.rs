//! Lazily connected, batching socket client.
//!
//! This module defines [`EphemeralSocket`], a client that buffers small
//! messages and writes them over one persistent connection as
//! newline-delimited batches. The connection is opened on first use, reused
//! across flushes, torn down on any transport error and closed again after it
//! has sat idle for a number of timer intervals. A dedicated worker thread
//! owns all of this state; [`ClientState`] is the clock-free state machine the
//! worker drives, exposed for callers that want to run it from their own loop.

mod buffer;
pub(crate) mod config;
mod connection;
mod handle;
mod state;
mod transmit;
mod transport;
mod worker;


pub use config::{SocketConfig, SocketOptions};
pub use connection::{ConnectionPhase, Dialer, Transport, TransportEvent};
pub use handle::EphemeralSocket;
pub use state::{ClientSnapshot, ClientState};
pub use transmit::{WIRE_TARGET, encode_batch};
pub use transport::{
    ActiveConnection, SocketTransport, TcpTransport, TlsOptions, TransportDialer, UnixTransport,
    connect_transport,
};
