//! Transport primitives for the socket client.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::PathBuf,
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use native_tls::{TlsConnector, TlsStream};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use super::{
    config::SocketConfig,
    connection::{Dialer, Transport, TransportEvent},
};

/// Transport targeted by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketTransport {
    /// TCP transport with optional TLS.
    Tcp(TcpTransport),
    /// Unix domain socket transport.
    Unix(UnixTransport),
}

/// TCP transport configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpTransport {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsOptions>,
}

impl TcpTransport {
    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

/// Unix domain socket configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixTransport {
    /// Path to the socket file.
    pub path: PathBuf,
}

/// TLS connection options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// Live socket connection.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ActiveConnection {
    /// Update the write timeout for the underlying socket.
    pub fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.set_write_timeout(Some(timeout)),
            ActiveConnection::Tls(stream) => stream.get_ref().set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }
}

impl Transport for ActiveConnection {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => {
                stream.write_all(payload)?;
                stream.flush()
            }
            ActiveConnection::Tls(stream) => {
                stream.write_all(payload)?;
                stream.flush()
            }
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => {
                stream.write_all(payload)?;
                stream.flush()
            }
        }
    }

    fn terminate(&mut self) {
        match self {
            ActiveConnection::PlainTcp(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            ActiveConnection::Tls(stream) => {
                let _ = stream.shutdown();
                let _ = stream.get_ref().shutdown(Shutdown::Both);
            }
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ActiveConnection::PlainTcp(_) => "tcp",
            ActiveConnection::Tls(_) => "tls",
            #[cfg(unix)]
            ActiveConnection::Unix(_) => "unix",
        };
        f.debug_tuple("ActiveConnection").field(&kind).finish()
    }
}

fn connect_tcp(config: &TcpTransport, timeout: Duration) -> io::Result<TcpStream> {
    let addrs = config.socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}:{}", config.host, config.port),
        )
    }))
}

/// Establish a socket connection using the provided transport definition.
pub fn connect_transport(
    transport: &SocketTransport,
    connect_timeout: Duration,
) -> io::Result<ActiveConnection> {
    match transport {
        SocketTransport::Tcp(config) => {
            let stream = connect_tcp(config, connect_timeout)?;
            if let Some(tls) = &config.tls {
                let connector = tls.connector()?;
                stream.set_read_timeout(Some(connect_timeout))?;
                stream.set_write_timeout(Some(connect_timeout))?;
                let stream = connector
                    .connect(&tls.domain, stream)
                    .map_err(io::Error::other)?;
                let tcp_ref = stream.get_ref();
                tcp_ref.set_read_timeout(None)?;
                tcp_ref.set_write_timeout(None)?;
                Ok(ActiveConnection::Tls(Box::new(stream)))
            } else {
                Ok(ActiveConnection::PlainTcp(stream))
            }
        }
        SocketTransport::Unix(config) => {
            #[cfg(unix)]
            {
                let stream = UnixStream::connect(&config.path)?;
                Ok(ActiveConnection::Unix(stream))
            }
            #[cfg(not(unix))]
            {
                let _ = (config, connect_timeout);
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix domain sockets are not supported on this platform",
                ))
            }
        }
    }
}

/// Dialer that connects on a short-lived thread and reports back through a
/// channel, so a slow connect never stalls the client worker.
#[derive(Debug)]
pub struct TransportDialer {
    transport: SocketTransport,
    connect_timeout: Duration,
    write_timeout: Duration,
    events: Sender<TransportEvent<ActiveConnection>>,
}

impl TransportDialer {
    pub fn new(config: &SocketConfig, events: Sender<TransportEvent<ActiveConnection>>) -> Self {
        Self {
            transport: config.transport.clone(),
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            events,
        }
    }
}

impl Dialer for TransportDialer {
    type Stream = ActiveConnection;

    fn dial(&mut self, attempt: u64) {
        let transport = self.transport.clone();
        let connect_timeout = self.connect_timeout;
        let write_timeout = self.write_timeout;
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("ephemeral-socket-dial".into())
            .spawn(move || {
                let event = match connect_transport(&transport, connect_timeout).and_then(
                    |mut stream| {
                        stream.set_write_timeout(write_timeout)?;
                        Ok(stream)
                    },
                ) {
                    Ok(stream) => TransportEvent::Connected { attempt, stream },
                    Err(error) => TransportEvent::Fault { attempt, error },
                };
                // The worker may already be gone; the stream is dropped then.
                let _ = events.send(event);
            });
        if let Err(error) = spawned {
            let _ = self.events.send(TransportEvent::Fault { attempt, error });
        }
    }
}
