//! Line-collecting servers used by the integration tests.
//!
//! Every accepted connection gets its own reader thread which forwards
//! accept, data and close events, tagged with the connection index, over a
//! channel so tests can observe the client's connection lifecycle. The same
//! event stream is produced for TCP and Unix domain listeners.

use std::{
    io::{self, Read},
    net::{SocketAddr, TcpListener},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

#[cfg(unix)]
use std::os::unix::net::UnixListener;

use tempfile::TempDir;

#[derive(Debug, PartialEq, Eq)]
pub enum ServerEvent {
    Accepted(usize),
    Data(usize, Vec<u8>),
    Closed(usize),
}

enum Endpoint {
    Tcp(SocketAddr),
    #[cfg_attr(not(unix), allow(dead_code))]
    Unix { path: PathBuf, _dir: TempDir },
}

pub struct LineServer {
    endpoint: Endpoint,
    rx: mpsc::Receiver<ServerEvent>,
}

fn accept_loop<S, I>(incoming: I, tx: &mpsc::Sender<ServerEvent>)
where
    S: Read + Send + 'static,
    I: Iterator<Item = io::Result<S>>,
{
    for (index, stream) in incoming.enumerate() {
        let Ok(mut stream) = stream else {
            break;
        };
        let tx = tx.clone();
        if tx.send(ServerEvent::Accepted(index)).is_err() {
            break;
        }
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => {
                        let _ = tx.send(ServerEvent::Closed(index));
                        break;
                    }
                    Ok(n) => {
                        if tx.send(ServerEvent::Data(index, buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

impl LineServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || accept_loop(listener.incoming(), &tx));
        Self {
            endpoint: Endpoint::Tcp(addr),
            rx,
        }
    }

    /// Listen on a Unix domain socket inside a fresh temporary directory.
    #[cfg(unix)]
    pub fn start_unix() -> Self {
        let dir = tempfile::tempdir().expect("create socket directory");
        let path = dir.path().join("lines.sock");
        let listener = UnixListener::bind(&path).expect("bind unix listener");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || accept_loop(listener.incoming(), &tx));
        Self {
            endpoint: Endpoint::Unix { path, _dir: dir },
            rx,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        match &self.endpoint {
            Endpoint::Tcp(addr) => *addr,
            Endpoint::Unix { .. } => panic!("unix line server has no TCP address"),
        }
    }

    pub fn path(&self) -> &Path {
        match &self.endpoint {
            Endpoint::Unix { path, .. } => path,
            Endpoint::Tcp(_) => panic!("TCP line server has no socket path"),
        }
    }

    pub fn next_event(&self, timeout: Duration) -> Option<ServerEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Gather events until `lines` newline-terminated lines have arrived.
    /// Returns the received text and every event seen on the way.
    pub fn collect_lines(&self, lines: usize, timeout: Duration) -> (String, Vec<ServerEvent>) {
        let deadline = Instant::now() + timeout;
        let mut text = Vec::new();
        let mut events = Vec::new();
        while text.iter().filter(|b| **b == b'\n').count() < lines {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(event) = self.next_event(remaining) else {
                break;
            };
            if let ServerEvent::Data(_, data) = &event {
                text.extend_from_slice(data);
            }
            events.push(event);
        }
        (String::from_utf8(text).expect("utf-8 payload"), events)
    }

    /// Wait for a specific event, skipping any others.
    pub fn wait_for(&self, wanted: &ServerEvent, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining) {
                Some(event) if &event == wanted => return true,
                Some(_) => {}
                None => return false,
            }
        }
    }
}
