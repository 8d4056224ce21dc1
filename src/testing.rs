//! In-memory transport doubles for driving [`ClientState`](crate::ClientState)
//! without sockets or real timers.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::socket::{Dialer, Transport, TransportEvent};

/// Dialer that only records attempt ids. Tests resolve attempts by feeding
/// [`TransportEvent`](crate::TransportEvent)s back into the client.
#[derive(Debug, Default)]
pub struct RecordingDialer {
    attempts: Vec<u64>,
}

impl RecordingDialer {
    pub fn attempts(&self) -> &[u64] {
        &self.attempts
    }

    pub fn last_attempt(&self) -> Option<u64> {
        self.attempts.last().copied()
    }
}

impl Dialer for RecordingDialer {
    type Stream = MemoryStream;

    fn dial(&mut self, attempt: u64) {
        self.attempts.push(attempt);
    }
}

/// Dialer that connects every attempt to the same [`MemoryStream`] after a
/// fixed delay, reporting on a background thread like a real connect.
#[derive(Debug)]
pub struct DelayedDialer {
    delay: Duration,
    stream: MemoryStream,
    events: Sender<TransportEvent<MemoryStream>>,
}

impl DelayedDialer {
    pub fn new(
        delay: Duration,
        stream: MemoryStream,
        events: Sender<TransportEvent<MemoryStream>>,
    ) -> Self {
        Self {
            delay,
            stream,
            events,
        }
    }
}

impl Dialer for DelayedDialer {
    type Stream = MemoryStream;

    fn dial(&mut self, attempt: u64) {
        let delay = self.delay;
        let stream = self.stream.clone();
        let events = self.events.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = events.send(TransportEvent::Connected { attempt, stream });
        });
    }
}

/// Cloneable stream capturing every payload written to it.
#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl MemoryStream {
    /// Snapshot of the payloads written so far, one entry per write.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Payloads decoded as UTF-8, one entry per write.
    pub fn written_text(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Make subsequent writes fail with `ConnectionReset`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryStream {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        self.writes.lock().push(payload.to_vec());
        Ok(())
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
