//! Connection slot owned by the client.
//!
//! The slot moves through `Absent -> Connecting -> Ready` and back to
//! `Absent` on a fault, an idle teardown or an explicit kill. Every
//! reconnection is a fresh attempt with a new attempt id; events carrying a
//! stale id are discarded so a late connect or error can never touch the
//! current connection.

use std::{io, mem};

use log::debug;

use super::transmit::echo_payload;

/// Writes payloads to an established connection.
pub trait Transport: Send + 'static {
    /// Write one payload in full.
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Ask the peer to close and release the connection. Errors are ignored.
    fn terminate(&mut self);
}

/// Starts connection attempts.
///
/// Implementations report the outcome of `dial` asynchronously as a
/// [`TransportEvent`] carrying the same attempt id.
pub trait Dialer {
    type Stream: Transport;

    fn dial(&mut self, attempt: u64);
}

/// Outcome of a connection attempt, or a failure on a live connection.
#[derive(Debug)]
pub enum TransportEvent<S> {
    Connected { attempt: u64, stream: S },
    Fault { attempt: u64, error: io::Error },
}

/// Externally visible connection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Absent,
    Connecting,
    Ready,
}

enum Slot<S> {
    Absent,
    Connecting { attempt: u64, waiting: Vec<Vec<u8>> },
    Ready { attempt: u64, stream: S },
}

/// Result of handing a payload or event to the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The payload was written to the ready connection.
    Written,
    /// The payload is waiting behind an in-flight attempt.
    Queued,
    /// A new attempt was started and the payload is waiting behind it.
    Dialing,
    /// The connection was torn down after a transport fault.
    TornDown,
    /// The event belonged to an earlier attempt and was discarded.
    Stale,
}

/// Owns at most one connection and the idle bookkeeping for it.
pub struct ConnectionManager<D: Dialer> {
    dialer: D,
    slot: Slot<D::Stream>,
    next_attempt: u64,
    used: bool,
    idle_ticks: u32,
    echo: bool,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            slot: Slot::Absent,
            next_attempt: 0,
            used: false,
            idle_ticks: 0,
            echo: false,
        }
    }

    /// Log every successfully written payload on the wire target.
    pub fn with_wire_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn phase(&self) -> ConnectionPhase {
        match self.slot {
            Slot::Absent => ConnectionPhase::Absent,
            Slot::Connecting { .. } => ConnectionPhase::Connecting,
            Slot::Ready { .. } => ConnectionPhase::Ready,
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn dialer_mut(&mut self) -> &mut D {
        &mut self.dialer
    }

    pub fn used_this_interval(&self) -> bool {
        self.used
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Write `payload`, connecting first if needed.
    ///
    /// Payloads submitted while an attempt is in flight queue behind that
    /// attempt; a second attempt is never started.
    pub fn submit(&mut self, payload: Vec<u8>) -> Dispatch {
        match &mut self.slot {
            Slot::Ready { attempt, stream } => {
                let attempt = *attempt;
                self.used = true;
                match stream.write_payload(&payload) {
                    Ok(()) => {
                        if self.echo {
                            echo_payload(&payload);
                        }
                        Dispatch::Written
                    }
                    Err(error) => self.handle(TransportEvent::Fault { attempt, error }),
                }
            }
            Slot::Connecting { waiting, .. } => {
                waiting.push(payload);
                Dispatch::Queued
            }
            Slot::Absent => {
                let attempt = self.next_attempt;
                self.next_attempt += 1;
                self.slot = Slot::Connecting {
                    attempt,
                    waiting: vec![payload],
                };
                self.used = false;
                self.idle_ticks = 0;
                debug!("ephemeral socket: dialing (attempt {attempt})");
                self.dialer.dial(attempt);
                Dispatch::Dialing
            }
        }
    }

    /// Apply a transport event to the slot.
    pub fn handle(&mut self, event: TransportEvent<D::Stream>) -> Dispatch {
        match event {
            TransportEvent::Connected { attempt, stream } => self.on_connected(attempt, stream),
            TransportEvent::Fault { attempt, error } => self.on_fault(attempt, &error),
        }
    }

    fn on_connected(&mut self, attempt: u64, mut stream: D::Stream) -> Dispatch {
        let waiting = match &mut self.slot {
            Slot::Connecting {
                attempt: current,
                waiting,
            } if *current == attempt => mem::take(waiting),
            _ => {
                debug!("ephemeral socket: discarding stale connection (attempt {attempt})");
                stream.terminate();
                return Dispatch::Stale;
            }
        };
        debug!("ephemeral socket: connected (attempt {attempt})");
        self.slot = Slot::Ready { attempt, stream };
        let mut outcome = Dispatch::Written;
        for payload in waiting {
            outcome = self.submit(payload);
            if outcome == Dispatch::TornDown {
                break;
            }
        }
        outcome
    }

    fn on_fault(&mut self, attempt: u64, error: &io::Error) -> Dispatch {
        let current = match &self.slot {
            Slot::Connecting { attempt, .. } | Slot::Ready { attempt, .. } => Some(*attempt),
            Slot::Absent => None,
        };
        if current != Some(attempt) {
            return Dispatch::Stale;
        }
        debug!("ephemeral socket: transport fault (attempt {attempt}): {error}");
        self.teardown();
        Dispatch::TornDown
    }

    /// Advance the idle clock by one timer interval.
    ///
    /// Returns `true` once the ready connection has gone unused for `limit`
    /// consecutive intervals. Attempts still connecting are never aged.
    pub fn age(&mut self, limit: u32) -> bool {
        if !matches!(self.slot, Slot::Ready { .. }) {
            return false;
        }
        if self.used {
            self.idle_ticks = 0;
            self.used = false;
            return false;
        }
        self.idle_ticks += 1;
        self.idle_ticks >= limit
    }

    /// Drop the connection immediately. Safe to call when already absent.
    pub fn teardown(&mut self) {
        match mem::replace(&mut self.slot, Slot::Absent) {
            Slot::Ready { mut stream, .. } => stream.terminate(),
            Slot::Connecting { attempt, waiting } if !waiting.is_empty() => {
                debug!(
                    "ephemeral socket: abandoning {} queued payloads (attempt {attempt})",
                    waiting.len()
                );
            }
            _ => {}
        }
        self.used = false;
        self.idle_ticks = 0;
    }
}
