//! Public client type exported by the crate.

use std::{thread, time::Duration};

use crossbeam_channel::{Sender, TrySendError, bounded};
#[cfg(any(test, feature = "test-util"))]
use crossbeam_channel::Receiver;
use log::warn;
use parking_lot::Mutex;

use crate::{builder::BuildError, rate_limited_warner::RateLimitedWarner};

use super::{
    config::{SocketConfig, SocketOptions},
    state::ClientSnapshot,
    worker::{SocketCommand, spawn_worker},
};
#[cfg(any(test, feature = "test-util"))]
use super::{
    connection::{Dialer, TransportEvent},
    worker::spawn_worker_with,
};

/// Lazily connected, batching client for small fire-and-forget messages.
///
/// Messages are buffered and written as one newline-delimited batch per
/// timer interval, or immediately once the buffered bytes exceed the
/// configured threshold. The connection is opened on first use and closed
/// again after it has sat idle for a number of intervals.
///
/// Delivery is best effort: there is no acknowledgement and no retry, and
/// transport errors are never reported to the caller. A failed connection
/// only loses the batch that was in flight; the next message reconnects.
/// Callers that need durability must build it above this type.
pub struct EphemeralSocket {
    tx: Option<Sender<SocketCommand>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    warner: RateLimitedWarner,
    ack_timeout: Duration,
    shutdown_timeout: Duration,
}

impl EphemeralSocket {
    /// Construct a client from an options object.
    pub fn new(options: &SocketOptions) -> Result<Self, BuildError> {
        crate::EphemeralSocketBuilder::from_options(options).build()
    }

    /// Construct the client from a validated configuration object.
    pub fn with_config(config: &SocketConfig) -> Result<Self, BuildError> {
        let (tx, handle) = spawn_worker(config)?;
        Ok(Self::from_worker(config, tx, handle))
    }

    /// Construct a client whose worker connects through `dialer`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_dialer<D>(
        config: &SocketConfig,
        dialer: D,
        events: Receiver<TransportEvent<D::Stream>>,
    ) -> Result<Self, BuildError>
    where
        D: Dialer + Send + 'static,
    {
        let (tx, handle) = spawn_worker_with(config, dialer, events)?;
        Ok(Self::from_worker(config, tx, handle))
    }

    fn from_worker(
        config: &SocketConfig,
        tx: Sender<SocketCommand>,
        handle: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            tx: Some(tx),
            handle: Mutex::new(Some(handle)),
            warner: RateLimitedWarner::new(config.warn_interval),
            ack_timeout: config.write_timeout + config.close_grace,
            // Grace period, then an in-flight connect, then the final write.
            shutdown_timeout: config.close_grace
                + config.connect_timeout
                + config.write_timeout * 2,
        }
    }

    /// Queue a message for delivery. Never blocks and never fails.
    ///
    /// The message is dropped, with a rate-limited warning, only when the
    /// worker queue is full or the client has been shut down.
    pub fn send(&self, message: impl Into<String>) {
        let Some(tx) = self.tx.as_ref() else {
            self.record_drop("client shut down");
            return;
        };
        match tx.try_send(SocketCommand::Send(message.into())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.record_drop("queue full"),
            Err(TrySendError::Disconnected(_)) => self.record_drop("worker stopped"),
        }
    }

    /// Flush buffered messages now and wait for the worker to hand the batch
    /// to the transport. Returns `false` if the worker did not acknowledge.
    pub fn flush(&self) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        self.warner.flush(|count| {
            warn!("EphemeralSocket dropped {count} messages in the last interval");
        });
        let (ack_tx, ack_rx) = bounded(1);
        if tx
            .send_timeout(SocketCommand::Flush(ack_tx), self.ack_timeout)
            .is_err()
        {
            return false;
        }
        ack_rx.recv_timeout(self.ack_timeout).is_ok()
    }

    /// Flush pending data, stop the timer and terminate the connection after
    /// a short grace period. Messages sent during the grace period are
    /// flushed just before the connection is terminated. The client stays
    /// usable afterwards.
    pub fn close(&self) {
        self.command(SocketCommand::Close);
    }

    /// Terminate the connection immediately without flushing. Idempotent.
    pub fn kill(&self) {
        self.command(SocketCommand::Kill);
    }

    /// Inspect the client state as seen by the worker.
    pub fn snapshot(&self) -> Option<ClientSnapshot> {
        let tx = self.tx.as_ref()?;
        let (reply_tx, reply_rx) = bounded(1);
        tx.send_timeout(SocketCommand::Snapshot(reply_tx), self.ack_timeout)
            .ok()?;
        reply_rx.recv_timeout(self.ack_timeout).ok()
    }

    /// Close the client for good and wait for the worker to exit. Every
    /// later call is a no-op.
    pub fn shutdown(&mut self) {
        self.request_shutdown();
        self.join_worker();
    }

    fn command(&self, cmd: SocketCommand) {
        if let Some(tx) = self.tx.as_ref() {
            // Blocking here keeps close/kill from being lost to a full queue.
            let _ = tx.send_timeout(cmd, self.ack_timeout);
        }
    }

    fn record_drop(&self, reason: &str) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("EphemeralSocket {reason}; dropped {count} messages");
        });
    }

    fn request_shutdown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(SocketCommand::Shutdown(ack_tx)).is_err() {
            return;
        }
        // Dropping `tx` before the ack makes the worker abandon an in-flight
        // connect.
        if ack_rx.recv_timeout(self.shutdown_timeout).is_err() {
            warn!("EphemeralSocket: worker did not drain within {:?}", self.shutdown_timeout);
        }
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("EphemeralSocket: worker thread panicked");
        }
    }
}

impl Drop for EphemeralSocket {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EphemeralSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralSocket")
            .field("open", &self.tx.is_some())
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crossbeam_channel::unbounded;
    use rstest::rstest;

    use super::*;
    use crate::testing::{DelayedDialer, MemoryStream};

    #[rstest]
    fn drop_waits_for_a_slow_connect_to_deliver() {
        let config = SocketConfig::default();
        let connect_delay = config.write_timeout + config.close_grace + Duration::from_millis(500);
        let stream = MemoryStream::default();
        let (events_tx, events_rx) = unbounded();
        let dialer = DelayedDialer::new(connect_delay, stream.clone(), events_tx);
        let socket = EphemeralSocket::with_dialer(&config, dialer, events_rx).expect("spawn worker");

        let started = Instant::now();
        socket.send("last words");
        drop(socket);

        assert!(started.elapsed() >= connect_delay);
        assert_eq!(stream.written_text(), vec!["last words\n".to_owned()]);
        assert!(stream.is_terminated());
    }

    #[rstest]
    fn shutdown_gives_up_once_the_connect_times_out() {
        let config = SocketConfig {
            connect_timeout: Duration::from_millis(200),
            ..SocketConfig::default()
        };
        let stream = MemoryStream::default();
        let (events_tx, events_rx) = unbounded();
        let dialer = DelayedDialer::new(Duration::from_secs(30), stream.clone(), events_tx);
        let mut socket =
            EphemeralSocket::with_dialer(&config, dialer, events_rx).expect("spawn worker");

        let started = Instant::now();
        socket.send("never delivered");
        socket.shutdown();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(stream.writes().is_empty());
    }
}
