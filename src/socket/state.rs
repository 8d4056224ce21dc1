//! Clock-free state machine behind [`EphemeralSocket`](super::EphemeralSocket).
//!
//! `ClientState` owns the message buffer, the connection slot and the timer
//! flag, and exposes one method per event: a caller message, a timer tick, a
//! transport event, `close` and `kill`. It never reads a clock and never
//! blocks; the worker thread decides *when* ticks and deferred kills happen
//! and the state decides *what* they do. Tests drive it directly with an
//! in-memory dialer.

use log::debug;

use super::{
    buffer::MessageBuffer,
    config::SocketConfig,
    connection::{ConnectionManager, ConnectionPhase, Dialer, Dispatch, TransportEvent},
    transmit::encode_batch,
};

/// Point-in-time view of the client state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub pending_messages: usize,
    pub pending_bytes: usize,
    pub connection: ConnectionPhase,
    pub connection_used: bool,
    pub idle_ticks: u32,
    pub timer_active: bool,
    pub close_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseStage {
    Open,
    /// `close()` ran; the worker owes a deferred kill.
    KillRequested,
    /// The deferred kill came due while connecting; kill once it resolves.
    KillAfterConnect,
}

/// Buffering and connection lifecycle for one client.
pub struct ClientState<D: Dialer> {
    buffer: MessageBuffer,
    connection: ConnectionManager<D>,
    timer_enabled: bool,
    batching: bool,
    timer_generation: Option<u64>,
    arms: u64,
    idle_ticks_limit: u32,
    close: CloseStage,
}

impl<D: Dialer> ClientState<D> {
    pub fn new(config: &SocketConfig, dialer: D) -> Self {
        Self {
            buffer: MessageBuffer::new(config.max_buffer_bytes),
            connection: ConnectionManager::new(dialer).with_wire_echo(config.debug),
            timer_enabled: config.flush_interval.is_some(),
            batching: config.batching_enabled(),
            timer_generation: None,
            arms: 0,
            idle_ticks_limit: config.idle_ticks_limit.max(1),
            close: CloseStage::Open,
        }
    }

    /// Accept a message from the caller. Never fails.
    pub fn send(&mut self, message: String) {
        if !self.batching {
            self.transmit(&[message]);
            return;
        }
        self.arm_timer();
        if self.buffer.push(message) {
            self.flush();
        }
    }

    /// Transmit everything buffered as one batch.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = self.buffer.take();
        self.transmit(&batch);
    }

    /// Run one timer interval.
    ///
    /// Pending data always wins: a tick that flushes does not also age the
    /// connection.
    pub fn tick(&mut self) {
        if !self.buffer.is_empty() {
            self.flush();
            return;
        }
        if self.connection.phase() == ConnectionPhase::Absent {
            return;
        }
        if self.connection.age(self.idle_ticks_limit) {
            debug!(
                "ephemeral socket: closing connection idle for {} intervals",
                self.connection.idle_ticks()
            );
            self.kill();
        }
    }

    /// Apply the outcome of a connection attempt or a transport fault.
    pub fn handle_event(&mut self, event: TransportEvent<D::Stream>) {
        let outcome = self.connection.handle(event);
        self.after_dispatch(outcome);
        if self.close == CloseStage::KillAfterConnect
            && self.connection.phase() != ConnectionPhase::Connecting
        {
            self.kill();
        }
    }

    /// Flush what is buffered, stop the timer and request a deferred kill.
    ///
    /// The caller is expected to invoke [`finish_close`](Self::finish_close)
    /// after a short grace period so the final write can leave the socket.
    pub fn close(&mut self) {
        self.flush();
        self.cancel_timer();
        if self.connection.phase() != ConnectionPhase::Absent {
            self.close = CloseStage::KillRequested;
        }
    }

    /// Report and clear a kill requested by [`close`](Self::close).
    pub fn take_kill_request(&mut self) -> bool {
        if self.close == CloseStage::KillRequested {
            self.close = CloseStage::Open;
            return true;
        }
        false
    }

    /// Complete a close once the grace period has elapsed.
    ///
    /// Messages sent during the grace period are flushed before the kill, and
    /// an attempt still connecting is allowed to deliver its queued payloads
    /// first.
    pub fn finish_close(&mut self) {
        self.flush();
        if self.connection.phase() == ConnectionPhase::Connecting {
            self.close = CloseStage::KillAfterConnect;
        } else {
            self.kill();
        }
    }

    /// Tear everything down immediately without flushing. Idempotent.
    pub fn kill(&mut self) {
        self.cancel_timer();
        self.close = CloseStage::Open;
        self.connection.teardown();
    }

    /// Generation of the running timer, or `None` when it is stopped.
    ///
    /// The generation changes every time the timer is re-armed after a
    /// cancellation, letting the driver restart its schedule.
    pub fn timer_generation(&self) -> Option<u64> {
        self.timer_generation
    }

    pub fn timer_active(&self) -> bool {
        self.timer_generation.is_some()
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    pub fn dialer(&self) -> &D {
        self.connection.dialer()
    }

    pub fn dialer_mut(&mut self) -> &mut D {
        self.connection.dialer_mut()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            pending_messages: self.buffer.len(),
            pending_bytes: self.buffer.bytes(),
            connection: self.connection.phase(),
            connection_used: self.connection.used_this_interval(),
            idle_ticks: self.connection.idle_ticks(),
            timer_active: self.timer_active(),
            close_pending: self.close != CloseStage::Open,
        }
    }

    fn transmit(&mut self, batch: &[String]) {
        let outcome = self.connection.submit(encode_batch(batch));
        self.after_dispatch(outcome);
    }

    fn after_dispatch(&mut self, outcome: Dispatch) {
        match outcome {
            Dispatch::Dialing => self.arm_timer(),
            // Keep ticking while data is buffered so it still gets flushed;
            // otherwise there is nothing left to time.
            Dispatch::TornDown if self.buffer.is_empty() => self.cancel_timer(),
            _ => {}
        }
    }

    fn arm_timer(&mut self) {
        if self.timer_enabled && self.timer_generation.is_none() {
            self.arms += 1;
            self.timer_generation = Some(self.arms);
        }
    }

    fn cancel_timer(&mut self) {
        self.timer_generation = None;
    }
}

impl<D: Dialer> std::fmt::Debug for ClientState<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
