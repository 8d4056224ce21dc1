//! Worker thread driving the client state machine.
//!
//! The worker owns the [`ClientState`] outright and multiplexes three inputs:
//! caller commands, transport events from the dialer, and its own deadlines
//! (the recurring tick, the deferred kill after `close`, and the shutdown
//! grace period).

use std::{
    io,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select, unbounded};
use log::debug;

use super::{
    config::SocketConfig,
    connection::{ConnectionPhase, Dialer, TransportEvent},
    state::{ClientSnapshot, ClientState},
    transport::TransportDialer,
};

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum SocketCommand {
    Send(String),
    Flush(Sender<()>),
    Close,
    Kill,
    Snapshot(Sender<ClientSnapshot>),
    Shutdown(Sender<()>),
}

pub fn spawn_worker(config: &SocketConfig) -> io::Result<(Sender<SocketCommand>, JoinHandle<()>)> {
    let (event_tx, event_rx) = unbounded();
    spawn_worker_with(config, TransportDialer::new(config, event_tx), event_rx)
}

/// Spawn a worker around an arbitrary dialer whose outcomes arrive on
/// `events`.
pub fn spawn_worker_with<D>(
    config: &SocketConfig,
    dialer: D,
    events: Receiver<TransportEvent<D::Stream>>,
) -> io::Result<(Sender<SocketCommand>, JoinHandle<()>)>
where
    D: Dialer + Send + 'static,
{
    let (tx, rx) = bounded(config.capacity);
    let state = ClientState::new(config, dialer);
    let schedule = Schedule::new(
        config.flush_interval,
        config.close_grace,
        config.connect_timeout,
    );
    let handle = thread::Builder::new()
        .name("ephemeral-socket".into())
        .spawn(move || Worker::new(state, schedule).run(&rx, &events))?;
    Ok((tx, handle))
}

/// Pending shutdown: the deadline, the acknowledgement channel and whether
/// the worker is already waiting on an in-flight connect.
#[derive(Debug)]
struct PendingShutdown {
    at: Instant,
    ack: Sender<()>,
    draining: bool,
}

/// Deadlines owned by the worker.
#[derive(Debug)]
struct Schedule {
    interval: Option<Duration>,
    grace: Duration,
    connect_timeout: Duration,
    tick: Option<(u64, Instant)>,
    kill_at: Option<Instant>,
    shutdown: Option<PendingShutdown>,
}

impl Schedule {
    fn new(interval: Option<Duration>, grace: Duration, connect_timeout: Duration) -> Self {
        Self {
            interval,
            grace,
            connect_timeout,
            tick: None,
            kill_at: None,
            shutdown: None,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.tick.map(|(_, at)| at),
            self.kill_at,
            self.shutdown.as_ref().map(|pending| pending.at),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// Next tick after one due at `at`. A worker that fell behind restarts the
/// cadence from `now` instead of firing the missed ticks back to back.
fn next_tick(at: Instant, interval: Duration, now: Instant) -> Instant {
    let next = at + interval;
    if next <= now { now + interval } else { next }
}

struct Worker<D: Dialer> {
    state: ClientState<D>,
    schedule: Schedule,
}

impl<D: Dialer> Worker<D> {
    fn new(state: ClientState<D>, schedule: Schedule) -> Self {
        Self { state, schedule }
    }

    fn run(mut self, rx: &Receiver<SocketCommand>, events: &Receiver<TransportEvent<D::Stream>>) {
        loop {
            self.sync(Instant::now());
            let timeout = match self.schedule.next_deadline() {
                Some(at) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };
            select! {
                recv(rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => {
                        // Every handle is gone without an explicit shutdown.
                        self.state.close();
                        self.state.kill();
                        break;
                    }
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.state.handle_event(event);
                        if self.drained() {
                            break;
                        }
                    }
                },
                recv(timeout) -> _ => {
                    if self.on_deadline(Instant::now()) {
                        break;
                    }
                },
            }
        }
        debug!("ephemeral socket: worker stopped");
    }

    fn handle_command(&mut self, cmd: SocketCommand) {
        match cmd {
            SocketCommand::Send(message) => self.state.send(message),
            SocketCommand::Flush(ack) => {
                self.state.flush();
                let _ = ack.send(());
            }
            SocketCommand::Close => self.state.close(),
            SocketCommand::Kill => {
                self.state.kill();
                self.schedule.kill_at = None;
            }
            SocketCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot());
            }
            SocketCommand::Shutdown(ack) => {
                self.state.close();
                self.schedule.shutdown = Some(PendingShutdown {
                    at: Instant::now() + self.schedule.grace,
                    ack,
                    draining: false,
                });
            }
        }
    }

    /// Align the schedule with the state after every event.
    fn sync(&mut self, now: Instant) {
        match (self.state.timer_generation(), self.schedule.interval) {
            (Some(generation), Some(interval)) => {
                if self.schedule.tick.map(|(g, _)| g) != Some(generation) {
                    self.schedule.tick = Some((generation, now + interval));
                }
            }
            _ => self.schedule.tick = None,
        }
        if self.state.take_kill_request() {
            self.schedule.kill_at = Some(now + self.schedule.grace);
        }
    }

    /// Fire every deadline that has passed. Returns `true` once shut down.
    fn on_deadline(&mut self, now: Instant) -> bool {
        if let Some((generation, at)) = self.schedule.tick
            && at <= now
        {
            self.state.tick();
            if let Some(interval) = self.schedule.interval {
                self.schedule.tick = Some((generation, next_tick(at, interval, now)));
            }
        }
        if self.schedule.kill_at.is_some_and(|at| at <= now) {
            self.schedule.kill_at = None;
            self.state.finish_close();
        }
        let Some(pending) = self.schedule.shutdown.as_mut() else {
            return false;
        };
        if pending.at > now {
            return false;
        }
        if pending.draining {
            // The connect did not resolve within its own timeout.
            self.state.kill();
        } else {
            self.state.finish_close();
            pending.draining = true;
            pending.at = now + self.schedule.connect_timeout;
        }
        self.drained()
    }

    /// Acknowledge a pending shutdown once no connection remains.
    fn drained(&mut self) -> bool {
        let done = self
            .schedule
            .shutdown
            .as_ref()
            .is_some_and(|pending| pending.draining)
            && self.state.connection_phase() == ConnectionPhase::Absent;
        if done && let Some(pending) = self.schedule.shutdown.take() {
            let _ = pending.ack.send(());
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn next_deadline_picks_earliest() {
        let now = Instant::now();
        let mut schedule = Schedule::new(
            Some(Duration::from_secs(1)),
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        assert_eq!(schedule.next_deadline(), None);
        schedule.tick = Some((1, now + Duration::from_secs(1)));
        schedule.kill_at = Some(now + Duration::from_millis(10));
        assert_eq!(schedule.next_deadline(), Some(now + Duration::from_millis(10)));
        schedule.kill_at = None;
        assert_eq!(schedule.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[rstest]
    fn on_time_tick_keeps_cadence() {
        let at = Instant::now();
        let interval = Duration::from_millis(100);
        let now = at + Duration::from_millis(5);
        assert_eq!(next_tick(at, interval, now), at + interval);
    }

    #[rstest]
    #[case(Duration::from_millis(100))]
    #[case(Duration::from_millis(250))]
    fn stalled_worker_does_not_fire_back_to_back(#[case] stall: Duration) {
        let at = Instant::now();
        let interval = Duration::from_millis(100);
        let now = at + stall;
        assert_eq!(next_tick(at, interval, now), now + interval);
    }
}
