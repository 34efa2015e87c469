//! The "POLL" scheduler - when to fetch the next live snapshot.
//!
//! A small state machine `{Stopped, Running}` with a generation counter:
//! - `start` / `stop` both bump the generation, so any result carrying an
//!   older generation is stale and must be dropped.
//! - At most one poll is in flight. While a ticket is outstanding no new
//!   ticket is issued; a slow fetch delays the next cycle instead of
//!   queueing duplicates.
//!
//! The async driver lives in `runtime`; this module only decides.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the poll scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between the starts of consecutive cycles (default: 10 000 ms)
    pub poll_interval_ms: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 10_000 }
    }
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Stopped,
    Running,
}

/// Permission to run one fetch-reconcile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    /// Scheduler generation the ticket was issued in
    pub generation: u64,

    /// Sequence number of the cycle within the scheduler's lifetime
    pub cycle: u64,
}

/// Whether a returning ticket still belongs to the running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Current,
    Stale,
}

/// Decides when live polls happen.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    interval: Duration,
    state: PollState,
    generation: u64,
    cycle: u64,
    in_flight: Option<PollTicket>,
    next_due: Option<Duration>,
}

impl PollScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            state: PollState::Stopped,
            generation: 0,
            cycle: 0,
            in_flight: None,
            next_due: None,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PollState::Running
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn in_flight(&self) -> Option<PollTicket> {
        self.in_flight
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.next_due
    }

    /// Stopped → Running. Returns the ticket for the immediate first cycle,
    /// or `None` if already running.
    pub fn start(&mut self, now: Duration) -> Option<PollTicket> {
        if self.is_running() {
            return None;
        }
        self.generation += 1;
        self.state = PollState::Running;
        self.in_flight = None;
        Some(self.issue(now))
    }

    /// Running → Stopped. Any outstanding ticket becomes stale.
    ///
    /// Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.generation += 1;
        self.state = PollState::Stopped;
        self.in_flight = None;
        self.next_due = None;
        true
    }

    /// Issue a ticket if running, due, and nothing is in flight.
    pub fn poll_due(&mut self, now: Duration) -> Option<PollTicket> {
        if !self.is_running() || self.in_flight.is_some() {
            return None;
        }
        match self.next_due {
            Some(due) if now < due => None,
            _ => Some(self.issue(now)),
        }
    }

    /// Return a ticket after its fetch resolved.
    ///
    /// A stale ticket never clears the in-flight slot of the current generation.
    pub fn complete(&mut self, ticket: PollTicket) -> TicketStatus {
        if ticket.generation != self.generation || !self.is_running() {
            return TicketStatus::Stale;
        }
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        TicketStatus::Current
    }

    /// How long until the next cycle may start.
    ///
    /// `None` when stopped. Zero when already due.
    pub fn time_until_due(&self, now: Duration) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        Some(
            self.next_due
                .map(|due| due.saturating_sub(now))
                .unwrap_or(Duration::ZERO),
        )
    }

    fn issue(&mut self, now: Duration) -> PollTicket {
        self.cycle += 1;
        let ticket = PollTicket {
            generation: self.generation,
            cycle: self.cycle,
        };
        self.in_flight = Some(ticket);
        self.next_due = Some(now + self.interval);
        ticket
    }
}

// ============================================================================
// CANCELLATION HANDLE
// ============================================================================

/// Cancellable handle to a running poll task.
///
/// Cancelling (explicitly or by dropping the handle) wakes the task out of
/// its sleep and stops it before the next cycle.
#[derive(Debug)]
pub struct PollHandle {
    signal: PollSignal,
}

impl PollHandle {
    pub(crate) fn new() -> (Self, PollSignal) {
        let signal = PollSignal {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        };
        (Self { signal: signal.clone() }, signal)
    }

    /// Stop the poll task. Idempotent.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Task side of a [`PollHandle`]. The engine keeps a clone so leaving
/// live mode cancels the task as well.
#[derive(Debug, Clone)]
pub(crate) struct PollSignal {
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollSignal {
    /// Set the flag and wake the task. Idempotent.
    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.wake.notify_one();
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the handle is cancelled.
    pub(crate) async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.notified().await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
