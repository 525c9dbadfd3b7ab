//! Timers for network polling and partial file reconciliation.
//!
//! Each timer is a small tokio task that only sends a tick message to the
//! control task. The task is aborted when its [`TimerHandle`] is dropped, and
//! every tick carries the generation of the timer that produced it so a tick
//! queued by a discarded timer is ignored.

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::debug;

use crate::watch::events::{EventSender, WatchEvent};

/// Owned timer task. Dropping the handle cancels the timer.
pub struct TimerHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("generation", &self.generation)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Owns the network poll timer and the partial reconciliation timer.
///
/// The network poll repeats every interval while at least one network
/// directory is registered. Reconciliation is one-shot and re-armed by the
/// watcher after every tick that leaves partial files behind.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    events: EventSender,
    next_generation: u64,
    network_poll: Option<TimerHandle>,
    reconcile: Option<TimerHandle>,
}

impl PollScheduler {
    pub fn new(interval: Duration, events: EventSender) -> Self {
        Self {
            interval,
            events,
            next_generation: 0,
            network_poll: None,
            reconcile: None,
        }
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Start the repeating network poll unless it already runs. Returns
    /// whether a timer was created.
    pub fn ensure_network_poll(&mut self) -> bool {
        if self.network_poll.is_some() {
            return false;
        }
        let generation = self.generation();
        let period = self.interval;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !events.send(WatchEvent::NetworkPollTick { generation }) {
                    break;
                }
            }
        });
        debug!("network poll timer started ({:?})", period);
        self.network_poll = Some(TimerHandle { generation, task });
        true
    }

    /// Stop the network poll. Returns whether a timer was running.
    pub fn stop_network_poll(&mut self) -> bool {
        let stopped = self.network_poll.take().is_some();
        if stopped {
            debug!("network poll timer stopped");
        }
        stopped
    }

    pub fn is_network_poll_active(&self) -> bool {
        self.network_poll.is_some()
    }

    /// Whether a network tick came from the live timer.
    pub fn accepts_network_tick(&self, generation: u64) -> bool {
        self.network_poll
            .as_ref()
            .is_some_and(|timer| timer.generation == generation)
    }

    /// Arm the reconciliation timer unless it is already pending. Returns
    /// whether a timer was created.
    pub fn ensure_reconcile(&mut self) -> bool {
        if self.reconcile.is_some() {
            return false;
        }
        self.arm_reconcile();
        true
    }

    /// Replace the reconciliation timer with a fresh one-shot.
    pub fn rearm_reconcile(&mut self) {
        self.arm_reconcile();
    }

    fn arm_reconcile(&mut self) {
        let generation = self.generation();
        let period = self.interval;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            sleep(period).await;
            events.send(WatchEvent::ReconcileTick { generation });
        });
        // Assigning drops (and aborts) any previous timer.
        self.reconcile = Some(TimerHandle { generation, task });
    }

    /// Discard the reconciliation timer. Returns whether one was pending.
    pub fn stop_reconcile(&mut self) -> bool {
        self.reconcile.take().is_some()
    }

    pub fn is_reconcile_active(&self) -> bool {
        self.reconcile.is_some()
    }

    /// Whether a reconciliation tick came from the live timer.
    pub fn accepts_reconcile_tick(&self, generation: u64) -> bool {
        self.reconcile
            .as_ref()
            .is_some_and(|timer| timer.generation == generation)
    }

    /// Cancel both timers.
    pub fn shutdown(&mut self) {
        self.network_poll = None;
        self.reconcile = None;
    }
}
