//! Decides when a mutation reaches the disk.
//!
//! The scheduler never performs I/O itself. Callers hand it the save attempt
//! as a closure over their own state, and the scheduler decides whether to
//! run it now, defer it behind the single save timer, or retry it later.
//!
//! - **Synchronous mode** runs the save inside [`DebounceScheduler::on_mutation`],
//!   so the caller's response waits for the disk.
//! - **Debounced mode** arms the timer on the first mutation of a burst;
//!   later mutations find it armed and cost nothing. When the reactor sees
//!   the deadline pass it calls [`DebounceScheduler::on_timer_expired`], which
//!   saves and, on failure, re-arms with a longer backoff.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff::ExponentialBackoff;
use crate::config::BackoffConfig;
use crate::persistence::SaveError;

/// The one pending wake-up for "attempt a save".
#[derive(Debug, Default)]
pub struct SaveTimer {
    deadline: Option<Instant>,
}

impl SaveTimer {
    /// Arms the timer to expire after `delay`.
    ///
    /// Returns `false` and leaves the existing deadline untouched if the
    /// timer is already armed.
    pub fn arm(&mut self, delay: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + delay);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }
}

/// What a mutation led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    /// Synchronous mode, the save completed.
    Saved,
    /// Synchronous mode, the save failed. The mutation still stands.
    SaveFailed,
    /// Debounced mode, the timer was armed for this delay.
    Armed(Duration),
    /// Debounced mode, a save is already pending and will cover this mutation.
    AlreadyArmed,
}

/// What a timer expiry led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Saved,
    /// The save failed and the timer was re-armed for this delay.
    Retrying(Duration),
    /// Nothing was pending.
    Idle,
}

#[derive(Debug)]
enum SaveMode {
    Synchronous,
    Debounced {
        backoff: ExponentialBackoff,
        timer: SaveTimer,
    },
}

#[derive(Debug)]
pub struct DebounceScheduler {
    mode: SaveMode,
}

impl DebounceScheduler {
    pub fn new(config: BackoffConfig) -> Self {
        let mode = if config.is_synchronous() {
            SaveMode::Synchronous
        } else {
            SaveMode::Debounced {
                backoff: ExponentialBackoff::new(config.initial, config.max),
                timer: SaveTimer::default(),
            }
        };
        Self { mode }
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self.mode, SaveMode::Synchronous)
    }

    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    /// When the reactor should call [`Self::on_timer_expired`], if ever.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.mode {
            SaveMode::Synchronous => None,
            SaveMode::Debounced { timer, .. } => timer.deadline(),
        }
    }

    /// Backoff state in debounced mode.
    pub fn backoff(&self) -> Option<&ExponentialBackoff> {
        match &self.mode {
            SaveMode::Synchronous => None,
            SaveMode::Debounced { backoff, .. } => Some(backoff),
        }
    }

    /// Hook for a mutation that has already been applied in memory.
    pub fn on_mutation<F>(&mut self, save: F) -> SaveDecision
    where
        F: FnOnce() -> Result<(), SaveError>,
    {
        match &mut self.mode {
            SaveMode::Synchronous => match save() {
                Ok(()) => SaveDecision::Saved,
                Err(err) => {
                    warn!(error = ?err, "synchronous save failed");
                    SaveDecision::SaveFailed
                }
            },
            SaveMode::Debounced { backoff, timer } => {
                let delay = backoff.current();
                if timer.arm(delay) {
                    debug!(delay_ms = delay.as_millis() as u64, "save scheduled");
                    SaveDecision::Armed(delay)
                } else {
                    SaveDecision::AlreadyArmed
                }
            }
        }
    }

    /// Runs the pending save once its deadline has passed.
    pub fn on_timer_expired<F>(&mut self, save: F) -> TimerOutcome
    where
        F: FnOnce() -> Result<(), SaveError>,
    {
        let SaveMode::Debounced { backoff, timer } = &mut self.mode else {
            return TimerOutcome::Idle;
        };
        if !timer.is_armed() {
            return TimerOutcome::Idle;
        }

        timer.disarm();
        match save() {
            Ok(()) => {
                backoff.report_success();
                TimerOutcome::Saved
            }
            Err(err) => {
                backoff.report_failure();
                let retry_in = backoff.current();
                timer.arm(retry_in);
                warn!(
                    error = ?err,
                    retry_in_ms = retry_in.as_millis() as u64,
                    at_max = backoff.at_max(),
                    "save failed, will retry"
                );
                TimerOutcome::Retrying(retry_in)
            }
        }
    }
}
