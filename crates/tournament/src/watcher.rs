//! Cancellable, deadline-bounded polling of an external condition.
//!
//! Used for ticket payments (is the invoice paid?) and for profile edits
//! (has the participant sent the new value?).

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::registry::{Signal, SignalReceiver, SignalState};

/// Terminal states of a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome<T, E> {
    /// The probe reported the condition as met
    Satisfied,
    /// A value arrived over the signal
    Delivered(T),
    TimedOut,
    /// Explicit reset or dropped registration
    Cancelled,
    /// The probe itself failed; the caller decides whether to retry
    CheckFailed(E),
}

/// Hard deadline measured from the start of the watch. Activity never renews it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct Watcher {
    poll_interval: Duration,
    deadline: Duration,
}

impl Watcher {
    pub fn new(poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            poll_interval,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run the watch until it reaches a terminal state.
    ///
    /// Every tick checks the signal first, then the probe, then the deadline,
    /// and only then sleeps one poll interval. A cancelled watch therefore
    /// never reports `Satisfied`, however soon the probe would have succeeded.
    pub async fn watch<T, E, F, Fut>(
        &self,
        signal: &mut SignalReceiver<T>,
        mut probe: F,
    ) -> WatchOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let deadline = Deadline::start(self.deadline);
        loop {
            match signal.check() {
                SignalState::Received(Signal::Deliver(value)) => {
                    return WatchOutcome::Delivered(value)
                }
                SignalState::Received(Signal::Reset) | SignalState::Closed => {
                    return WatchOutcome::Cancelled
                }
                SignalState::Quiet => {}
            }

            match probe().await {
                Ok(true) => return WatchOutcome::Satisfied,
                Ok(false) => {}
                Err(e) => return WatchOutcome::CheckFailed(e),
            }

            if deadline.expired() {
                return WatchOutcome::TimedOut;
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Watch that only ends through the signal or the deadline.
    pub async fn wait_for_value<T>(
        &self,
        signal: &mut SignalReceiver<T>,
    ) -> WatchOutcome<T, std::convert::Infallible> {
        self.watch(signal, || async { Ok(false) }).await
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod watcher_tests;
