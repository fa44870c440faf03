//! Recurring launch times aligned to the Unix epoch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::engine::{RunSummary, TournamentEngine};

/// Launches at every multiple of `period` since the epoch (the top of every
/// hour for a one hour period).
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    period: Duration,
}

impl Schedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_secs(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// First launch strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period.as_secs() as i64;
        let wait = period - now.timestamp().rem_euclid(period);
        let whole_second =
            now - chrono::Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
        whole_second + chrono::Duration::seconds(wait)
    }

    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Trigger `engine` at every launch. Never returns.
    pub async fn drive(self, engine: Arc<TournamentEngine>) {
        loop {
            let now = Utc::now();
            info!(next = %self.next_after(now).format("%Y-%m-%d %H:%M:%S UTC"), "next tournament");
            tokio::time::sleep(self.until_next(now)).await;

            match engine.trigger().await {
                Ok(RunSummary::Finished { champion, rounds }) => {
                    info!(?champion, rounds, "scheduled tournament finished")
                }
                Ok(summary) => info!(?summary, "scheduled tournament did not run"),
                Err(e) => error!(%e, "scheduled tournament failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod schedule_tests;
