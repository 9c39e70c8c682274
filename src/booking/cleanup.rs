//! Daily sweep that removes bookings from previous days.
//!
//! Runs on a cron schedule evaluated in the shop's local timezone. Each run
//! deletes every booking created before local midnight of the current day.

use crate::store::{Store, StoreResult};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Cron schedule plus the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CleanupSchedule {
    schedule: Schedule,
    timezone: Tz,
}

impl CleanupSchedule {
    pub fn new(expression: &str, timezone: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expression)
            .with_context(|| format!("Invalid cleanup schedule: {expression}"))?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid cleanup timezone '{timezone}': {e}"))?;
        Ok(Self { schedule, timezone })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Next firing strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }
}

/// Local midnight of the day containing `now`, expressed in UTC.
pub fn local_day_start(timezone: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&timezone)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    timezone
        .from_local_datetime(&local_midnight)
        .earliest()
        .map_or(now, |start| start.with_timezone(&Utc))
}

/// Delete bookings created before local midnight. Returns the number removed.
pub fn cleanup_old_bookings(store: &dyn Store, timezone: Tz, now: DateTime<Utc>) -> StoreResult<u64> {
    let cutoff = local_day_start(timezone, now);
    let removed = store.delete_bookings_before(cutoff)?;
    tracing::info!(removed, %cutoff, "Daily booking cleanup complete");
    Ok(removed)
}

/// Run the cleanup on `schedule` until the task is aborted.
pub fn spawn_daily_cleanup(
    store: Arc<dyn Store>,
    schedule: CleanupSchedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_run_after(now) else {
                tracing::warn!("Cleanup schedule has no upcoming runs; stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(%next, "Next booking cleanup scheduled");
            tokio::time::sleep(wait).await;

            if let Err(e) = cleanup_old_bookings(store.as_ref(), schedule.timezone(), Utc::now()) {
                tracing::error!("Daily booking cleanup failed: {e}");
            }
        }
    })
}
