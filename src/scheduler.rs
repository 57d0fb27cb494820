//! Daily sync scheduler
//!
//! A polling loop, not a timer callback: it sleeps in one-second
//! increments, compares wall-clock time against the next local midnight,
//! and checks the cancellation token once per iteration. In-flight syncs
//! are never interrupted; cancellation only skips the next iteration.

use crate::sync;
use chrono::{DateTime, Local, LocalResult, NaiveTime};
use rusqlite::Connection;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Flat delay after a failed sync attempt before polling resumes
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag, cloneable across tasks.
///
/// Signal handlers flip it; the scheduler loop observes it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one sync pass at startup, then daily at local midnight
pub struct Scheduler {
    cancel: CancelToken,
    last_sync: Option<DateTime<Local>>,
}

impl Scheduler {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            last_sync: None,
        }
    }

    /// The next local midnight after `now`
    pub fn next_midnight(now: DateTime<Local>) -> DateTime<Local> {
        let tomorrow = now.date_naive() + chrono::Duration::days(1);
        match tomorrow.and_time(NaiveTime::MIN).and_local_timezone(Local) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            // A DST gap swallowing midnight; fall back to now + 24h
            LocalResult::None => now + chrono::Duration::days(1),
        }
    }

    /// Seconds until the next scheduled sync
    pub fn seconds_until_next_sync(now: DateTime<Local>) -> i64 {
        (Self::next_midnight(now) - now).num_seconds()
    }

    /// Countdown as "HHh MMm SSs", or "MMm SSs" under an hour
    pub fn format_countdown(seconds: i64) -> String {
        if seconds <= 0 {
            return "Sync starting...".to_string();
        }
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;
        if hours > 0 {
            format!("{:02}h {:02}m {:02}s", hours, minutes, secs)
        } else {
            format!("{:02}m {:02}s", minutes, secs)
        }
    }

    /// Rewrite the status line in place on the terminal
    fn display_status(&self, seconds_until_sync: i64) {
        let mut line = format!(
            "\r{} | Next sync in: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            Self::format_countdown(seconds_until_sync)
        );
        if let Some(last) = self.last_sync {
            line.push_str(&format!(" | Last sync: {}", last.format("%Y-%m-%d %H:%M:%S")));
        }
        print!("{}", line);
        let _ = io::stdout().flush();
    }

    async fn attempt_sync(&mut self, conn: &mut Connection) {
        match sync::perform_sync(conn).await {
            Ok(report) => {
                self.last_sync = Some(Local::now());
                log::info!("Sync completed: {}", report);
            }
            Err(e) => {
                log::error!("Sync attempt failed: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    /// Main loop; returns once the cancellation token is flipped
    pub async fn run(&mut self, conn: &mut Connection) {
        log::info!("Starting continuous sync mode (daily at local midnight)");
        log::info!("Running initial sync...");
        self.attempt_sync(conn).await;
        log::info!("Entering continuous monitoring mode");

        while !self.cancel.is_cancelled() {
            let remaining = Self::seconds_until_next_sync(Local::now());
            self.display_status(remaining);

            if remaining <= 1 {
                println!();
                log::info!("Starting scheduled sync");
                self.attempt_sync(conn).await;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        println!();
        log::info!("Sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let view = token.clone();
        assert!(!view.is_cancelled());
        token.cancel();
        assert!(view.is_cancelled());
    }

    #[test]
    fn next_midnight_is_start_of_tomorrow() {
        let now = Local.with_ymd_and_hms(2026, 8, 6, 15, 30, 45).unwrap();
        let midnight = Scheduler::next_midnight(now);
        assert_eq!(midnight.hour(), 0);
        assert_eq!(midnight.minute(), 0);
        assert_eq!(midnight.second(), 0);
        assert_eq!(midnight.day(), 7);
        assert_eq!(midnight.month(), 8);
    }

    #[test]
    fn seconds_until_next_sync_is_bounded_by_a_day() {
        let now = Local.with_ymd_and_hms(2026, 8, 6, 23, 59, 30).unwrap();
        let remaining = Scheduler::seconds_until_next_sync(now);
        assert_eq!(remaining, 30);

        let now = Local.with_ymd_and_hms(2026, 8, 6, 0, 0, 0).unwrap();
        let remaining = Scheduler::seconds_until_next_sync(now);
        assert_eq!(remaining, 86_400);
    }

    #[test]
    fn countdown_formats() {
        assert_eq!(Scheduler::format_countdown(0), "Sync starting...");
        assert_eq!(Scheduler::format_countdown(-5), "Sync starting...");
        assert_eq!(Scheduler::format_countdown(59), "00m 59s");
        assert_eq!(Scheduler::format_countdown(61), "01m 01s");
        assert_eq!(Scheduler::format_countdown(3_661), "01h 01m 01s");
        assert_eq!(Scheduler::format_countdown(26 * 3600), "26h 00m 00s");
    }
}
