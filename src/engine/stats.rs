use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

/// Counters bumped by the tick and the consumer
#[derive(Debug, Default)]
pub struct EngineStats {
    ticks: AtomicU64,
    submitted: AtomicU64,
    withheld: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    events_applied: AtomicU64,
}

impl EngineStats {
    pub fn tick_started(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_withheld(&self) {
        self.withheld.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_applied(&self, count: usize) {
        self.events_applied.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, events_dropped: u64) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            withheld: self.withheld.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_dropped,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Ticks that ran, whatever their outcome
    pub ticks: u64,
    pub submitted: u64,
    /// Ticks whose snapshot was held back because the pad was busy or down
    pub withheld: u64,
    /// Firings dropped because the previous tick was still running
    pub skipped: u64,
    /// Ticks where the handler errored or panicked, or the submit failed
    pub failed: u64,
    pub events_applied: u64,
    pub events_dropped: u64,
}

/// Logs rates since the previous report
#[derive(Debug)]
pub struct StatsReporter {
    last: StatsSnapshot,
    since: DateTime<Local>,
}

impl StatsReporter {
    pub fn new(start: StatsSnapshot) -> Self {
        Self {
            last: start,
            since: Local::now(),
        }
    }

    pub fn report(&mut self, current: StatsSnapshot) {
        let now = Local::now();
        let elapsed_ms = (now - self.since).num_milliseconds().max(1) as f64;
        let seconds = elapsed_ms / 1000.0;

        let ticks = current.ticks.saturating_sub(self.last.ticks);
        let events = current.events_applied.saturating_sub(self.last.events_applied);
        info!(
            "Engine stats: {} ticks, {} events in {:.0} seconds",
            ticks, events, seconds
        );
        info!(
            "Average: {:.1} ticks/sec, {:.1} events/sec, {} skipped, {} failed, {} dropped",
            ticks as f64 / seconds,
            events as f64 / seconds,
            current.skipped.saturating_sub(self.last.skipped),
            current.failed.saturating_sub(self.last.failed),
            current.events_dropped.saturating_sub(self.last.events_dropped)
        );

        self.last = current;
        self.since = now;
    }
}
