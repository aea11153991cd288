//! Review-processing pipeline — the orchestrator and its scheduling state.

pub mod scheduler;

pub use scheduler::{PipelineConfig, ReviewPipeline};

use chrono::{Timelike, Utc};

/// Source of the current wall-clock hour.
///
/// Injected so quota tests can pin the hour instead of mocking timers.
pub trait Clock: Send + Sync {
    /// Hour of day, 0-23.
    fn hour(&self) -> u32;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn hour(&self) -> u32 {
        Utc::now().hour()
    }
}

/// Rolling hourly cap on successful posts.
///
/// The counter resets exactly once when the wall-clock hour changes and is
/// never decremented otherwise. In-memory only — a restart resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    posted: u32,
    hour: u32,
}

impl QuotaWindow {
    /// Open a window anchored at the given hour.
    pub fn new(hour: u32) -> Self {
        Self { posted: 0, hour }
    }

    /// Zero the counter iff the hour advanced since the last roll.
    pub fn roll(&mut self, current_hour: u32) {
        if current_hour != self.hour {
            self.posted = 0;
            self.hour = current_hour;
        }
    }

    /// Count one successful post.
    pub fn record_post(&mut self) {
        self.posted += 1;
    }

    pub fn is_exhausted(&self, max_per_hour: u32) -> bool {
        self.posted >= max_per_hour
    }

    pub fn posted(&self) -> u32 {
        self.posted
    }
}

/// Pipeline state, for logging and the outer retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    ProcessingBatch,
    Sleeping,
    /// Entered after an unhandled cycle error; sleeps a fixed cooldown and
    /// returns to idle. Keeps the process alive indefinitely.
    Recovering,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::ProcessingBatch => "processing_batch",
            Self::Sleeping => "sleeping",
            Self::Recovering => "recovering",
        };
        write!(f, "{s}")
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Reviews returned by the listing sweep.
    pub fetched: usize,
    /// Reviews skipped because the ledger already had an entry.
    pub skipped: usize,
    /// Replies posted successfully.
    pub posted: usize,
    /// Attempts recorded as failed.
    pub failed: usize,
}
