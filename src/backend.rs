//! Ingestion backends.
//!
//! An [`IngestionBackend`] takes a submitted record and reports its progress
//! as a stream of percentages. The upload context owns the state machine
//! (status derivation, persistence, notifications); the backend only decides
//! *when* progress happens.
//!
//! [`TimerBackend`] is the simulated backend: it advances every record by a
//! fixed step on a fixed period. A real upload/processing service can replace
//! it without touching the upload context.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::IngestConfig;
use crate::models::DocumentRecord;

/// Produces progress updates for submitted records.
pub trait IngestionBackend: Send + Sync {
    /// Starts work on `record` and returns its progress stream.
    ///
    /// Values are percentages in `1..=100`, expected to increase, and the
    /// stream ends after `100`. Dropping the receiver cancels the work.
    fn submit(&self, record: &DocumentRecord) -> mpsc::Receiver<u8>;
}

/// Simulated backend: `+step` percent every `period`, landing exactly on 100.
#[derive(Debug, Clone)]
pub struct TimerBackend {
    period: Duration,
    step: u8,
}

impl TimerBackend {
    pub fn new(period: Duration, step: u8) -> Self {
        Self {
            period,
            step: step.max(1),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.tick(), config.step)
    }
}

impl IngestionBackend for TimerBackend {
    fn submit(&self, record: &DocumentRecord) -> mpsc::Receiver<u8> {
        let (tx, rx) = mpsc::channel(1);
        let period = self.period;
        let step = self.step;
        let start = record.progress.min(100);

        tokio::spawn(async move {
            if start >= 100 {
                return;
            }
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut progress = start;
            while progress < 100 {
                ticker.tick().await;
                progress = next_progress(progress, step);
                if tx.send(progress).await.is_err() {
                    // receiver gone: the record was cancelled
                    return;
                }
            }
        });

        rx
    }
}

/// Advances `progress` by `step`, clamped to 100.
pub fn next_progress(progress: u8, step: u8) -> u8 {
    progress.saturating_add(step).min(100)
}

/// Number of ticks needed to reach 100 from `start` with `step`.
pub fn ticks_to_complete(start: u8, step: u8) -> u32 {
    let remaining = 100u32.saturating_sub(start as u32);
    remaining.div_ceil(step.max(1) as u32)
}
