//! Stat Collector: accumulates run counters and emits a rate-limited
//! status line. Lives only in the coordinator process/task — never
//! shared across workers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::StatSnapshot;

pub struct StatCollector {
    submitted: u64,
    processed: u64,
    successes: u64,
    errors: u64,
    error_types: HashMap<String, u64>,
    started_at: Option<Instant>,
    last_status_at: Instant,
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatCollector {
    pub fn new() -> Self {
        Self {
            submitted: 0,
            processed: 0,
            successes: 0,
            errors: 0,
            error_types: HashMap::new(),
            started_at: None,
            last_status_at: Instant::now(),
        }
    }

    pub fn start_clock(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn add_submitted(&mut self, n: u64) {
        self.submitted += n;
    }

    pub fn add_success(&mut self) {
        self.successes += 1;
    }

    pub fn add_error(&mut self, tag: &str) {
        self.errors += 1;
        *self.error_types.entry(tag.to_string()).or_insert(0) += 1;
    }

    pub fn add_processed(&mut self) {
        self.processed += 1;
    }

    pub fn add_processed_n(&mut self, n: u64) {
        self.processed += n;
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            submitted: self.submitted,
            processed: self.processed,
            successes: self.successes,
            errors: self.errors,
            error_types: self.error_types.clone(),
        }
    }

    /// Returns true and resets the internal clock if `interval` has
    /// elapsed since the last time this returned true.
    pub fn should_print(&mut self, interval: Duration) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_status_at) >= interval {
            self.last_status_at = now;
            true
        } else {
            false
        }
    }

    pub fn print_periodic(&mut self, in_flight: usize, interval: Duration) {
        if self.should_print(interval) {
            let success_rate = if self.processed > 0 {
                self.successes as f64 / self.processed as f64 * 100.0
            } else {
                0.0
            };
            let elapsed = self
                .started_at
                .map(|s| s.elapsed().as_secs_f64())
                .unwrap_or(0.0)
                .max(f64::EPSILON);
            tracing::info!(
                in_flight,
                processed = self.processed,
                successes = self.successes,
                errors = self.errors,
                rate_per_sec = self.processed as f64 / elapsed,
                success_rate,
                "status"
            );
        }
    }

    pub fn print_final(&self) {
        let elapsed = self
            .started_at
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0)
            .max(f64::EPSILON);
        let error_rate = if self.processed > 0 {
            self.errors as f64 / self.processed as f64 * 100.0
        } else {
            0.0
        };
        tracing::info!(
            processed = self.processed,
            elapsed_secs = elapsed,
            rate_per_sec = self.processed as f64 / elapsed,
            error_rate,
            "run complete"
        );
    }
}
