// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Progress reporting hooks
//!
//! Long batch passes report progress through an injected [`ProgressReporter`]
//! rather than printing. Reporters are shared across worker threads.

use std::sync::atomic::{AtomicU8, Ordering};

/// Receives progress of a named stage within a scope (usually a resolution key)
pub trait ProgressReporter: Send + Sync {
    /// `done` out of `total` units of `stage` have completed
    fn on_progress(&self, scope: &str, stage: &str, done: usize, total: usize);
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_progress(&self, _scope: &str, _stage: &str, _done: usize, _total: usize) {}
}

/// Logs progress at `info` every `step_percent` percent
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    pub step_percent: u8,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self { step_percent: 20 }
    }
}

impl ProgressReporter for LogProgress {
    fn on_progress(&self, scope: &str, stage: &str, done: usize, total: usize) {
        let step = u64::from(self.step_percent.max(1));
        let percent = percent_of(done, total);
        let previous = percent_of(done.saturating_sub(1), total);
        if done == total || (done > 0 && percent / step != previous / step) {
            tracing::info!(
                target: "tractograph-observability",
                "[{}] {}: {}% ({}/{})",
                scope,
                stage,
                percent,
                done,
                total
            );
        }
    }
}

fn percent_of(done: usize, total: usize) -> u64 {
    if total == 0 {
        return 100;
    }
    (done as u64).saturating_mul(100) / total as u64
}

/// Turns a stream of "one more unit done" ticks into the few `on_progress`
/// calls that cross a percentage step boundary
///
/// Safe to tick from several threads.
pub struct PercentCounter<'a> {
    reporter: &'a dyn ProgressReporter,
    scope: &'a str,
    stage: &'a str,
    total: usize,
    step_percent: u8,
    done: std::sync::atomic::AtomicUsize,
    last_reported_step: AtomicU8,
}

impl<'a> PercentCounter<'a> {
    pub fn new(
        reporter: &'a dyn ProgressReporter,
        scope: &'a str,
        stage: &'a str,
        total: usize,
    ) -> Self {
        Self {
            reporter,
            scope,
            stage,
            total,
            step_percent: 20,
            done: std::sync::atomic::AtomicUsize::new(0),
            last_reported_step: AtomicU8::new(0),
        }
    }

    /// Report every `step_percent` percent instead of every 20
    pub fn with_step(mut self, step_percent: u8) -> Self {
        self.step_percent = step_percent.clamp(1, 100);
        self
    }

    /// Record `n` completed units
    pub fn add(&self, n: usize) {
        let done = self.done.fetch_add(n, Ordering::Relaxed) + n;
        let step = (percent_of(done, self.total) / u64::from(self.step_percent)) as u8;
        let last = self.last_reported_step.fetch_max(step, Ordering::Relaxed);
        if step > last {
            self.reporter
                .on_progress(self.scope, self.stage, done.min(self.total), self.total);
        }
    }

    pub fn tick(&self) {
        self.add(1);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}
