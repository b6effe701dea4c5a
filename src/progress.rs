//! Progress reporting boundary.
//!
//! The matching passes report progress through the [`ProgressIndicator`]
//! trait. Display is someone else's job: the core only starts and ends
//! stages, reports a completion fraction, and checks the return value of
//! [`ProgressIndicator::set_level`] for a cancellation request.
//!
//! [`ProgressTracker`] throttles the calls so that a long loop touches the
//! indicator once per [`PROGRESS_BATCH`] items, which is also the cadence at
//! which cancellation is noticed.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::Result;

/// Number of items between consecutive `set_level` calls.
pub const PROGRESS_BATCH: u64 = 10_000;

/// Receives progress reports from the matching passes.
///
/// Implementations must be thread-safe; parallel passes report from worker
/// threads. A no-op implementation must not change matching results.
pub trait ProgressIndicator: Send + Sync {
    /// Begin a named stage of work.
    fn start_stage(&self, name: &str);

    /// Report the completed fraction (0 to 1) of the current stage.
    ///
    /// Returning `Err(MatchError::Interrupted)` asks the running pass to
    /// stop; the error is propagated to the caller of the pass.
    fn set_level(&self, level: f64) -> Result<()>;

    /// Finish the current stage.
    fn end_stage(&self);

    /// Free-text message about the match.
    fn log_message(&self, msg: &str);
}

/// Indicator that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressIndicator;

impl ProgressIndicator for NullProgressIndicator {
    fn start_stage(&self, _name: &str) {}

    fn set_level(&self, _level: f64) -> Result<()> {
        Ok(())
    }

    fn end_stage(&self) {}

    fn log_message(&self, _msg: &str) {}
}

/// Throttled progress counter for one stage.
///
/// Creating a tracker starts the stage; [`finish`](Self::finish) or
/// [`close`](Self::close) ends it. The counter is atomic so a single tracker
/// can be shared by parallel workers.
pub struct ProgressTracker<'a> {
    indicator: &'a dyn ProgressIndicator,
    total: u64,
    count: AtomicU64,
}

impl<'a> ProgressTracker<'a> {
    /// Start a stage named `stage` that will process `total` items.
    pub fn new(indicator: &'a dyn ProgressIndicator, total: u64, stage: &str) -> Self {
        indicator.start_stage(stage);
        Self {
            indicator,
            total,
            count: AtomicU64::new(0),
        }
    }

    /// Record one processed item.
    pub fn next_progress(&self) -> Result<()> {
        self.advance(1)
    }

    /// Record `n` processed items.
    ///
    /// The indicator is consulted whenever the running count crosses a
    /// multiple of [`PROGRESS_BATCH`]; an interruption is returned as
    /// `MatchError::Interrupted`.
    pub fn advance(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let before = self.count.fetch_add(n, Ordering::Relaxed);
        let after = before + n;
        if before / PROGRESS_BATCH != after / PROGRESS_BATCH {
            self.indicator.set_level(self.fraction(after))?;
        }
        Ok(())
    }

    /// Number of items recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// End a stage that completed.
    ///
    /// A final level of 1 is reported first; a cancellation raised by that
    /// flush is ignored because the stage has already finished.
    pub fn close(self) {
        let _ = self.indicator.set_level(1.0);
        self.indicator.end_stage();
    }

    /// End the stage with the outcome of its work and hand that outcome back.
    ///
    /// The final level of 1 is only reported on success. A failed or
    /// cancelled stage is ended without claiming completion.
    pub fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.close();
                Ok(value)
            }
            Err(e) => {
                self.indicator.end_stage();
                Err(e)
            }
        }
    }

    fn fraction(&self, count: u64) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (count as f64 / self.total as f64).min(1.0)
        }
    }
}
