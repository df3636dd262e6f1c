//! Progress reporting and cooperative cancellation.
//!
//! Long runs (neighbor finding, clustering) report after every point and
//! check a [`CancelToken`] at the same checkpoints. Cancellation is a terminal
//! state, not an error: runs return [`RunStatus::Cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

/// Which phase a progress update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Populating neighbor sets.
    Neighbors,
    /// Partitioning points into clusters and noise.
    Clustering,
}

/// A progress update: `processed` of `total` points done in `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Phase.
    pub stage: Stage,
    /// Points processed so far.
    pub processed: usize,
    /// Points in the run.
    pub total: usize,
}

impl Progress {
    /// Fraction done in `[0, 1]`. An empty run counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    /// Whole percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed.min(self.total) * 100) / self.total) as u8
    }
}

/// Receiver of progress updates. Delivery may be asynchronous.
pub trait ProgressSink: Send + Sync {
    /// Record one update.
    fn report(&self, progress: Progress);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

impl ProgressSink for Sender<Progress> {
    fn report(&self, progress: Progress) {
        // A dropped receiver just means nobody is watching.
        let _ = self.send(progress);
    }
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus<T> {
    /// The run finished and produced `T`.
    Completed(T),
    /// The run stopped at a checkpoint after cancellation was requested.
    Cancelled,
}

impl<T> RunStatus<T> {
    /// True for [`RunStatus::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Cancelled)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            RunStatus::Completed(v) => Some(v),
            RunStatus::Cancelled => None,
        }
    }
}

/// Everything a run needs from its caller: where to report, and when to stop.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    /// Progress destination.
    pub progress: &'a dyn ProgressSink,
    /// Cancellation flag.
    pub cancel: &'a CancelToken,
}

impl<'a> RunContext<'a> {
    /// Bundle a sink and a token.
    pub fn new(progress: &'a dyn ProgressSink, cancel: &'a CancelToken) -> Self {
        Self { progress, cancel }
    }

    #[inline]
    pub(crate) fn report(&self, stage: Stage, processed: usize, total: usize) {
        self.progress.report(Progress {
            stage,
            processed,
            total,
        });
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
