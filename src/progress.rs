//! Progress reporting.
//!
//! Each pipeline stage (extract, encode, clean up) reports through one
//! [`ProgressCallback`] shared by every job of a batch. Callbacks observe
//! the run; they cannot stop it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bag2video::{Channel, ConversionOptions, OperationType, ProgressCallback, ProgressInfo};
//!
//! struct Log;
//!
//! impl ProgressCallback for Log {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if info.operation == OperationType::FrameExtraction {
//!             eprintln!("{} frames written (last: {:?})", info.current, info.sequence);
//!         }
//!     }
//! }
//!
//! let options = ConversionOptions::new()
//!     .with_progress(Arc::new(Log))
//!     .with_batch_size(100);
//! bag2video::convert("recording.bag", Channel::Depth, &options)?;
//! # Ok::<(), bag2video::Bag2VideoError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The pipeline stage currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Reading, color-mapping, and writing frame images.
    FrameExtraction,
    /// Encoding the frame images into a video.
    VideoEncoding,
    /// Deleting the frame images.
    Cleanup,
}

/// A snapshot of one stage's progress.
///
/// Delivered every [`ConversionOptions::with_batch_size`](crate::ConversionOptions::with_batch_size)
/// frames and once more when the stage ends.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Which stage is running.
    pub operation: OperationType,
    /// Frames handled by the stage so far.
    pub current: u64,
    /// Frames the stage expects to handle, if known. Extraction knows this
    /// only for indexed bags.
    pub total: Option<u64>,
    /// `current / total` as a percentage, capped at 100.
    pub percentage: Option<f32>,
    /// Time since the stage started.
    pub elapsed: Duration,
    /// Projected time to finish at the throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Sequence number (extraction) or output index (encoding) of the frame
    /// just handled. `None` in the final report of a stage.
    pub sequence: Option<u64>,
}

/// Receives progress snapshots during a conversion.
///
/// Must be [`Send`] and [`Sync`] so one callback can serve a whole batch.
pub trait ProgressCallback: Send + Sync {
    /// Called with each snapshot.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Counts handled frames for one stage and throttles callback delivery.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    handled: u64,
    every: u64,
    unreported: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        every: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            handled: 0,
            every: every.max(1),
            unreported: 0,
            started: Instant::now(),
        }
    }

    /// Count one frame; report if `every` frames have gone unreported.
    pub(crate) fn advance(&mut self, sequence: Option<u64>) {
        self.handled += 1;
        self.unreported += 1;
        if self.unreported == self.every {
            self.unreported = 0;
            self.emit(sequence);
        }
    }

    /// Send the closing snapshot of the stage.
    pub(crate) fn finish(&mut self) {
        self.unreported = 0;
        self.emit(None);
    }

    fn emit(&self, sequence: Option<u64>) {
        let elapsed = self.started.elapsed();
        let known_total = self.total.filter(|&total| total > 0);

        let percentage =
            known_total.map(|total| (100.0 * self.handled as f32 / total as f32).min(100.0));
        let estimated_remaining = known_total.filter(|_| self.handled > 0).map(|total| {
            let left = total.saturating_sub(self.handled);
            elapsed.mul_f64(left as f64 / self.handled as f64)
        });

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.handled,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            sequence,
        });
    }
}
