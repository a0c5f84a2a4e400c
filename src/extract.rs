//! Frame extraction: recording frames to numbered still images.
//!
//! [`FrameExtractor`] pulls frames from a [`FrameSource`], color-maps each
//! one, and writes it as `frame<seq>.<ext>`, where `<seq>` is the frame's
//! sequence number zero-padded to seven digits. Extraction stops at the
//! first of:
//!
//! 1. the source reporting end-of-stream,
//! 2. a sequence number lower than the previous one (a looping source has
//!    wrapped back to its first frame),
//! 3. the configured frame limit, counted over every frame fetched.
//!
//! A repeated sequence number is skipped rather than written twice.

use std::path::{Path, PathBuf};

use crate::channel::Channel;
use crate::colorizer::Colorizer;
use crate::config::{DEFAULT_MAX_FRAMES, StillFormat};
use crate::error::Bag2VideoError;
use crate::playback::FrameSource;
use crate::progress::ProgressTracker;

/// Digits in the zero-padded frame index.
pub const FRAME_INDEX_WIDTH: usize = 7;

/// File name for the frame with the given sequence number.
///
/// Names sort lexicographically in sequence order for every sequence number
/// below 10^7.
pub fn frame_file_name(sequence: u64, format: StillFormat) -> String {
    format!(
        "frame{sequence:0width$}.{}",
        format.extension(),
        width = FRAME_INDEX_WIDTH
    )
}

/// Why extraction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The source ran out of frames.
    EndOfStream,
    /// The sequence number went backwards.
    WrapAround {
        /// Sequence number of the last frame written.
        previous: u64,
        /// The lower sequence number that ended the run.
        observed: u64,
    },
    /// The frame limit was reached.
    FrameLimit(u64),
}

/// What an extraction run produced.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    /// Image files written, in capture order.
    pub files: Vec<PathBuf>,
    /// Frames skipped because their sequence number repeated.
    pub duplicates: u64,
    /// Why the run stopped.
    pub termination: Termination,
}

impl ExtractionSummary {
    /// Number of frames written.
    pub fn frame_count(&self) -> u64 {
        self.files.len() as u64
    }
}

/// Writes one channel of a recording out as still images.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    channel: Channel,
    colorizer: Colorizer,
    format: StillFormat,
    max_frames: u64,
}

impl FrameExtractor {
    /// Create an extractor for `channel` with default format and limit.
    pub fn new(channel: Channel, colorizer: Colorizer) -> Self {
        Self {
            channel,
            colorizer,
            format: StillFormat::default(),
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    /// Set the still-image format.
    pub fn still_format(mut self, format: StillFormat) -> Self {
        self.format = format;
        self
    }

    /// Stop after fetching `max_frames` frames (minimum 1), skipped repeats
    /// included.
    pub fn max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    /// Extract every frame of `source` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Any decode error from the source or colorizer, or an image write
    /// failure. Files written before the error stay on disk.
    pub fn extract<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        output_dir: &Path,
    ) -> Result<ExtractionSummary, Bag2VideoError> {
        self.extract_tracked(source, output_dir, None)
    }

    pub(crate) fn extract_tracked<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        output_dir: &Path,
        mut tracker: Option<&mut ProgressTracker>,
    ) -> Result<ExtractionSummary, Bag2VideoError> {
        log::info!(
            "Collecting {} frames into {}",
            self.channel,
            output_dir.display()
        );

        let mut files = Vec::new();
        let mut duplicates = 0;
        let mut previous: Option<u64> = None;

        let termination = loop {
            // Skipped repeats count too, so a source stuck on one sequence
            // number still ends.
            if files.len() as u64 + duplicates >= self.max_frames {
                log::warn!(
                    "Stopping {} extraction at the {}-frame limit",
                    self.channel,
                    self.max_frames
                );
                break Termination::FrameLimit(self.max_frames);
            }

            let Some(frame) = source.next_frame()? else {
                break Termination::EndOfStream;
            };
            let sequence = frame.sequence;

            match previous {
                Some(last) if sequence < last => {
                    log::debug!("Sequence wrapped from {last} to {sequence}");
                    break Termination::WrapAround {
                        previous: last,
                        observed: sequence,
                    };
                }
                Some(last) if sequence == last => {
                    log::debug!("Skipping repeated frame {sequence}");
                    duplicates += 1;
                    continue;
                }
                _ => {}
            }

            let image = self.colorizer.colorize(&frame, self.channel)?;
            let path = output_dir.join(frame_file_name(sequence, self.format));
            image.save_with_format(&path, self.format.to_image_format())?;
            log::debug!("Wrote frame {sequence} to {}", path.display());

            files.push(path);
            previous = Some(sequence);
            if let Some(tracker) = tracker.as_deref_mut() {
                tracker.advance(Some(sequence));
            }
        };

        if let Some(tracker) = tracker {
            tracker.finish();
        }
        log::info!("Collected {} {} frames ({termination:?})", files.len(), self.channel);

        Ok(ExtractionSummary {
            files,
            duplicates,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(frame_file_name(0, StillFormat::Jpeg), "frame0000000.jpg");
        assert_eq!(frame_file_name(107, StillFormat::Png), "frame0000107.png");
        assert_eq!(frame_file_name(9_999_999, StillFormat::Bmp), "frame9999999.bmp");
    }

    #[test]
    fn lexicographic_order_matches_numeric_order() {
        let sequences = [0_u64, 1, 9, 10, 99, 100, 12_345, 999_999, 1_000_000, 9_999_999];
        let mut names: Vec<_> = sequences
            .iter()
            .rev()
            .map(|&sequence| frame_file_name(sequence, StillFormat::Jpeg))
            .collect();
        names.sort();
        let expected: Vec<_> = sequences
            .iter()
            .map(|&sequence| frame_file_name(sequence, StillFormat::Jpeg))
            .collect();
        assert_eq!(names, expected);
    }
}
