//! Error types for the `bag2video` crate.
//!
//! This module defines [`Bag2VideoError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry the context needed to
//! diagnose a failed conversion: file paths, topics, and sequence numbers.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::channel::Channel;

/// The unified error type for all `bag2video` operations.
///
/// Variants fall into three groups: input validation (rejected before any
/// work starts), recording decode failures, and video encode failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Bag2VideoError {
    /// A required command-line input was not supplied.
    #[error("Argument {0} was not passed. For help, type --help")]
    MissingArgument(&'static str),

    /// The input path does not carry the `.bag` extension.
    #[error("{} is not a BAG file", path.display())]
    InvalidExtension {
        /// The rejected input path.
        path: PathBuf,
    },

    /// A channel selector other than `depth` or `color` was supplied.
    #[error("Frame type {0:?} not recognized (expected depth or color)")]
    UnknownChannel(String),

    /// The requested frame rate is not a positive integer.
    #[error("Invalid frame rate {0:?}: expected a positive integer")]
    InvalidFrameRate(String),

    /// The recording could not be opened.
    #[error("Failed to open recording at {}: {reason}", path.display())]
    BagOpen {
        /// Path of the recording.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The recording is not a well-formed ROS bag v2.0 container.
    #[error("Malformed bag at offset {offset}: {reason}")]
    InvalidBag {
        /// Byte offset of the offending record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A chunk uses a compression scheme the reader cannot inflate.
    #[error("Unsupported chunk compression: {0}")]
    UnsupportedCompression(String),

    /// The recording has no image stream for the requested channel.
    #[error("No {channel} stream found in {}", path.display())]
    ChannelNotFound {
        /// The requested channel.
        channel: Channel,
        /// Path of the recording.
        path: PathBuf,
    },

    /// An image message could not be decoded into a frame.
    #[error("Failed to decode frame {sequence}: {reason}")]
    FrameDecode {
        /// Sequence number of the frame, if the header was readable.
        sequence: u64,
        /// What went wrong.
        reason: String,
    },

    /// The frame's pixel encoding is not a native format for its channel.
    #[error("Unsupported {channel} pixel encoding {encoding:?}")]
    UnsupportedEncoding {
        /// The channel being extracted.
        channel: Channel,
        /// Encoding string from the image message.
        encoding: String,
    },

    /// The assembler found no still images to encode.
    #[error("No frame images found in {}", directory.display())]
    NoFrames {
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// A frame's dimensions differ from the first frame of the video.
    #[error("Frame {} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}", path.display())]
    FrameSizeMismatch {
        /// Image file with the odd size.
        path: PathBuf,
        /// Width of the first frame.
        expected_width: u32,
        /// Height of the first frame.
        expected_height: u32,
        /// Width of this frame.
        actual_width: u32,
        /// Height of this frame.
        actual_height: u32,
    },

    /// The encoder could not be found, configured, or fed.
    #[error("Video encoding error: {0}")]
    VideoEncode(String),

    /// Writing the output container failed.
    #[error("Video write error: {0}")]
    VideoWrite(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while writing or loading stills.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for Bag2VideoError {
    fn from(error: FfmpegError) -> Self {
        Bag2VideoError::Ffmpeg(error.to_string())
    }
}

impl Bag2VideoError {
    /// Whether this error was raised while validating inputs, before any
    /// recording was opened.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Bag2VideoError::MissingArgument(_)
                | Bag2VideoError::InvalidExtension { .. }
                | Bag2VideoError::UnknownChannel(_)
                | Bag2VideoError::InvalidFrameRate(_)
        )
    }
}
