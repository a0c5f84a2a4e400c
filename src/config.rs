//! Conversion configuration.
//!
//! [`ConversionOptions`] is a builder that carries every setting of a
//! conversion run: the requested color frame rate, where temporary frame
//! images go and in which format, color-mapping, encoder settings, the
//! extraction bound, the failure cleanup policy, and the progress callback.
//!
//! # Example
//!
//! ```no_run
//! use bag2video::{ColorScheme, ColorizerOptions, ConversionOptions, StillFormat};
//!
//! let options = ConversionOptions::new()
//!     .with_color_fps(30)
//!     .with_still_format(StillFormat::Png)
//!     .with_colorizer(ColorizerOptions::default().scheme(ColorScheme::Classic))
//!     .with_keep_frames_on_error(false);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use image::ImageFormat;

use crate::colorizer::ColorizerOptions;
use crate::encode::VideoEncoderOptions;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Color frame rate used when none is requested.
pub const DEFAULT_COLOR_FPS: u32 = 15;

/// Default root directory for temporary frame images.
pub const DEFAULT_FRAMES_DIR: &str = "frames";

/// Frames whose sequence number fits the 7-digit file name.
pub const DEFAULT_MAX_FRAMES: u64 = 10_000_000;

/// Container extension of the output videos.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Still-image format for temporary frame files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StillFormat {
    /// JPEG (`.jpg`). The default.
    #[default]
    Jpeg,
    /// PNG (`.png`), lossless.
    Png,
    /// Windows bitmap (`.bmp`), uncompressed.
    Bmp,
}

impl StillFormat {
    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            StillFormat::Jpeg => "jpg",
            StillFormat::Png => "png",
            StillFormat::Bmp => "bmp",
        }
    }

    /// Map to the `image` crate's format.
    pub(crate) fn to_image_format(self) -> ImageFormat {
        match self {
            StillFormat::Jpeg => ImageFormat::Jpeg,
            StillFormat::Png => ImageFormat::Png,
            StillFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// Whether `path` has an extension the assembler picks up.
    pub fn is_still_image(path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                matches!(
                    extension.to_ascii_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "bmp"
                )
            })
    }
}

impl FromStr for StillFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(StillFormat::Jpeg),
            "png" => Ok(StillFormat::Png),
            "bmp" => Ok(StillFormat::Bmp),
            _ => Err(format!("unsupported image format: {value}")),
        }
    }
}

/// Settings for converting recordings to videos.
///
/// A default-constructed value matches the command-line defaults: 15 fps
/// color, JPEG frames under `frames/`, jet color-mapping with histogram
/// equalization, and frames kept on disk when a run fails.
#[derive(Clone)]
pub struct ConversionOptions {
    pub(crate) color_fps: u32,
    pub(crate) frames_root: PathBuf,
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) still_format: StillFormat,
    pub(crate) colorizer: ColorizerOptions,
    pub(crate) encoder: VideoEncoderOptions,
    pub(crate) max_frames: u64,
    pub(crate) looping: bool,
    pub(crate) keep_frames_on_error: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            color_fps: DEFAULT_COLOR_FPS,
            frames_root: PathBuf::from(DEFAULT_FRAMES_DIR),
            output_dir: None,
            still_format: StillFormat::default(),
            colorizer: ColorizerOptions::default(),
            encoder: VideoEncoderOptions::default(),
            max_frames: DEFAULT_MAX_FRAMES,
            looping: false,
            keep_frames_on_error: true,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }
}

impl ConversionOptions {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the color frame rate. Depth is encoded at twice this rate.
    pub fn with_color_fps(mut self, fps: u32) -> Self {
        self.color_fps = fps;
        self
    }

    /// Set the directory under which per-run frame directories are created.
    pub fn with_frames_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.frames_root = root.into();
        self
    }

    /// Write videos into `dir` instead of next to each recording.
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set the still-image format of temporary frames.
    pub fn with_still_format(mut self, format: StillFormat) -> Self {
        self.still_format = format;
        self
    }

    /// Set the depth color-mapping options.
    pub fn with_colorizer(mut self, colorizer: ColorizerOptions) -> Self {
        self.colorizer = colorizer;
        self
    }

    /// Set the encoder options. Their `fps` is replaced per channel.
    pub fn with_encoder(mut self, encoder: VideoEncoderOptions) -> Self {
        self.encoder = encoder;
        self
    }

    /// Stop extraction after this many frames (minimum 1).
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    /// Replay the recording in a loop and end on sequence wrap-around.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Keep a failed run's frame directory on disk for inspection.
    pub fn with_keep_frames_on_error(mut self, keep: bool) -> Self {
        self.keep_frames_on_error = keep;
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Fire the progress callback every `batch_size` frames (minimum 1).
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The requested color frame rate.
    pub fn color_fps(&self) -> u32 {
        self.color_fps
    }

    /// Root directory for temporary frame images.
    pub fn frames_root(&self) -> &Path {
        &self.frames_root
    }

    /// Still-image format of temporary frames.
    pub fn still_format(&self) -> StillFormat {
        self.still_format
    }

    /// Extraction bound.
    pub fn max_frames(&self) -> u64 {
        self.max_frames
    }

    /// Whether failed runs keep their frames.
    pub fn keep_frames_on_error(&self) -> bool {
        self.keep_frames_on_error
    }
}

impl Debug for ConversionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConversionOptions")
            .field("color_fps", &self.color_fps)
            .field("frames_root", &self.frames_root)
            .field("output_dir", &self.output_dir)
            .field("still_format", &self.still_format)
            .field("colorizer", &self.colorizer)
            .field("encoder", &self.encoder)
            .field("max_frames", &self.max_frames)
            .field("looping", &self.looping)
            .field("keep_frames_on_error", &self.keep_frames_on_error)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
