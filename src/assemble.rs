//! Video assembly from a directory of frame images.
//!
//! The directory listing comes back in no particular order, so the images
//! are sorted by file name before encoding. Frame names are zero-padded,
//! which makes that sort equal to capture order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::StillFormat;
use crate::encode::{EncodeSummary, VideoEncoder, VideoEncoderOptions};
use crate::error::Bag2VideoError;
use crate::progress::{OperationType, ProgressCallback, ProgressTracker};

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssemblySummary {
    /// The video that was written.
    pub output: PathBuf,
    /// The image files fed to the encoder, in encode order.
    pub inputs: Vec<PathBuf>,
    /// Encoder statistics.
    pub encode: EncodeSummary,
}

/// List the still images in `directory`, sorted by file name.
///
/// # Errors
///
/// - [`Bag2VideoError::Io`] if the directory cannot be read.
/// - [`Bag2VideoError::NoFrames`] if it holds no recognized images.
pub fn collect_frame_images(directory: &Path) -> Result<Vec<PathBuf>, Bag2VideoError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && StillFormat::is_still_image(&path) {
            images.push(path);
        }
    }
    if images.is_empty() {
        return Err(Bag2VideoError::NoFrames {
            directory: directory.to_path_buf(),
        });
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Encode every image in `directory` into `output`.
pub fn assemble_video(
    directory: &Path,
    output: &Path,
    options: &VideoEncoderOptions,
) -> Result<AssemblySummary, Bag2VideoError> {
    assemble(directory, output, options, None)
}

pub(crate) fn assemble(
    directory: &Path,
    output: &Path,
    options: &VideoEncoderOptions,
    progress: Option<(&Arc<dyn ProgressCallback>, u64)>,
) -> Result<AssemblySummary, Bag2VideoError> {
    let inputs = collect_frame_images(directory)?;
    log::info!(
        "Assembling {} frames from {} at {} fps",
        inputs.len(),
        directory.display(),
        options.fps
    );

    let mut tracker = progress.map(|(callback, batch_size)| {
        ProgressTracker::new(
            callback.clone(),
            OperationType::VideoEncoding,
            Some(inputs.len() as u64),
            batch_size,
        )
    });
    let encode = VideoEncoder::new(options.clone()).encode(output, &inputs, tracker.as_mut())?;

    Ok(AssemblySummary {
        output: output.to_path_buf(),
        inputs,
        encode,
    })
}
