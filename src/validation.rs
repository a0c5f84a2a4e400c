//! Upfront validation of a conversion request.
//!
//! Everything here runs before any recording is opened, so a bad argument
//! aborts the whole batch without touching the filesystem. Checks run in a
//! fixed order: missing arguments, file extensions, channel names, then the
//! frame rate.

use std::path::{Path, PathBuf};

use crate::batch::BatchRequest;
use crate::channel::Channel;
use crate::config::DEFAULT_COLOR_FPS;
use crate::error::Bag2VideoError;

/// Extension every recording must carry.
pub const RECORDING_EXTENSION: &str = "bag";

/// Reject paths without the `.bag` extension.
pub fn validate_recording_path(path: &Path) -> Result<(), Bag2VideoError> {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some(RECORDING_EXTENSION) => Ok(()),
        _ => Err(Bag2VideoError::InvalidExtension {
            path: path.to_path_buf(),
        }),
    }
}

/// Parse channel selectors, dropping repeats but keeping first-seen order.
pub fn parse_channels<S: AsRef<str>>(values: &[S]) -> Result<Vec<Channel>, Bag2VideoError> {
    let mut channels = Vec::with_capacity(values.len());
    for value in values {
        let channel: Channel = value.as_ref().parse()?;
        if channels.contains(&channel) {
            log::warn!("Channel {channel} requested more than once");
        } else {
            channels.push(channel);
        }
    }
    Ok(channels)
}

/// Parse the requested color frame rate, defaulting to 15.
pub fn parse_fps(value: Option<&str>) -> Result<u32, Bag2VideoError> {
    let Some(value) = value else {
        return Ok(DEFAULT_COLOR_FPS);
    };
    match value.trim().parse::<u32>() {
        Ok(fps) if fps > 0 => Ok(fps),
        _ => Err(Bag2VideoError::InvalidFrameRate(value.to_string())),
    }
}

/// Validate raw command-line inputs into a batch request and color rate.
///
/// # Errors
///
/// The first validation error found, in the order described in the module
/// documentation.
pub fn validate_request<S: AsRef<str>>(
    filepaths: &[PathBuf],
    types: &[S],
    fps: Option<&str>,
) -> Result<(BatchRequest, u32), Bag2VideoError> {
    if filepaths.is_empty() {
        return Err(Bag2VideoError::MissingArgument("--filepaths"));
    }
    if types.is_empty() {
        return Err(Bag2VideoError::MissingArgument("--types"));
    }
    for path in filepaths {
        validate_recording_path(path)?;
    }
    let channels = parse_channels(types)?;
    let fps = parse_fps(fps)?;
    Ok((BatchRequest::new(filepaths.to_vec(), channels), fps))
}
