//! Removal of intermediate frame images.

use std::fs;
use std::path::PathBuf;

use crate::error::Bag2VideoError;
use crate::progress::ProgressTracker;

/// Delete exactly the given frame images.
///
/// Returns the number of files removed. Other files in the same directory
/// are left alone.
///
/// # Errors
///
/// [`Bag2VideoError::Io`] on the first file that cannot be removed; files
/// after it are not attempted.
pub fn remove_frame_images(files: &[PathBuf]) -> Result<usize, Bag2VideoError> {
    remove_tracked(files, None)
}

pub(crate) fn remove_tracked(
    files: &[PathBuf],
    mut tracker: Option<&mut ProgressTracker>,
) -> Result<usize, Bag2VideoError> {
    log::info!("Deleting {} temporary frame images", files.len());
    for file in files {
        fs::remove_file(file)?;
        if let Some(tracker) = tracker.as_deref_mut() {
            tracker.advance(None);
        }
    }
    if let Some(tracker) = tracker {
        tracker.finish();
    }
    Ok(files.len())
}
