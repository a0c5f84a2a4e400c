//! The extract → assemble → cleanup pipeline for one (recording, channel)
//! pair.
//!
//! Each run gets its own uniquely-named directory under the frames root, so
//! frames from different recordings or channels never meet. On success the
//! frame images are deleted and the directory removed. On failure the
//! directory is kept for inspection unless
//! [`ConversionOptions::with_keep_frames_on_error`] turned that off, in which
//! case it is removed as well.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assemble::{self, AssemblySummary};
use crate::channel::Channel;
use crate::cleanup;
use crate::colorizer::Colorizer;
use crate::config::{ConversionOptions, VIDEO_EXTENSION};
use crate::error::Bag2VideoError;
use crate::extract::{ExtractionSummary, FrameExtractor, Termination};
use crate::playback::{BagPlayback, FrameSource};
use crate::progress::{OperationType, ProgressTracker};
use crate::validation::validate_recording_path;

/// Result of converting one channel of one recording.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The recording that was read.
    pub recording: PathBuf,
    /// The channel that was extracted.
    pub channel: Channel,
    /// The video that was written.
    pub video: PathBuf,
    /// Frame rate of the video.
    pub fps: u32,
    /// Frames in the video.
    pub frame_count: u64,
    /// Playback length of the video.
    pub duration: Duration,
    /// Why extraction stopped.
    pub termination: Termination,
    /// Frames skipped for repeating a sequence number.
    pub duplicates: u64,
}

/// Path of the video for `recording` and `channel` at `fps`:
/// `<stem>_<channel>_<fps>fps.mp4`, next to the recording unless
/// `output_dir` is given.
pub fn output_video_path(
    recording: &Path,
    channel: Channel,
    fps: u32,
    output_dir: Option<&Path>,
) -> PathBuf {
    let stem = recording
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}_{channel}_{fps}fps.{VIDEO_EXTENSION}");
    match output_dir {
        Some(dir) => dir.join(name),
        None => recording.with_file_name(name),
    }
}

/// Convert one channel of a recording into a video.
///
/// # Errors
///
/// - [`Bag2VideoError::InvalidExtension`] before anything is written if
///   `recording` is not a `.bag` file.
/// - Any open, decode, encode, or I/O error from the pipeline stages.
pub fn convert<P: AsRef<Path>>(
    recording: P,
    channel: Channel,
    options: &ConversionOptions,
) -> Result<ConversionOutput, Bag2VideoError> {
    let recording = recording.as_ref();
    validate_recording_path(recording)?;
    check_fps(options)?;

    let mut playback = BagPlayback::open(recording, channel)?.looping(options.looping);
    convert_source(&mut playback, recording, channel, options)
}

/// Run the pipeline over an arbitrary frame source.
///
/// `recording` only names the output video; it is not opened.
pub fn convert_source<S: FrameSource + ?Sized>(
    source: &mut S,
    recording: &Path,
    channel: Channel,
    options: &ConversionOptions,
) -> Result<ConversionOutput, Bag2VideoError> {
    check_fps(options)?;
    let fps = channel.output_fps(options.color_fps);
    let video = output_video_path(recording, channel, fps, options.output_dir.as_deref());

    fs::create_dir_all(&options.frames_root)?;
    let stem = recording
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let run_dir = tempfile::Builder::new()
        .prefix(&format!("{stem}_{channel}_"))
        .tempdir_in(&options.frames_root)?;
    log::debug!("Frames for {} go to {}", video.display(), run_dir.path().display());

    match run_stages(source, run_dir.path(), &video, channel, fps, options) {
        Ok((extraction, assembly)) => {
            let mut tracker = ProgressTracker::new(
                options.progress.clone(),
                OperationType::Cleanup,
                Some(assembly.inputs.len() as u64),
                options.batch_size,
            );
            cleanup::remove_tracked(&assembly.inputs, Some(&mut tracker))?;
            run_dir.close()?;

            log::info!(
                "Wrote {} ({} frames, {:.2}s)",
                video.display(),
                assembly.encode.frame_count,
                assembly.encode.duration.as_secs_f64()
            );
            Ok(ConversionOutput {
                recording: recording.to_path_buf(),
                channel,
                video,
                fps,
                frame_count: assembly.encode.frame_count,
                duration: assembly.encode.duration,
                termination: extraction.termination,
                duplicates: extraction.duplicates,
            })
        }
        Err(error) if options.keep_frames_on_error => {
            let kept = run_dir.keep();
            log::warn!("Conversion failed; frames kept in {}", kept.display());
            Err(error)
        }
        Err(error) => Err(error),
    }
}

fn run_stages<S: FrameSource + ?Sized>(
    source: &mut S,
    frames_dir: &Path,
    video: &Path,
    channel: Channel,
    fps: u32,
    options: &ConversionOptions,
) -> Result<(ExtractionSummary, AssemblySummary), Bag2VideoError> {
    let extractor = FrameExtractor::new(channel, Colorizer::new(options.colorizer.clone()))
        .still_format(options.still_format)
        .max_frames(options.max_frames);
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        OperationType::FrameExtraction,
        source.frame_count_hint(),
        options.batch_size,
    );
    let extraction = extractor.extract_tracked(source, frames_dir, Some(&mut tracker))?;

    let encoder_options = options.encoder.clone().fps(fps);
    let assembly = assemble::assemble(
        frames_dir,
        video,
        &encoder_options,
        Some((&options.progress, options.batch_size)),
    )?;
    Ok((extraction, assembly))
}

fn check_fps(options: &ConversionOptions) -> Result<(), Bag2VideoError> {
    if options.color_fps == 0 {
        return Err(Bag2VideoError::InvalidFrameRate("0".to_string()));
    }
    Ok(())
}
