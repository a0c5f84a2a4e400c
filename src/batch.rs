//! Batch conversion of several recordings and channels.
//!
//! Jobs run one after another, recordings in the outer loop and channels in
//! the inner loop. A failed job is recorded in the [`BatchReport`] and the
//! batch moves on to the next one.
//!
//! # Example
//!
//! ```no_run
//! use bag2video::{BatchRequest, Channel, ConversionOptions};
//!
//! let request = BatchRequest::new(
//!     vec!["a.bag".into(), "b.bag".into()],
//!     vec![Channel::Depth, Channel::Color],
//! );
//! let report = bag2video::run_batch(&request, &ConversionOptions::default());
//! println!("{} of {} jobs succeeded", report.succeeded().count(), report.jobs.len());
//! ```

use std::path::PathBuf;

use serde_json::{Value, json};

use crate::channel::Channel;
use crate::config::ConversionOptions;
use crate::error::Bag2VideoError;
use crate::extract::Termination;
use crate::pipeline::{ConversionOutput, convert};

/// The recordings and channels to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Recordings, in processing order.
    pub recordings: Vec<PathBuf>,
    /// Channels to extract from each recording.
    pub channels: Vec<Channel>,
}

impl BatchRequest {
    /// Create a request.
    pub fn new(recordings: Vec<PathBuf>, channels: Vec<Channel>) -> Self {
        Self {
            recordings,
            channels,
        }
    }

    /// Every (recording, channel) pair, in processing order.
    pub fn jobs(&self) -> impl Iterator<Item = (&PathBuf, Channel)> {
        self.recordings.iter().flat_map(move |recording| {
            self.channels.iter().map(move |&channel| (recording, channel))
        })
    }
}

/// Outcome of one (recording, channel) job.
#[derive(Debug)]
pub struct JobOutcome {
    /// The recording.
    pub recording: PathBuf,
    /// The channel.
    pub channel: Channel,
    /// The conversion result.
    pub result: Result<ConversionOutput, Bag2VideoError>,
}

/// Outcomes of every job in a batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per job.
    pub jobs: Vec<JobOutcome>,
}

impl BatchReport {
    /// Jobs that produced a video.
    pub fn succeeded(&self) -> impl Iterator<Item = &ConversionOutput> {
        self.jobs.iter().filter_map(|job| job.result.as_ref().ok())
    }

    /// Jobs that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (&JobOutcome, &Bag2VideoError)> {
        self.jobs
            .iter()
            .filter_map(|job| job.result.as_ref().err().map(|error| (job, error)))
    }

    /// Whether every job succeeded.
    pub fn is_success(&self) -> bool {
        self.jobs.iter().all(|job| job.result.is_ok())
    }

    /// Machine-readable form of the report.
    pub fn to_json(&self) -> Value {
        let jobs: Vec<Value> = self
            .jobs
            .iter()
            .map(|job| match &job.result {
                Ok(output) => json!({
                    "recording": job.recording.display().to_string(),
                    "channel": job.channel.name(),
                    "status": "ok",
                    "video": output.video.display().to_string(),
                    "fps": output.fps,
                    "frame_count": output.frame_count,
                    "duration_seconds": output.duration.as_secs_f64(),
                    "termination": termination_label(output.termination),
                    "duplicates": output.duplicates,
                }),
                Err(error) => json!({
                    "recording": job.recording.display().to_string(),
                    "channel": job.channel.name(),
                    "status": "error",
                    "error": error.to_string(),
                }),
            })
            .collect();
        json!({
            "succeeded": self.succeeded().count(),
            "failed": self.jobs.len() - self.succeeded().count(),
            "jobs": jobs,
        })
    }
}

fn termination_label(termination: Termination) -> &'static str {
    match termination {
        Termination::EndOfStream => "end_of_stream",
        Termination::WrapAround { .. } => "wrap_around",
        Termination::FrameLimit(_) => "frame_limit",
    }
}

/// Run every job of `request` with the same options.
pub fn run_batch(request: &BatchRequest, options: &ConversionOptions) -> BatchReport {
    let mut report = BatchReport::default();
    for (recording, channel) in request.jobs() {
        log::info!("Converting {} ({channel})", recording.display());
        let result = convert(recording, channel, options);
        if let Err(error) = &result {
            log::error!("{} ({channel}) failed: {error}", recording.display());
        }
        report.jobs.push(JobOutcome {
            recording: recording.clone(),
            channel,
            result,
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_iterate_recordings_then_channels() {
        let request = BatchRequest::new(
            vec!["a.bag".into(), "b.bag".into()],
            vec![Channel::Depth, Channel::Color],
        );
        let jobs: Vec<_> = request
            .jobs()
            .map(|(recording, channel)| (recording.to_string_lossy().into_owned(), channel))
            .collect();
        assert_eq!(
            jobs,
            [
                ("a.bag".to_string(), Channel::Depth),
                ("a.bag".to_string(), Channel::Color),
                ("b.bag".to_string(), Channel::Depth),
                ("b.bag".to_string(), Channel::Color),
            ]
        );
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let request = BatchRequest::new(
            vec![dir.path().join("missing.bag"), dir.path().join("notes.txt")],
            vec![Channel::Depth],
        );
        let options = ConversionOptions::new().with_frames_root(dir.path().join("frames"));
        let report = run_batch(&request, &options);

        assert_eq!(report.jobs.len(), 2);
        assert!(!report.is_success());
        assert!(matches!(report.jobs[0].result, Err(Bag2VideoError::BagOpen { .. })));
        assert!(matches!(
            report.jobs[1].result,
            Err(Bag2VideoError::InvalidExtension { .. })
        ));
        assert_eq!(report.to_json()["failed"], 2);
    }
}
