//! Frame extraction integration tests.

mod common;

use std::collections::VecDeque;
use std::time::Duration;

use bag2video::{
    Bag2VideoError, BagPlayback, Channel, Colorizer, ColorizerOptions, FrameExtractor,
    FrameSource, RawFrame, StillFormat, Termination, frame_file_name,
};

/// Replays a fixed list of frames, optionally looping like SDK playback.
struct ScriptedSource {
    frames: VecDeque<Result<RawFrame, Bag2VideoError>>,
    replay: Vec<RawFrame>,
    looping: bool,
}

impl ScriptedSource {
    fn depth(sequences: &[u64]) -> Self {
        let frames: Vec<RawFrame> = sequences.iter().map(|&sequence| depth_frame(sequence)).collect();
        Self {
            frames: frames.iter().cloned().map(Ok).collect(),
            replay: frames,
            looping: false,
        }
    }

    fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    fn then_fail(mut self, sequence: u64) -> Self {
        self.frames.push_back(Err(Bag2VideoError::FrameDecode {
            sequence,
            reason: "corrupt payload".to_string(),
        }));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, Bag2VideoError> {
        if self.frames.is_empty() && self.looping {
            self.frames = self.replay.iter().cloned().map(Ok).collect();
        }
        self.frames.pop_front().transpose()
    }
}

fn depth_frame(sequence: u64) -> RawFrame {
    let (width, height) = (8_u32, 6_u32);
    let mut data = Vec::with_capacity((width * height * 2) as usize);
    for pixel in 0..width * height {
        data.extend(((pixel * 40 + sequence as u32) as u16).to_le_bytes());
    }
    RawFrame {
        sequence,
        timestamp: Duration::from_millis(sequence * 33),
        width,
        height,
        encoding: "16UC1".to_string(),
        big_endian: false,
        step: width * 2,
        data,
    }
}

fn depth_extractor() -> FrameExtractor {
    FrameExtractor::new(Channel::Depth, Colorizer::new(ColorizerOptions::default()))
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn stops_at_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[0, 1, 2, 3]);

    let summary = depth_extractor().extract(&mut source, dir.path()).unwrap();
    assert_eq!(summary.termination, Termination::EndOfStream);
    assert_eq!(summary.frame_count(), 4);
    assert_eq!(
        file_names(dir.path()),
        ["frame0000000.jpg", "frame0000001.jpg", "frame0000002.jpg", "frame0000003.jpg"]
    );
}

#[test]
fn wrap_around_ends_a_looping_source_after_one_pass() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).looping();

    let summary = depth_extractor().extract(&mut source, dir.path()).unwrap();
    assert_eq!(summary.frame_count(), 10);
    assert_eq!(
        summary.termination,
        Termination::WrapAround {
            previous: 9,
            observed: 0
        }
    );
    assert_eq!(file_names(dir.path()).len(), 10);
}

#[test]
fn sequence_numbers_need_not_start_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[120, 121, 125]).looping();

    let summary = depth_extractor().extract(&mut source, dir.path()).unwrap();
    assert_eq!(summary.frame_count(), 3);
    assert_eq!(
        file_names(dir.path()),
        ["frame0000120.jpg", "frame0000121.jpg", "frame0000125.jpg"]
    );
}

#[test]
fn repeated_sequence_numbers_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[0, 1, 1, 2, 2, 2, 3]);

    let summary = depth_extractor().extract(&mut source, dir.path()).unwrap();
    assert_eq!(summary.frame_count(), 4);
    assert_eq!(summary.duplicates, 3);
    assert_eq!(file_names(dir.path()).len(), 4);
}

#[test]
fn frame_limit_bounds_a_source_that_never_wraps() {
    let dir = tempfile::tempdir().unwrap();
    let sequences: Vec<u64> = (0..50).collect();
    let mut source = ScriptedSource::depth(&sequences);

    let summary = depth_extractor()
        .max_frames(20)
        .extract(&mut source, dir.path())
        .unwrap();
    assert_eq!(summary.termination, Termination::FrameLimit(20));
    assert_eq!(summary.frame_count(), 20);
    assert_eq!(summary.files.last().unwrap().file_name().unwrap(), "frame0000019.jpg");
}

#[test]
fn still_format_controls_the_extension() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[4, 5]);

    let summary = depth_extractor()
        .still_format(StillFormat::Png)
        .extract(&mut source, dir.path())
        .unwrap();
    assert_eq!(
        file_names(dir.path()),
        [frame_file_name(4, StillFormat::Png), frame_file_name(5, StillFormat::Png)]
    );
    let image = image::open(&summary.files[0]).unwrap();
    assert_eq!((image.width(), image.height()), (8, 6));
}

#[test]
fn decode_error_keeps_frames_already_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::depth(&[0, 1, 2]).then_fail(3);

    let error = depth_extractor().extract(&mut source, dir.path()).unwrap_err();
    assert!(matches!(error, Bag2VideoError::FrameDecode { sequence: 3, .. }));
    assert_eq!(file_names(dir.path()).len(), 3);
}

#[test]
fn color_frames_on_the_depth_channel_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("walk.bag");
    common::realsense_bag(&[0], &[0]).write_to(&path);

    let mut color = BagPlayback::open(&path, Channel::Color).unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    let error = depth_extractor().extract(&mut color, &frames).unwrap_err();
    assert!(matches!(error, Bag2VideoError::UnsupportedEncoding { .. }));
}

#[test]
fn extracts_every_frame_of_a_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("walk.bag");
    let sequences: Vec<u32> = (0..10).collect();
    common::realsense_bag(&sequences, &[]).write_to(&path);

    let mut playback = BagPlayback::open(&path, Channel::Depth).unwrap().looping(true);
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    let summary = depth_extractor().extract(&mut playback, &frames).unwrap();

    assert_eq!(summary.frame_count(), 10);
    assert!(matches!(summary.termination, Termination::WrapAround { previous: 9, observed: 0 }));
    let image = image::open(&summary.files[0]).unwrap();
    assert_eq!((image.width(), image.height()), (common::WIDTH, common::HEIGHT));
}

#[test]
fn frame_limit_counts_skipped_repeats() {
    let dir = tempfile::tempdir().unwrap();
    // Every pass of a one-frame loop repeats the sequence number just written.
    let mut source = ScriptedSource::depth(&[0]).looping();

    let summary = depth_extractor()
        .max_frames(5)
        .extract(&mut source, dir.path())
        .unwrap();
    assert_eq!(summary.termination, Termination::FrameLimit(5));
    assert_eq!(summary.frame_count(), 1);
    assert_eq!(summary.duplicates, 4);
    assert_eq!(file_names(dir.path()), ["frame0000000.jpg"]);
}

#[test]
fn looping_single_frame_recording_ends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.bag");
    common::realsense_bag(&[42], &[]).write_to(&path);

    let mut playback = BagPlayback::open(&path, Channel::Depth).unwrap().looping(true);
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    let summary = depth_extractor()
        .max_frames(3)
        .extract(&mut playback, &frames)
        .unwrap();

    assert_eq!(summary.termination, Termination::FrameLimit(3));
    assert_eq!(summary.frame_count(), 1);
}
