//! # bag2video
//!
//! Convert depth-camera recordings into playable videos.
//!
//! `bag2video` reads a RealSense ROS bag, color-maps every depth or color
//! frame into an RGB image, writes the images to a scratch directory under
//! zero-padded names, and encodes them in name order into an MP4 with
//! FFmpeg via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)
//! crate. The scratch images are deleted once the video is written.
//!
//! ## Quick Start
//!
//! ### Convert one channel
//!
//! ```no_run
//! use bag2video::{Channel, ConversionOptions};
//!
//! // Writes recording_depth_30fps.mp4 next to the recording.
//! let output = bag2video::convert("recording.bag", Channel::Depth, &ConversionOptions::default())?;
//! println!("{} frames -> {}", output.frame_count, output.video.display());
//! # Ok::<(), bag2video::Bag2VideoError>(())
//! ```
//!
//! ### Convert a batch
//!
//! ```no_run
//! use bag2video::{BatchRequest, Channel, ConversionOptions};
//!
//! let request = BatchRequest::new(vec!["a.bag".into()], vec![Channel::Depth, Channel::Color]);
//! let report = bag2video::run_batch(&request, &ConversionOptions::new().with_color_fps(30));
//! assert!(report.is_success());
//! ```
//!
//! ## Frame rates
//!
//! The requested rate is the color rate. Depth is captured at twice the
//! color rate, so depth videos are encoded at double the requested value.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system, with an
//! H.264 encoder available.

pub mod assemble;
pub mod bag;
pub mod batch;
pub mod channel;
pub mod cleanup;
pub mod colorizer;
pub mod config;
pub mod encode;
pub mod error;
pub mod extract;
pub mod ffmpeg;
pub mod message;
pub mod pipeline;
pub mod playback;
pub mod progress;
pub mod validation;

pub use assemble::{AssemblySummary, assemble_video, collect_frame_images};
pub use bag::{BagFile, ChunkInfo, Connection, MessageCursor, MessageRecord};
pub use batch::{BatchReport, BatchRequest, JobOutcome, run_batch};
pub use channel::Channel;
pub use cleanup::remove_frame_images;
pub use colorizer::{ColorScheme, Colorizer, ColorizerOptions};
pub use config::{ConversionOptions, StillFormat};
pub use encode::{EncodeSummary, VideoCodec, VideoEncoder, VideoEncoderOptions};
pub use error::Bag2VideoError;
pub use extract::{ExtractionSummary, FrameExtractor, Termination, frame_file_name};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use message::{PixelEncoding, RawFrame, decode_image};
pub use pipeline::{ConversionOutput, convert, convert_source, output_video_path};
pub use playback::{BagPlayback, FrameSource};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use validation::validate_request;
