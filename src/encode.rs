//! Video encoder: encode an ordered set of still images into a video file.
//!
//! [`VideoEncoder`] streams images from disk one at a time into an FFmpeg
//! encoder, so memory use does not grow with the length of the recording.
//! Frame `i` is stamped with pts `i` in a `1/fps` time base, which holds each
//! image on screen for exactly `1/fps` seconds.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use bag2video::{VideoEncoder, VideoEncoderOptions};
//!
//! let frames = vec![PathBuf::from("frames/frame0000000.jpg"), PathBuf::from("frames/frame0000001.jpg")];
//! let summary = VideoEncoder::new(VideoEncoderOptions::default().fps(30))
//!     .encode_files("out.mp4", &frames)?;
//! println!("{} frames, {:?}", summary.frame_count, summary.duration);
//! # Ok::<(), bag2video::Bag2VideoError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::video::Encoder as OpenedVideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};

use crate::error::Bag2VideoError;
use crate::progress::ProgressTracker;

/// Options for the video encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderOptions {
    /// Frames per second of the output (default: 30).
    pub fps: u32,
    /// Codec to use. Default is H.264.
    pub codec: VideoCodec,
    /// Constant Rate Factor for H.264/H.265 (0-51, lower is better).
    /// Default: 23.
    pub crf: Option<u32>,
    /// Bitrate in bits per second. If set, overrides CRF.
    pub bitrate: Option<usize>,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            codec: VideoCodec::H264,
            crf: Some(23),
            bitrate: None,
        }
    }
}

impl VideoEncoderOptions {
    /// Set the frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the codec.
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }

    fn supports_crf(self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265)
    }
}

/// What a finished encode produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Number of frames written.
    pub frame_count: u64,
    /// Output frame rate.
    pub fps: u32,
    /// Playback length, `frame_count / fps`.
    pub duration: Duration,
    /// Output frame width.
    pub width: u32,
    /// Output frame height.
    pub height: u32,
}

/// Encodes a sequence of still images into a video file.
pub struct VideoEncoder {
    options: VideoEncoderOptions,
}

impl VideoEncoder {
    /// Create a new video encoder with the given options.
    pub fn new(options: VideoEncoderOptions) -> Self {
        Self { options }
    }

    /// Encode `files`, in the order given, into a video at `path`.
    ///
    /// The container format is inferred from the file extension. Every image
    /// must have the dimensions of the first one.
    ///
    /// # Errors
    ///
    /// - [`Bag2VideoError::NoFrames`] if `files` is empty.
    /// - [`Bag2VideoError::FrameSizeMismatch`] when a frame's size differs
    ///   from the first frame.
    /// - [`Bag2VideoError::VideoEncode`] if the codec cannot be opened or
    ///   rejects a frame.
    /// - [`Bag2VideoError::VideoWrite`] on container or I/O failure.
    pub fn encode_files<P: AsRef<Path>>(
        &self,
        path: P,
        files: &[PathBuf],
    ) -> Result<EncodeSummary, Bag2VideoError> {
        self.encode(path.as_ref(), files, None)
    }

    pub(crate) fn encode(
        &self,
        path: &Path,
        files: &[PathBuf],
        mut tracker: Option<&mut ProgressTracker>,
    ) -> Result<EncodeSummary, Bag2VideoError> {
        let fps = self.options.fps;
        log::info!(
            "Encoding {} frames to {} (codec={:?}, fps={fps})",
            files.len(),
            path.display(),
            self.options.codec,
        );
        let Some(first_path) = files.first() else {
            return Err(Bag2VideoError::NoFrames {
                directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            });
        };
        if fps == 0 {
            return Err(Bag2VideoError::VideoEncode("frame rate must be positive".to_string()));
        }

        ffmpeg_next::init()?;

        let first = image::open(first_path)?;
        let (width, height) = (first.width(), first.height());
        let codec_id = self.options.codec.to_codec_id();
        let target_pixel = Pixel::YUV420P;
        let encoder_time_base = Rational::new(1, fps as i32);

        let mut output = ffmpeg_next::format::output(path)
            .map_err(|e| Bag2VideoError::VideoWrite(format!("cannot open output: {e}")))?;

        // Must be read before add_stream borrows the output mutably.
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Bag2VideoError::VideoEncode(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| Bag2VideoError::VideoWrite(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| {
                Bag2VideoError::VideoEncode(format!("cannot create codec context: {e}"))
            })?
            .encoder()
            .video()
            .map_err(|e| Bag2VideoError::VideoEncode(format!("cannot open video encoder: {e}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(fps as i32, 1)));

        let mut codec_options = Dictionary::new();
        if let Some(bitrate) = self.options.bitrate {
            encoder.set_bit_rate(bitrate);
        } else if let Some(crf) = self.options.crf.filter(|_| self.options.codec.supports_crf()) {
            codec_options.set("crf", &crf.to_string());
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut opened_encoder = encoder
            .open_as_with(encoder_codec, codec_options)
            .map_err(|e| Bag2VideoError::VideoEncode(format!("cannot open encoder: {e}")))?;
        stream.set_parameters(&opened_encoder);

        output
            .write_header()
            .map_err(|e| Bag2VideoError::VideoWrite(format!("cannot write header: {e}")))?;

        // The muxer may pick its own time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| Bag2VideoError::VideoWrite("output stream vanished".to_string()))?
            .time_base();

        let mut scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| Bag2VideoError::VideoEncode(format!("cannot create scaler: {e}")))?;

        let mut packets = PacketSink {
            output: &mut output,
            stream_index,
            encoder_time_base,
            stream_time_base,
        };

        let mut src_frame = VideoFrame::new(Pixel::RGB24, width, height);
        let mut frame_index: i64 = 0;
        for file in files {
            let image = if frame_index == 0 { first.clone() } else { image::open(file)? };
            if image.width() != width || image.height() != height {
                return Err(Bag2VideoError::FrameSizeMismatch {
                    path: file.clone(),
                    expected_width: width,
                    expected_height: height,
                    actual_width: image.width(),
                    actual_height: image.height(),
                });
            }

            let rgb = image.to_rgb8();
            let row_len = width as usize * 3;
            let stride = src_frame.stride(0);
            let src_data = src_frame.data_mut(0);
            for (y, row) in rgb.as_raw().chunks_exact(row_len).enumerate() {
                let dst_start = y * stride;
                src_data[dst_start..dst_start + row_len].copy_from_slice(row);
            }

            let mut dst_frame = VideoFrame::empty();
            scaler
                .run(&src_frame, &mut dst_frame)
                .map_err(|e| Bag2VideoError::VideoEncode(format!("scaling failed: {e}")))?;
            dst_frame.set_pts(Some(frame_index));

            opened_encoder
                .send_frame(&dst_frame)
                .map_err(|e| Bag2VideoError::VideoEncode(format!("send_frame failed: {e}")))?;
            packets.drain(&mut opened_encoder)?;

            log::debug!("Encoded frame {frame_index} from {}", file.display());
            if let Some(tracker) = tracker.as_deref_mut() {
                tracker.advance(Some(frame_index as u64));
            }
            frame_index += 1;
        }

        opened_encoder
            .send_eof()
            .map_err(|e| Bag2VideoError::VideoEncode(format!("send_eof failed: {e}")))?;
        packets.drain(&mut opened_encoder)?;

        output
            .write_trailer()
            .map_err(|e| Bag2VideoError::VideoWrite(format!("cannot write trailer: {e}")))?;

        if let Some(tracker) = tracker {
            tracker.finish();
        }

        let frame_count = frame_index as u64;
        Ok(EncodeSummary {
            frame_count,
            fps,
            duration: Duration::from_secs_f64(frame_count as f64 / fps as f64),
            width,
            height,
        })
    }
}

/// Moves encoded packets from the encoder into the output container.
struct PacketSink<'a> {
    output: &'a mut Output,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
}

impl PacketSink<'_> {
    fn drain(&mut self, encoder: &mut OpenedVideoEncoder) -> Result<(), Bag2VideoError> {
        let mut packet = Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(self.output)
                .map_err(|e| Bag2VideoError::VideoWrite(format!("write packet failed: {e}")))?;
        }
        Ok(())
    }
}
