//! Capture channel selection.
//!
//! A RealSense recording stores each sensor stream on its own topic, e.g.
//! `/device_0/sensor_0/Depth_0/image/data`. [`Channel`] picks one of those
//! streams and carries the per-channel rules: which topics belong to it,
//! which pixel encodings are native to it, and the output frame rate derived
//! from the requested color rate.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::Bag2VideoError;
use crate::message::PixelEncoding;

/// Message type carrying image frames in a RealSense bag.
pub const IMAGE_MESSAGE_TYPE: &str = "sensor_msgs/Image";

const IMAGE_TOPIC_SUFFIX: &str = "/image/data";

/// A single sensor stream within a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// 16-bit depth stream.
    Depth,
    /// 8-bit color stream.
    Color,
}

impl Channel {
    /// All channels, in the order they are listed in help output.
    pub const ALL: [Channel; 2] = [Channel::Depth, Channel::Color];

    /// Lowercase name used on the command line and in output file names.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Depth => "depth",
            Channel::Color => "color",
        }
    }

    /// Output frame rate for this channel given the requested color rate.
    ///
    /// The depth sensor runs at twice the color rate, so depth videos are
    /// encoded at `2 * color_fps`.
    pub fn output_fps(self, color_fps: u32) -> u32 {
        match self {
            Channel::Depth => color_fps.saturating_mul(2),
            Channel::Color => color_fps,
        }
    }

    /// Whether `topic` is an image data topic of this channel.
    ///
    /// The stream segment of the topic (`Depth_0`, `Color_0`, ...) is
    /// matched case-insensitively against the channel name.
    pub fn matches_topic(self, topic: &str) -> bool {
        let Some(prefix) = topic.strip_suffix(IMAGE_TOPIC_SUFFIX) else {
            return false;
        };
        let stream = prefix.rsplit('/').next().unwrap_or_default();
        stream.to_ascii_lowercase().starts_with(self.name())
    }

    /// Whether `encoding` is a native pixel encoding for this channel.
    pub fn accepts(self, encoding: PixelEncoding) -> bool {
        match self {
            Channel::Depth => encoding == PixelEncoding::Depth16,
            Channel::Color => encoding != PixelEncoding::Depth16,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = Bag2VideoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "depth" => Ok(Channel::Depth),
            "color" | "colour" | "rgb" => Ok(Channel::Color),
            _ => Err(Bag2VideoError::UnknownChannel(value.to_string())),
        }
    }
}
