//! `sensor_msgs/Image` decoding.
//!
//! ROS1 serializes messages as packed little-endian fields; strings and
//! arrays carry a `u32` length prefix. An image message is laid out as:
//!
//! ```text
//! header.seq:u32 header.stamp:(u32,u32) header.frame_id:string
//! height:u32 width:u32 encoding:string is_bigendian:u8 step:u32 data:u8[]
//! ```
//!
//! RealSense recordings store the frame counter in `header.seq`, so that is
//! what [`RawFrame::sequence`] reports.

use std::time::Duration;

use crate::error::Bag2VideoError;

/// Pixel layout of a raw frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    /// 16-bit unsigned depth (`16UC1` / `mono16`, RealSense Z16).
    Depth16,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit BGR.
    Bgr8,
    /// 8-bit RGBA.
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// 8-bit single channel.
    Mono8,
}

impl PixelEncoding {
    /// Parse a ROS image encoding string.
    pub fn from_ros(encoding: &str) -> Option<Self> {
        match encoding {
            "16UC1" | "mono16" => Some(PixelEncoding::Depth16),
            "rgb8" => Some(PixelEncoding::Rgb8),
            "bgr8" => Some(PixelEncoding::Bgr8),
            "rgba8" => Some(PixelEncoding::Rgba8),
            "bgra8" => Some(PixelEncoding::Bgra8),
            "mono8" | "8UC1" => Some(PixelEncoding::Mono8),
            _ => None,
        }
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelEncoding::Depth16 => 2,
            PixelEncoding::Rgb8 | PixelEncoding::Bgr8 => 3,
            PixelEncoding::Rgba8 | PixelEncoding::Bgra8 => 4,
            PixelEncoding::Mono8 => 1,
        }
    }
}

/// One undecoded image frame read from a recording.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame counter from the message header.
    pub sequence: u64,
    /// Capture timestamp from the message header.
    pub timestamp: Duration,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// ROS encoding string as stored in the message.
    pub encoding: String,
    /// Whether 16-bit samples are big-endian.
    pub big_endian: bool,
    /// Row length in bytes, including any padding.
    pub step: u32,
    /// Pixel payload, `step * height` bytes.
    pub data: Vec<u8>,
}

impl RawFrame {
    /// The parsed pixel encoding, if it is one this crate understands.
    pub fn pixel_encoding(&self) -> Option<PixelEncoding> {
        PixelEncoding::from_ros(&self.encoding)
    }

    /// The packed bytes of row `y`, without padding.
    ///
    /// Callers must have validated the frame with [`RawFrame::validate`].
    pub(crate) fn row(&self, y: u32, bytes_per_pixel: usize) -> &[u8] {
        let start = y as usize * self.step as usize;
        &self.data[start..start + self.width as usize * bytes_per_pixel]
    }

    /// Check that the payload is large enough for the declared geometry.
    pub fn validate(&self, encoding: PixelEncoding) -> Result<(), Bag2VideoError> {
        let row_bytes = self.width as usize * encoding.bytes_per_pixel();
        if (self.step as usize) < row_bytes {
            return Err(self.decode_error(format!(
                "step {} is shorter than a {}-pixel row",
                self.step, self.width
            )));
        }
        let needed = self.step as usize * self.height as usize;
        if self.data.len() < needed {
            return Err(self.decode_error(format!(
                "payload has {} bytes, {}x{} frame needs {needed}",
                self.data.len(),
                self.width,
                self.height,
            )));
        }
        Ok(())
    }

    fn decode_error(&self, reason: String) -> Bag2VideoError {
        Bag2VideoError::FrameDecode {
            sequence: self.sequence,
            reason,
        }
    }
}

/// Deserialize a `sensor_msgs/Image` message body.
pub fn decode_image(bytes: &[u8]) -> Result<RawFrame, Bag2VideoError> {
    let mut reader = MessageReader::new(bytes);
    let sequence = reader
        .u32()
        .map_err(|reason| Bag2VideoError::FrameDecode { sequence: 0, reason })? as u64;
    decode_image_body(&mut reader, sequence)
        .map_err(|reason| Bag2VideoError::FrameDecode { sequence, reason })
}

fn decode_image_body(reader: &mut MessageReader<'_>, sequence: u64) -> Result<RawFrame, String> {
    let secs = reader.u32()?;
    let nanos = reader.u32()?;
    let _frame_id = reader.string()?;
    let height = reader.u32()?;
    let width = reader.u32()?;
    let encoding = reader.string()?;
    let big_endian = reader.u8()? != 0;
    let step = reader.u32()?;
    let data = reader.bytes()?.to_vec();
    Ok(RawFrame {
        sequence,
        timestamp: Duration::new(secs as u64, nanos.min(999_999_999)),
        width,
        height,
        encoding,
        big_endian,
        step,
        data,
    })
}

/// Cursor over a ROS1-serialized message.
struct MessageReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let slice = self
            .bytes
            .get(self.position..self.position + len)
            .ok_or_else(|| {
                format!(
                    "message truncated at byte {} (wanted {len} more)",
                    self.position
                )
            })?;
        self.position += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, String> {
        let mut raw = [0_u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> Result<&'a [u8], String> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String, String> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|error| format!("invalid UTF-8 string: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(sequence: u32, width: u32, height: u32, encoding: &str, data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&sequence.to_le_bytes());
        bytes.extend_from_slice(&7_u32.to_le_bytes());
        bytes.extend_from_slice(&500_u32.to_le_bytes());
        bytes.extend_from_slice(&0_u32.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&(encoding.len() as u32).to_le_bytes());
        bytes.extend_from_slice(encoding.as_bytes());
        bytes.push(0);
        let bpp = PixelEncoding::from_ros(encoding).map_or(1, PixelEncoding::bytes_per_pixel);
        bytes.extend_from_slice(&(width * bpp as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn decodes_depth_image() {
        let bytes = encode(42, 2, 1, "16UC1", &[1, 0, 2, 0]);
        let frame = decode_image(&bytes).unwrap();
        assert_eq!(frame.sequence, 42);
        assert_eq!(frame.timestamp, Duration::new(7, 500));
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.pixel_encoding(), Some(PixelEncoding::Depth16));
        assert_eq!(frame.step, 4);
        frame.validate(PixelEncoding::Depth16).unwrap();
    }

    #[test]
    fn truncated_message_reports_sequence() {
        let bytes = encode(9, 2, 2, "rgb8", &[0; 12]);
        let error = decode_image(&bytes[..bytes.len() - 20]).unwrap_err();
        assert!(matches!(error, Bag2VideoError::FrameDecode { sequence: 9, .. }));
    }

    #[test]
    fn short_payload_fails_validation() {
        let bytes = encode(3, 4, 4, "rgb8", &[0; 10]);
        let frame = decode_image(&bytes).unwrap();
        assert!(frame.validate(PixelEncoding::Rgb8).is_err());
    }
}
