//! Color-mapping of raw frames into displayable RGB rasters.
//!
//! Depth frames are mapped through a [`ColorScheme`], either linearly over a
//! configured depth range or after histogram equalization, which spreads the
//! palette over the depths that actually occur in the frame. Zero depth
//! means "no data" and always maps to black.
//!
//! Color frames pass through with their channels reordered to RGB, so every
//! frame leaves the colorizer in the same layout.
//!
//! # Example
//!
//! ```no_run
//! use bag2video::{BagPlayback, Channel, ColorScheme, Colorizer, ColorizerOptions, FrameSource};
//!
//! let mut playback = BagPlayback::open("recording.bag", Channel::Depth)?;
//! let colorizer = Colorizer::new(ColorizerOptions::default().scheme(ColorScheme::Classic));
//! if let Some(frame) = playback.next_frame()? {
//!     colorizer.colorize(&frame, Channel::Depth)?.save("first.png")?;
//! }
//! # Ok::<(), bag2video::Bag2VideoError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use image::RgbImage;

use crate::channel::Channel;
use crate::error::Bag2VideoError;
use crate::message::{PixelEncoding, RawFrame};

const JET: &[[u8; 3]] = &[
    [0, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 0],
    [50, 0, 0],
];

const CLASSIC: &[[u8; 3]] = &[
    [30, 77, 203],
    [25, 60, 192],
    [45, 117, 220],
    [204, 108, 191],
    [196, 57, 178],
    [198, 33, 24],
];

const WHITE_TO_BLACK: &[[u8; 3]] = &[[255, 255, 255], [0, 0, 0]];

const BLACK_TO_WHITE: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];

/// Palette used to render depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorScheme {
    /// Blue (near) through red (far).
    #[default]
    Jet,
    /// Blue-purple-red palette.
    Classic,
    /// Near is white, far is black.
    Grayscale,
    /// Near is black, far is white.
    InverseGrayscale,
}

impl ColorScheme {
    fn palette(self) -> &'static [[u8; 3]] {
        match self {
            ColorScheme::Jet => JET,
            ColorScheme::Classic => CLASSIC,
            ColorScheme::Grayscale => WHITE_TO_BLACK,
            ColorScheme::InverseGrayscale => BLACK_TO_WHITE,
        }
    }

    /// Interpolated palette color at `t` in `[0, 1]`.
    pub fn sample(self, t: f32) -> [u8; 3] {
        let palette = self.palette();
        let scaled = t.clamp(0.0, 1.0) * (palette.len() - 1) as f32;
        let index = (scaled.floor() as usize).min(palette.len() - 2);
        let fraction = scaled - index as f32;
        let (from, to) = (palette[index], palette[index + 1]);
        let mut color = [0_u8; 3];
        for channel in 0..3 {
            let value = from[channel] as f32 + (to[channel] as f32 - from[channel] as f32) * fraction;
            color[channel] = value.round() as u8;
        }
        color
    }
}

impl Display for ColorScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            ColorScheme::Jet => "jet",
            ColorScheme::Classic => "classic",
            ColorScheme::Grayscale => "grayscale",
            ColorScheme::InverseGrayscale => "inverse-grayscale",
        })
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "jet" => Ok(ColorScheme::Jet),
            "classic" => Ok(ColorScheme::Classic),
            "grayscale" | "gray" | "white-to-black" => Ok(ColorScheme::Grayscale),
            "inverse-grayscale" | "black-to-white" => Ok(ColorScheme::InverseGrayscale),
            _ => Err(format!("unknown color scheme: {value}")),
        }
    }
}

/// Settings for depth color-mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorizerOptions {
    /// Palette (default: jet).
    pub scheme: ColorScheme,
    /// Spread the palette over the frame's depth histogram (default: on).
    /// When off, depth is mapped linearly over `min_depth..max_depth`.
    pub histogram_equalization: bool,
    /// Nearest depth in meters for linear mapping (default: 0).
    pub min_depth: f32,
    /// Farthest depth in meters for linear mapping (default: 6).
    pub max_depth: f32,
    /// Meters per raw depth unit (default: 0.001, RealSense Z16).
    pub depth_units: f32,
}

impl Default for ColorizerOptions {
    fn default() -> Self {
        Self {
            scheme: ColorScheme::Jet,
            histogram_equalization: true,
            min_depth: 0.0,
            max_depth: 6.0,
            depth_units: 0.001,
        }
    }
}

impl ColorizerOptions {
    /// Set the palette.
    pub fn scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Enable or disable histogram equalization.
    pub fn histogram_equalization(mut self, enabled: bool) -> Self {
        self.histogram_equalization = enabled;
        self
    }

    /// Set the linear mapping range in meters.
    pub fn depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Set the size of one raw depth unit in meters.
    pub fn depth_units(mut self, depth_units: f32) -> Self {
        self.depth_units = depth_units;
        self
    }
}

/// Converts raw frames into 8-bit RGB rasters.
#[derive(Debug, Clone, Default)]
pub struct Colorizer {
    options: ColorizerOptions,
}

impl Colorizer {
    /// Create a colorizer with the given options.
    pub fn new(options: ColorizerOptions) -> Self {
        Self { options }
    }

    /// The options this colorizer was built with.
    pub fn options(&self) -> &ColorizerOptions {
        &self.options
    }

    /// Color-map `frame`, which was read from `channel`.
    ///
    /// # Errors
    ///
    /// - [`Bag2VideoError::UnsupportedEncoding`] if the frame's encoding is
    ///   unknown or not native to `channel`.
    /// - [`Bag2VideoError::FrameDecode`] if the payload is shorter than the
    ///   declared geometry.
    pub fn colorize(&self, frame: &RawFrame, channel: Channel) -> Result<RgbImage, Bag2VideoError> {
        let encoding = frame
            .pixel_encoding()
            .filter(|&encoding| channel.accepts(encoding))
            .ok_or_else(|| Bag2VideoError::UnsupportedEncoding {
                channel,
                encoding: frame.encoding.clone(),
            })?;
        frame.validate(encoding)?;

        let pixels = match encoding {
            PixelEncoding::Depth16 => self.colorize_depth(frame),
            _ => to_rgb(frame, encoding),
        };

        RgbImage::from_raw(frame.width, frame.height, pixels).ok_or_else(|| {
            Bag2VideoError::FrameDecode {
                sequence: frame.sequence,
                reason: "raster size does not match frame geometry".to_string(),
            }
        })
    }

    fn colorize_depth(&self, frame: &RawFrame) -> Vec<u8> {
        let depth = depth_samples(frame);
        let scheme = self.options.scheme;
        let mut pixels = Vec::with_capacity(depth.len() * 3);

        if self.options.histogram_equalization {
            let histogram = cumulative_histogram(&depth);
            let total = histogram[u16::MAX as usize].max(1) as f32;
            for &sample in &depth {
                pixels.extend_from_slice(&match sample {
                    0 => [0, 0, 0],
                    _ => scheme.sample(histogram[sample as usize] as f32 / total),
                });
            }
        } else {
            let min = self.options.min_depth;
            let span = (self.options.max_depth - min).max(f32::EPSILON);
            for &sample in &depth {
                pixels.extend_from_slice(&match sample {
                    0 => [0, 0, 0],
                    _ => {
                        let meters = sample as f32 * self.options.depth_units;
                        scheme.sample((meters - min) / span)
                    }
                });
            }
        }
        pixels
    }
}

fn depth_samples(frame: &RawFrame) -> Vec<u16> {
    let mut samples = Vec::with_capacity(frame.width as usize * frame.height as usize);
    for y in 0..frame.height {
        samples.extend(frame.row(y, 2).chunks_exact(2).map(|pair| {
            let raw = [pair[0], pair[1]];
            if frame.big_endian {
                u16::from_be_bytes(raw)
            } else {
                u16::from_le_bytes(raw)
            }
        }));
    }
    samples
}

/// Cumulative count of valid (non-zero) samples at or below each depth.
fn cumulative_histogram(depth: &[u16]) -> Vec<u32> {
    let mut histogram = vec![0_u32; u16::MAX as usize + 1];
    for &sample in depth.iter().filter(|&&sample| sample != 0) {
        histogram[sample as usize] += 1;
    }
    for index in 2..histogram.len() {
        histogram[index] += histogram[index - 1];
    }
    histogram
}

fn to_rgb(frame: &RawFrame, encoding: PixelEncoding) -> Vec<u8> {
    let bytes_per_pixel = encoding.bytes_per_pixel();
    let mut pixels = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for y in 0..frame.height {
        for pixel in frame.row(y, bytes_per_pixel).chunks_exact(bytes_per_pixel) {
            match encoding {
                PixelEncoding::Rgb8 | PixelEncoding::Rgba8 => {
                    pixels.extend_from_slice(&pixel[..3]);
                }
                PixelEncoding::Bgr8 | PixelEncoding::Bgra8 => {
                    pixels.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
                }
                PixelEncoding::Mono8 => pixels.extend_from_slice(&[pixel[0]; 3]),
                PixelEncoding::Depth16 => unreachable!("depth frames are color-mapped"),
            }
        }
    }
    pixels
}
