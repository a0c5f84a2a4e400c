//! Synthetic RealSense-style bag fixtures.
//!
//! Writes ROS bag v2.0 files with `sensor_msgs/Image` messages on the same
//! topics a RealSense camera records, so tests never need binary fixtures.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use bag2video::Bag2VideoError;

pub const DEPTH_TOPIC: &str = "/device_0/sensor_0/Depth_0/image/data";
pub const COLOR_TOPIC: &str = "/device_0/sensor_1/Color_0/image/data";
pub const IMAGE_TYPE: &str = "sensor_msgs/Image";

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
    Bz2,
}

impl Compression {
    fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Bz2 => "bz2",
        }
    }
}

struct ConnectionSpec {
    id: u32,
    topic: String,
    message_type: String,
}

struct MessageSpec {
    connection: u32,
    time: Duration,
    data: Vec<u8>,
}

/// Builds a bag file in memory.
pub struct BagBuilder {
    connections: Vec<ConnectionSpec>,
    messages: Vec<MessageSpec>,
    compression: Compression,
    messages_per_chunk: usize,
    indexed: bool,
}

impl BagBuilder {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
            messages: Vec::new(),
            compression: Compression::None,
            messages_per_chunk: 4,
            indexed: true,
        }
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn messages_per_chunk(mut self, count: usize) -> Self {
        self.messages_per_chunk = count.max(1);
        self
    }

    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn connection(mut self, id: u32, topic: &str, message_type: &str) -> Self {
        self.connections.push(ConnectionSpec {
            id,
            topic: topic.to_string(),
            message_type: message_type.to_string(),
        });
        self
    }

    pub fn message(mut self, connection: u32, time: Duration, data: Vec<u8>) -> Self {
        self.messages.push(MessageSpec {
            connection,
            time,
            data,
        });
        self
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).expect("write bag fixture");
    }

    pub fn build(&self) -> Vec<u8> {
        let mut chunks = Vec::new();
        let mut chunk_infos = Vec::new();
        let mut announced = Vec::new();
        let header_len = bag_header(0, 0, 0).len() as u64;
        let chunks_start = bag2video::bag::BAG_MAGIC.len() as u64 + header_len;

        for group in self.messages.chunks(self.messages_per_chunk) {
            let mut body = Vec::new();
            let mut index: Vec<(u32, Vec<(Duration, u32)>)> = Vec::new();
            for message in group {
                if !announced.contains(&message.connection) {
                    announced.push(message.connection);
                    body.extend(self.connection_record(message.connection));
                }
                let offset = body.len() as u32;
                body.extend(record(
                    &[
                        field("op", &[0x02]),
                        field("conn", &message.connection.to_le_bytes()),
                        field("time", &ros_time(message.time).to_le_bytes()),
                    ],
                    &message.data,
                ));
                match index.iter_mut().find(|(id, _)| *id == message.connection) {
                    Some((_, entries)) => entries.push((message.time, offset)),
                    None => index.push((message.connection, vec![(message.time, offset)])),
                }
            }

            let chunk_pos = chunks_start + chunks.len() as u64;
            let compressed = compress(&body, self.compression);
            chunks.extend(record(
                &[
                    field("op", &[0x05]),
                    field("compression", self.compression.name().as_bytes()),
                    field("size", &(body.len() as u32).to_le_bytes()),
                ],
                &compressed,
            ));
            for (connection, entries) in &index {
                let mut data = Vec::new();
                for (time, offset) in entries {
                    data.extend(ros_time(*time).to_le_bytes());
                    data.extend(offset.to_le_bytes());
                }
                chunks.extend(record(
                    &[
                        field("op", &[0x04]),
                        field("ver", &1_u32.to_le_bytes()),
                        field("conn", &connection.to_le_bytes()),
                        field("count", &(entries.len() as u32).to_le_bytes()),
                    ],
                    &data,
                ));
            }

            let start = group.iter().map(|message| message.time).min().unwrap_or_default();
            let end = group.iter().map(|message| message.time).max().unwrap_or_default();
            let counts: Vec<(u32, u32)> = index
                .iter()
                .map(|(connection, entries)| (*connection, entries.len() as u32))
                .collect();
            chunk_infos.push((chunk_pos, start, end, counts));
        }

        let mut bag = bag2video::bag::BAG_MAGIC.to_vec();
        if !self.indexed {
            bag.extend(bag_header(0, 0, 0));
            bag.extend(chunks);
            return bag;
        }

        let index_pos = chunks_start + chunks.len() as u64;
        bag.extend(bag_header(
            index_pos,
            self.connections.len() as u32,
            chunk_infos.len() as u32,
        ));
        bag.extend(chunks);
        for connection in &self.connections {
            bag.extend(self.connection_record(connection.id));
        }
        for (chunk_pos, start, end, counts) in chunk_infos {
            let mut data = Vec::new();
            for (connection, count) in &counts {
                data.extend(connection.to_le_bytes());
                data.extend(count.to_le_bytes());
            }
            bag.extend(record(
                &[
                    field("op", &[0x06]),
                    field("ver", &1_u32.to_le_bytes()),
                    field("chunk_pos", &chunk_pos.to_le_bytes()),
                    field("start_time", &ros_time(start).to_le_bytes()),
                    field("end_time", &ros_time(end).to_le_bytes()),
                    field("count", &(counts.len() as u32).to_le_bytes()),
                ],
                &data,
            ));
        }
        bag
    }

    fn connection_record(&self, id: u32) -> Vec<u8> {
        let connection = self
            .connections
            .iter()
            .find(|connection| connection.id == id)
            .expect("message on undeclared connection");
        let details: Vec<u8> = [
            field("topic", connection.topic.as_bytes()),
            field("type", connection.message_type.as_bytes()),
            field("md5sum", b"060021388200f6f0f447d0fcd9c64743"),
            field("message_definition", b"std_msgs/Header header\nuint32 height\n"),
        ]
        .concat();
        record(
            &[
                field("op", &[0x07]),
                field("conn", &id.to_le_bytes()),
                field("topic", connection.topic.as_bytes()),
            ],
            &details,
        )
    }
}

pub fn bag_header(index_pos: u64, conn_count: u32, chunk_count: u32) -> Vec<u8> {
    record(
        &[
            field("op", &[0x03]),
            field("index_pos", &index_pos.to_le_bytes()),
            field("conn_count", &conn_count.to_le_bytes()),
            field("chunk_count", &chunk_count.to_le_bytes()),
        ],
        &[b' '; 64],
    )
}

pub fn field(name: &str, value: &[u8]) -> Vec<u8> {
    let mut bytes = ((name.len() + 1 + value.len()) as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(b'=');
    bytes.extend_from_slice(value);
    bytes
}

pub fn record(fields: &[Vec<u8>], data: &[u8]) -> Vec<u8> {
    let header = fields.concat();
    let mut bytes = (header.len() as u32).to_le_bytes().to_vec();
    bytes.extend(header);
    bytes.extend((data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

fn ros_time(time: Duration) -> u64 {
    (time.as_secs() & 0xFFFF_FFFF) | ((time.subsec_nanos() as u64) << 32)
}

pub fn compress(body: &[u8], compression: Compression) -> Vec<u8> {
    match compression {
        Compression::None => body.to_vec(),
        Compression::Lz4 => {
            let mut encoder = lz4::EncoderBuilder::new()
                .build(Vec::new())
                .expect("lz4 encoder");
            encoder.write_all(body).expect("lz4 write");
            let (compressed, result) = encoder.finish();
            result.expect("lz4 finish");
            compressed
        }
        // Payload content is irrelevant: the reader rejects bz2 before
        // inflating anything.
        Compression::Bz2 => body.to_vec(),
    }
}

/// Serialize a `sensor_msgs/Image`.
pub fn image_message(sequence: u32, width: u32, height: u32, encoding: &str, data: &[u8]) -> Vec<u8> {
    let bytes_per_pixel = data.len() as u32 / (width * height).max(1);
    let mut bytes = Vec::new();
    bytes.extend(sequence.to_le_bytes());
    bytes.extend((sequence / 30).to_le_bytes());
    bytes.extend(((sequence % 30) * 33_333_333).to_le_bytes());
    let frame_id = b"camera";
    bytes.extend((frame_id.len() as u32).to_le_bytes());
    bytes.extend_from_slice(frame_id);
    bytes.extend(height.to_le_bytes());
    bytes.extend(width.to_le_bytes());
    bytes.extend((encoding.len() as u32).to_le_bytes());
    bytes.extend_from_slice(encoding.as_bytes());
    bytes.push(0);
    bytes.extend((width * bytes_per_pixel).to_le_bytes());
    bytes.extend((data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// A `16UC1` depth image whose values ramp with position and sequence.
pub fn depth_image(sequence: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((WIDTH * HEIGHT * 2) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let depth = if x == 0 { 0 } else { (500 + x * 20 + y * 5 + sequence) as u16 };
            data.extend(depth.to_le_bytes());
        }
    }
    image_message(sequence, WIDTH, HEIGHT, "16UC1", &data)
}

/// An `rgb8` color image.
pub fn color_image(sequence: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            data.extend([(x * 4) as u8, (y * 5) as u8, (sequence * 10) as u8]);
        }
    }
    image_message(sequence, WIDTH, HEIGHT, "rgb8", &data)
}

/// A RealSense-style bag with depth frames `depth` and color frames `color`,
/// interleaved in time order.
pub fn realsense_bag(depth: &[u32], color: &[u32]) -> BagBuilder {
    let mut builder = BagBuilder::new()
        .connection(0, DEPTH_TOPIC, IMAGE_TYPE)
        .connection(1, COLOR_TOPIC, IMAGE_TYPE)
        .connection(2, "/device_0/sensor_0/Depth_0/image/metadata", "diagnostic_msgs/KeyValue");

    let mut events: Vec<(Duration, u32, Vec<u8>)> = Vec::new();
    for (index, &sequence) in depth.iter().enumerate() {
        let time = Duration::from_millis(index as u64 * 33);
        events.push((time, 0, depth_image(sequence)));
        events.push((time, 2, b"\x0b\x00\x00\x00Frame Count".to_vec()));
    }
    for (index, &sequence) in color.iter().enumerate() {
        events.push((Duration::from_millis(index as u64 * 66 + 1), 1, color_image(sequence)));
    }
    events.sort_by_key(|(time, connection, _)| (*time, *connection));
    for (time, connection, data) in events {
        builder = builder.message(connection, time, data);
    }
    builder
}

/// Whether `error` means this FFmpeg build cannot encode H.264.
pub fn encoder_unavailable(error: &Bag2VideoError) -> bool {
    match error {
        Bag2VideoError::VideoEncode(message) => {
            message.contains("not available") || message.contains("cannot open encoder")
        }
        _ => false,
    }
}

/// Count video packets in `path`. Without B-frame reordering in the output
/// this equals the frame count.
pub fn count_video_frames(path: &Path) -> u64 {
    ffmpeg_next::init().expect("ffmpeg init");
    let mut input = ffmpeg_next::format::input(path).expect("open encoded video");
    let stream_index = input
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .expect("video stream")
        .index();
    input
        .packets()
        .filter(|(stream, _)| stream.index() == stream_index)
        .count() as u64
}
