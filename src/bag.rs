//! ROS bag v2.0 container reader.
//!
//! A bag is the magic line `#ROSBAG V2.0\n` followed by a flat sequence of
//! records. Every record is `header_len:u32 | header | data_len:u32 | data`,
//! where the header is a list of `len:u32 | name=value` fields and the `op`
//! field gives the record type. Message data lives inside chunk records,
//! which may be compressed. Connections and chunk summaries are repeated
//! after `index_pos` so they can be read without scanning the whole file.
//!
//! [`BagFile`] reads that summary on open, then streams messages chunk by
//! chunk with a [`MessageCursor`], holding at most one decompressed chunk in
//! memory.
//!
//! # Example
//!
//! ```no_run
//! use bag2video::BagFile;
//!
//! let mut bag = BagFile::open("recording.bag")?;
//! let depth: Vec<u32> = bag
//!     .connections()
//!     .filter(|connection| connection.topic.contains("Depth"))
//!     .map(|connection| connection.id)
//!     .collect();
//!
//! for message in bag.messages(&depth) {
//!     let message = message?;
//!     println!("{} bytes at {:?}", message.data.len(), message.time);
//! }
//! # Ok::<(), bag2video::Bag2VideoError>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Bag2VideoError;

/// Magic line at the start of every v2.0 bag.
pub const BAG_MAGIC: &[u8] = b"#ROSBAG V2.0\n";

pub(crate) const OP_MESSAGE_DATA: u8 = 0x02;
pub(crate) const OP_BAG_HEADER: u8 = 0x03;
pub(crate) const OP_INDEX_DATA: u8 = 0x04;
pub(crate) const OP_CHUNK: u8 = 0x05;
pub(crate) const OP_CHUNK_INFO: u8 = 0x06;
pub(crate) const OP_CONNECTION: u8 = 0x07;

// Upper bound on a single header or chunk allocation.
const MAX_RECORD_LEN: u32 = 1 << 30;

/// A topic/type pair declared in the bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Connection id referenced by message records.
    pub id: u32,
    /// Topic the messages were published on.
    pub topic: String,
    /// ROS message type, e.g. `sensor_msgs/Image`.
    pub message_type: String,
    /// MD5 sum of the message definition.
    pub md5sum: String,
}

/// Summary of one chunk, read from the index section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// File offset of the chunk record.
    pub chunk_pos: u64,
    /// Earliest message stamp in the chunk.
    pub start_time: Duration,
    /// Latest message stamp in the chunk.
    pub end_time: Duration,
    /// Message count per connection id.
    pub message_counts: HashMap<u32, u32>,
}

/// One serialized message read from the bag.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Connection the message belongs to.
    pub connection: u32,
    /// Receive time recorded in the bag.
    pub time: Duration,
    /// Serialized ROS message payload.
    pub data: Vec<u8>,
}

/// Read position of a message scan. Create one per pass over the bag.
#[derive(Debug, Clone)]
pub struct MessageCursor {
    offset: u64,
    chunk: Option<ChunkCursor>,
    finished: bool,
}

#[derive(Debug, Clone)]
struct ChunkCursor {
    data: Vec<u8>,
    position: usize,
    base_offset: u64,
}

impl MessageCursor {
    /// A cursor positioned at the first record after the magic line.
    pub fn new() -> Self {
        Self {
            offset: BAG_MAGIC.len() as u64,
            chunk: None,
            finished: false,
        }
    }

    /// Whether the scan has reached the end of the chunk section.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for MessageCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed `name=value` header fields of a record.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordHeader {
    fields: BTreeMap<String, Vec<u8>>,
}

impl RecordHeader {
    pub(crate) fn parse(bytes: &[u8], offset: u64) -> Result<Self, Bag2VideoError> {
        let mut fields = BTreeMap::new();
        let mut position = 0;
        while position < bytes.len() {
            let field_len = read_u32_at(bytes, position, offset)? as usize;
            position += 4;
            let field = bytes
                .get(position..position + field_len)
                .ok_or_else(|| invalid(offset, "header field overruns header"))?;
            let separator = field
                .iter()
                .position(|&byte| byte == b'=')
                .ok_or_else(|| invalid(offset, "header field without '='"))?;
            let name = String::from_utf8_lossy(&field[..separator]).into_owned();
            fields.insert(name, field[separator + 1..].to_vec());
            position += field_len;
        }
        Ok(Self { fields })
    }

    pub(crate) fn op(&self, offset: u64) -> Result<u8, Bag2VideoError> {
        match self.fields.get("op").map(Vec::as_slice) {
            Some([op]) => Ok(*op),
            _ => Err(invalid(offset, "record header has no op field")),
        }
    }

    pub(crate) fn u32(&self, name: &str, offset: u64) -> Result<u32, Bag2VideoError> {
        let value = self.field(name, offset)?;
        let bytes: [u8; 4] = value
            .try_into()
            .map_err(|_| invalid(offset, format!("field {name} is not 4 bytes")))?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn u64(&self, name: &str, offset: u64) -> Result<u64, Bag2VideoError> {
        let value = self.field(name, offset)?;
        let bytes: [u8; 8] = value
            .try_into()
            .map_err(|_| invalid(offset, format!("field {name} is not 8 bytes")))?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub(crate) fn time(&self, name: &str, offset: u64) -> Result<Duration, Bag2VideoError> {
        let raw = self.u64(name, offset)?;
        Ok(ros_time(raw))
    }

    pub(crate) fn string(&self, name: &str, offset: u64) -> Result<String, Bag2VideoError> {
        Ok(String::from_utf8_lossy(self.field(name, offset)?).into_owned())
    }

    fn field(&self, name: &str, offset: u64) -> Result<&[u8], Bag2VideoError> {
        self.fields
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| invalid(offset, format!("record header missing field {name}")))
    }
}

/// An open ROS bag v2.0 file.
pub struct BagFile {
    path: PathBuf,
    reader: BufReader<File>,
    file_len: u64,
    index_pos: u64,
    connections: BTreeMap<u32, Connection>,
    chunk_infos: Vec<ChunkInfo>,
}

impl BagFile {
    /// Open a bag and read its connection and chunk summary.
    ///
    /// Indexed bags are summarized from the index section. Bags without an
    /// index (`index_pos == 0`, e.g. an interrupted recording) are scanned
    /// once to collect their connections.
    ///
    /// # Errors
    ///
    /// - [`Bag2VideoError::BagOpen`] if the file cannot be read or lacks the
    ///   v2.0 magic line.
    /// - [`Bag2VideoError::InvalidBag`] if the header records are malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Bag2VideoError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening bag {}", path.display());
        let open_error = |reason: String| Bag2VideoError::BagOpen {
            path: path.clone(),
            reason,
        };

        let file = File::open(&path).map_err(|error| open_error(error.to_string()))?;
        let file_len = file
            .metadata()
            .map_err(|error| open_error(error.to_string()))?
            .len();
        let mut reader = BufReader::new(file);

        let mut magic = [0_u8; BAG_MAGIC.len()];
        reader
            .read_exact(&mut magic)
            .map_err(|_| open_error("file is too short to be a bag".to_string()))?;
        if magic != BAG_MAGIC {
            return Err(open_error("missing #ROSBAG V2.0 magic line".to_string()));
        }

        let offset = BAG_MAGIC.len() as u64;
        let (header, _, _) = read_record(&mut reader, offset)?
            .ok_or_else(|| open_error("missing bag header record".to_string()))?;
        if header.op(offset)? != OP_BAG_HEADER {
            return Err(invalid(offset, "first record is not a bag header"));
        }
        let index_pos = header.u64("index_pos", offset)?;

        let mut bag = Self {
            path,
            reader,
            file_len,
            index_pos,
            connections: BTreeMap::new(),
            chunk_infos: Vec::new(),
        };

        if index_pos > 0 && index_pos < file_len {
            bag.read_index_section()?;
        } else {
            log::warn!(
                "Bag {} has no index section; scanning records",
                bag.path.display()
            );
            bag.index_pos = 0;
            bag.scan_connections()?;
        }

        log::info!(
            "Opened {} ({} connections, {} chunks)",
            bag.path.display(),
            bag.connections.len(),
            bag.chunk_infos.len(),
        );
        Ok(bag)
    }

    /// Path the bag was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All connections declared in the bag, ordered by id.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Look up a connection by id.
    pub fn connection(&self, id: u32) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Chunk summaries from the index section (empty for unindexed bags).
    pub fn chunk_infos(&self) -> &[ChunkInfo] {
        &self.chunk_infos
    }

    /// Total number of messages on the given connections, if the bag is
    /// indexed.
    pub fn message_count(&self, connections: &[u32]) -> Option<u64> {
        if self.chunk_infos.is_empty() {
            return None;
        }
        let total = self
            .chunk_infos
            .iter()
            .flat_map(|info| connections.iter().filter_map(|id| info.message_counts.get(id)))
            .map(|&count| count as u64)
            .sum();
        Some(total)
    }

    /// Iterate messages on `connections` in file order.
    pub fn messages<'a>(&'a mut self, connections: &'a [u32]) -> Messages<'a> {
        Messages {
            bag: self,
            connections,
            cursor: MessageCursor::new(),
        }
    }

    /// Read the next message on one of `connections`, advancing `cursor`.
    ///
    /// Returns `Ok(None)` once every chunk has been consumed.
    pub fn next_message(
        &mut self,
        cursor: &mut MessageCursor,
        connections: &[u32],
    ) -> Result<Option<MessageRecord>, Bag2VideoError> {
        loop {
            if cursor.finished {
                return Ok(None);
            }

            if let Some(chunk) = cursor.chunk.as_mut() {
                match next_chunk_message(chunk, connections, &mut self.connections)? {
                    Some(message) => return Ok(Some(message)),
                    None => cursor.chunk = None,
                }
                continue;
            }

            let end = if self.index_pos > 0 { self.index_pos } else { self.file_len };
            if cursor.offset >= end {
                cursor.finished = true;
                return Ok(None);
            }

            self.reader.seek(SeekFrom::Start(cursor.offset))?;
            let Some((header, data, len)) = read_record(&mut self.reader, cursor.offset)? else {
                cursor.finished = true;
                return Ok(None);
            };
            let record_offset = cursor.offset;
            cursor.offset += len;

            match header.op(record_offset)? {
                OP_CHUNK => {
                    cursor.chunk = Some(ChunkCursor {
                        data: decompress_chunk(&header, data, record_offset)?,
                        position: 0,
                        base_offset: record_offset,
                    });
                }
                OP_MESSAGE_DATA => {
                    let connection = header.u32("conn", record_offset)?;
                    if connections.contains(&connection) {
                        return Ok(Some(MessageRecord {
                            connection,
                            time: header.time("time", record_offset)?,
                            data,
                        }));
                    }
                }
                OP_CONNECTION => {
                    let connection = parse_connection(&header, &data, record_offset)?;
                    self.connections.entry(connection.id).or_insert(connection);
                }
                OP_INDEX_DATA | OP_CHUNK_INFO | OP_BAG_HEADER => {}
                op => log::debug!("Skipping unknown record op={op:#04x} at {record_offset}"),
            }
        }
    }

    fn read_index_section(&mut self) -> Result<(), Bag2VideoError> {
        let mut offset = self.index_pos;
        self.reader.seek(SeekFrom::Start(offset))?;
        while let Some((header, data, len)) = read_record(&mut self.reader, offset)? {
            match header.op(offset)? {
                OP_CONNECTION => {
                    let connection = parse_connection(&header, &data, offset)?;
                    self.connections.insert(connection.id, connection);
                }
                OP_CHUNK_INFO => self.chunk_infos.push(parse_chunk_info(&header, &data, offset)?),
                op => log::debug!("Skipping record op={op:#04x} in index section"),
            }
            offset += len;
        }
        self.chunk_infos.sort_by_key(|info| info.chunk_pos);
        Ok(())
    }

    fn scan_connections(&mut self) -> Result<(), Bag2VideoError> {
        let mut cursor = MessageCursor::new();
        // No connection ids match, so this walks every record and registers
        // connections as a side effect.
        while self.next_message(&mut cursor, &[])?.is_some() {}
        Ok(())
    }
}

/// Borrowing iterator over messages, created by [`BagFile::messages`].
pub struct Messages<'a> {
    bag: &'a mut BagFile,
    connections: &'a [u32],
    cursor: MessageCursor,
}

impl Iterator for Messages<'_> {
    type Item = Result<MessageRecord, Bag2VideoError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.bag.next_message(&mut self.cursor, self.connections) {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(error) => {
                self.cursor.finished = true;
                Some(Err(error))
            }
        }
    }
}

fn next_chunk_message(
    chunk: &mut ChunkCursor,
    connections: &[u32],
    known: &mut BTreeMap<u32, Connection>,
) -> Result<Option<MessageRecord>, Bag2VideoError> {
    while chunk.position < chunk.data.len() {
        let offset = chunk.base_offset;
        let (header, data) = parse_record(&chunk.data, &mut chunk.position, offset)?;
        match header.op(offset)? {
            OP_MESSAGE_DATA => {
                let connection = header.u32("conn", offset)?;
                if connections.contains(&connection) {
                    return Ok(Some(MessageRecord {
                        connection,
                        time: header.time("time", offset)?,
                        data: data.to_vec(),
                    }));
                }
            }
            OP_CONNECTION => {
                let connection = parse_connection(&header, data, offset)?;
                known.entry(connection.id).or_insert(connection);
            }
            _ => {}
        }
    }
    Ok(None)
}

fn decompress_chunk(
    header: &RecordHeader,
    data: Vec<u8>,
    offset: u64,
) -> Result<Vec<u8>, Bag2VideoError> {
    let compression = header.string("compression", offset)?;
    let size = header.u32("size", offset)?;
    if size > MAX_RECORD_LEN {
        return Err(invalid(offset, format!("chunk size {size} is implausible")));
    }
    let size = size as usize;
    let inflated = match compression.as_str() {
        "none" => data,
        "lz4" => {
            let mut decoder = lz4::Decoder::new(data.as_slice())?;
            let mut inflated = Vec::with_capacity(size);
            decoder.read_to_end(&mut inflated)?;
            inflated
        }
        other => return Err(Bag2VideoError::UnsupportedCompression(other.to_string())),
    };
    if inflated.len() != size {
        return Err(invalid(
            offset,
            format!("chunk inflated to {} bytes, header says {size}", inflated.len()),
        ));
    }
    Ok(inflated)
}

fn parse_connection(
    header: &RecordHeader,
    data: &[u8],
    offset: u64,
) -> Result<Connection, Bag2VideoError> {
    let id = header.u32("conn", offset)?;
    let topic = header.string("topic", offset)?;
    let details = RecordHeader::parse(data, offset)?;
    Ok(Connection {
        id,
        topic,
        message_type: details.string("type", offset)?,
        md5sum: details.string("md5sum", offset).unwrap_or_default(),
    })
}

fn parse_chunk_info(
    header: &RecordHeader,
    data: &[u8],
    offset: u64,
) -> Result<ChunkInfo, Bag2VideoError> {
    let count = header.u32("count", offset)? as usize;
    if count.saturating_mul(8) > data.len() {
        return Err(invalid(
            offset,
            format!("chunk info lists {count} connections in {} bytes", data.len()),
        ));
    }
    let mut message_counts = HashMap::with_capacity(count);
    for entry in 0..count {
        let position = entry * 8;
        let connection = read_u32_at(data, position, offset)?;
        let messages = read_u32_at(data, position + 4, offset)?;
        message_counts.insert(connection, messages);
    }
    Ok(ChunkInfo {
        chunk_pos: header.u64("chunk_pos", offset)?,
        start_time: header.time("start_time", offset)?,
        end_time: header.time("end_time", offset)?,
        message_counts,
    })
}

/// Read one record from a stream, returning its header, data, and encoded
/// length. Returns `Ok(None)` at a clean EOF.
fn read_record<R: Read>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<(RecordHeader, Vec<u8>, u64)>, Bag2VideoError> {
    let mut len_bytes = [0_u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error.into()),
    }
    let header_bytes = read_block(reader, u32::from_le_bytes(len_bytes), offset)?;
    let header = RecordHeader::parse(&header_bytes, offset)?;

    reader
        .read_exact(&mut len_bytes)
        .map_err(|_| invalid(offset, "truncated record data length"))?;
    let data = read_block(reader, u32::from_le_bytes(len_bytes), offset)?;
    let len = (8 + header_bytes.len() + data.len()) as u64;
    Ok(Some((header, data, len)))
}

fn read_block<R: Read>(reader: &mut R, len: u32, offset: u64) -> Result<Vec<u8>, Bag2VideoError> {
    if len > MAX_RECORD_LEN {
        return Err(invalid(offset, format!("record length {len} is implausible")));
    }
    let mut block = vec![0_u8; len as usize];
    reader
        .read_exact(&mut block)
        .map_err(|_| invalid(offset, "record is truncated"))?;
    Ok(block)
}

/// Parse one record out of an in-memory chunk, advancing `position`.
fn parse_record<'a>(
    bytes: &'a [u8],
    position: &mut usize,
    offset: u64,
) -> Result<(RecordHeader, &'a [u8]), Bag2VideoError> {
    let header_len = read_u32_at(bytes, *position, offset)? as usize;
    let header_start = *position + 4;
    let header_bytes = bytes
        .get(header_start..header_start + header_len)
        .ok_or_else(|| invalid(offset, "chunk record header is truncated"))?;
    let header = RecordHeader::parse(header_bytes, offset)?;

    let data_len_at = header_start + header_len;
    let data_len = read_u32_at(bytes, data_len_at, offset)? as usize;
    let data_start = data_len_at + 4;
    let data = bytes
        .get(data_start..data_start + data_len)
        .ok_or_else(|| invalid(offset, "chunk record data is truncated"))?;
    *position = data_start + data_len;
    Ok((header, data))
}

fn read_u32_at(bytes: &[u8], position: usize, offset: u64) -> Result<u32, Bag2VideoError> {
    let slice = bytes
        .get(position..position + 4)
        .ok_or_else(|| invalid(offset, "unexpected end of record"))?;
    let mut raw = [0_u8; 4];
    raw.copy_from_slice(slice);
    Ok(u32::from_le_bytes(raw))
}

/// Convert a packed ROS time (`secs` in the low word, `nsecs` in the high
/// word) into a [`Duration`].
pub(crate) fn ros_time(raw: u64) -> Duration {
    let secs = raw & 0xFFFF_FFFF;
    let nanos = (raw >> 32) as u32;
    Duration::new(secs, nanos.min(999_999_999))
}

fn invalid(offset: u64, reason: impl Into<String>) -> Bag2VideoError {
    Bag2VideoError::InvalidBag {
        offset,
        reason: reason.into(),
    }
}
