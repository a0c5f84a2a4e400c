//! Offline playback of one channel of a recording.
//!
//! [`FrameSource`] is the seam between the extractor and whatever produces
//! frames. [`BagPlayback`] implements it over a [`BagFile`]: it selects the
//! image topic for the requested channel, decodes each message into a
//! [`RawFrame`], and reports end-of-stream once the chunks are exhausted.
//!
//! With [`BagPlayback::looping`] enabled the source restarts from the first
//! frame instead of ending, the way SDK offline playback behaves. The
//! extractor's wrap-around detection then ends the run.

use std::path::Path;

use crate::bag::{BagFile, MessageCursor};
use crate::channel::{Channel, IMAGE_MESSAGE_TYPE};
use crate::error::Bag2VideoError;
use crate::message::{RawFrame, decode_image};

/// A sequential source of raw frames for a single channel.
pub trait FrameSource {
    /// Fetch the next frame, blocking until it is available.
    ///
    /// Returns `Ok(None)` when the source has no more frames.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, Bag2VideoError>;

    /// Number of frames in one pass over the source, if known.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, Bag2VideoError> {
        (**self).next_frame()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }
}

/// Plays back one channel of a ROS bag.
pub struct BagPlayback {
    bag: BagFile,
    channel: Channel,
    topic: String,
    connections: Vec<u32>,
    cursor: MessageCursor,
    looping: bool,
    frames_this_pass: u64,
}

impl BagPlayback {
    /// Open `path` and select the image topic for `channel`.
    ///
    /// When several devices recorded the same channel, the topic that sorts
    /// first is used.
    ///
    /// # Errors
    ///
    /// - Any error from [`BagFile::open`].
    /// - [`Bag2VideoError::ChannelNotFound`] if no image topic matches.
    pub fn open<P: AsRef<Path>>(path: P, channel: Channel) -> Result<Self, Bag2VideoError> {
        let bag = BagFile::open(path.as_ref())?;

        let mut topics: Vec<&str> = bag
            .connections()
            .filter(|connection| connection.message_type == IMAGE_MESSAGE_TYPE)
            .filter(|connection| channel.matches_topic(&connection.topic))
            .map(|connection| connection.topic.as_str())
            .collect();
        topics.sort_unstable();
        topics.dedup();

        let topic = topics
            .first()
            .map(|topic| topic.to_string())
            .ok_or_else(|| Bag2VideoError::ChannelNotFound {
                channel,
                path: path.as_ref().to_path_buf(),
            })?;
        if topics.len() > 1 {
            log::warn!(
                "{} {channel} topics in {}; using {topic}",
                topics.len(),
                path.as_ref().display()
            );
        }

        let connections = bag
            .connections()
            .filter(|connection| connection.topic == topic)
            .map(|connection| connection.id)
            .collect();

        log::info!("Playing back {topic} from {}", path.as_ref().display());
        Ok(Self {
            bag,
            channel,
            topic,
            connections,
            cursor: MessageCursor::new(),
            looping: false,
            frames_this_pass: 0,
        })
    }

    /// Restart from the first frame when the recording is exhausted.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// The channel being played back.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// The image topic selected for the channel.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl FrameSource for BagPlayback {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, Bag2VideoError> {
        loop {
            if let Some(message) = self.bag.next_message(&mut self.cursor, &self.connections)? {
                self.frames_this_pass += 1;
                return decode_image(&message.data).map(Some);
            }

            // An empty pass would otherwise spin forever.
            if !self.looping || self.frames_this_pass == 0 {
                return Ok(None);
            }
            log::debug!("Reached end of {}; looping", self.topic);
            self.cursor = MessageCursor::new();
            self.frames_this_pass = 0;
        }
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.bag.message_count(&self.connections)
    }
}
