use std::io;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::{config::WireConfig, message::Message};

pub(crate) type Result<T> = std::result::Result<T, CodecError>;

// All messages is length-prefixed messages
// According the document, All integers sent in the protocol are encoded as four bytes big-endian, which is u32.
// https://www.bittorrent.org/beps/bep_0003.html#peer-protocol
pub const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Fewer bytes are buffered than the frame needs. Wait for more input.
    #[error("malformed header: need {needed} bytes, {available} available")]
    MalformedHeader { needed: usize, available: usize },

    #[error("frame of {length} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { length: u32, max: u32 },

    #[error("io error")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the id and payload, the prefix itself is not counted.
    pub length: u32,
    /// `None` for keep-alive.
    pub id: Option<u8>,
}

impl FrameHeader {
    pub fn frame_len(&self) -> usize {
        LENGTH_PREFIX_LEN + self.length as usize
    }

    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }
}

/// Reads the length prefix and message id at the start of `src`.
///
/// Fails with [`CodecError::MalformedHeader`] when `src` holds less than the
/// whole frame the prefix announces.
pub fn read_header(src: &[u8]) -> Result<FrameHeader> {
    if src.len() < LENGTH_PREFIX_LEN {
        return Err(CodecError::MalformedHeader {
            needed: LENGTH_PREFIX_LEN,
            available: src.len(),
        });
    }

    let length = (&src[..LENGTH_PREFIX_LEN]).get_u32();
    let header = FrameHeader { length, id: None };
    if src.len() < header.frame_len() {
        return Err(CodecError::MalformedHeader {
            needed: header.frame_len(),
            available: src.len(),
        });
    }

    let id = (length > 0).then(|| src[LENGTH_PREFIX_LEN]);
    Ok(FrameHeader { length, id })
}

pub fn write_header(id: Option<u8>, payload_len: usize, dst: &mut BytesMut) {
    let length = id.map_or(0, |_| 1 + payload_len);
    dst.reserve(LENGTH_PREFIX_LEN + length);
    dst.put_u32(length as u32);
    if let Some(id) = id {
        dst.put_u8(id);
    }
}

pub fn write_frame(id: Option<u8>, payload: &[u8], dst: &mut BytesMut) {
    write_header(id, payload.len(), dst);
    dst.extend_from_slice(payload);
}

/// Splits length-prefixed frames off the stream.
///
/// A decoded item is the frame body: the message id followed by the payload,
/// or an empty buffer for keep-alive.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame_length: u32,
}

impl MessageCodec {
    pub fn new(config: &WireConfig) -> Self {
        Self {
            max_frame_length: config.max_frame_length,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(&WireConfig::default())
    }
}

impl Decoder for MessageCodec {
    type Error = CodecError;
    type Item = BytesMut;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Check the announced length before buffering a frame we'd reject anyway.
        if src.len() >= LENGTH_PREFIX_LEN {
            let length = (&src[..LENGTH_PREFIX_LEN]).get_u32();
            if length > self.max_frame_length {
                return Err(CodecError::FrameTooLarge {
                    length,
                    max: self.max_frame_length,
                });
            }
        }

        match read_header(src) {
            Ok(header) => {
                src.advance(LENGTH_PREFIX_LEN);
                Ok(Some(src.split_to(header.length as usize)))
            }
            Err(CodecError::MalformedHeader { needed, available }) => {
                src.reserve(needed - available);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}
