//! Peer wire messages.
//!
//! Every message kind is its own type implementing [`PeerMessage`], and
//! [`Message`] is the sum over all of them that the connection layer passes
//! around.
//! https://www.bittorrent.org/beps/bep_0003.html#peer-messages

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::{
    codec,
    error::{ApplyError, DecodeError},
    session::PeerSession,
    storage::PieceStorage,
};

mod bitfield;
mod block;
mod have;
mod port;
mod state;

pub use bitfield::BitfieldMessage;
pub use block::{CancelMessage, PieceMessage, RequestMessage};
pub use have::HaveMessage;
pub use port::PortMessage;
pub use state::{ChokeMessage, InterestedMessage, NotInterestedMessage, UnchokeMessage};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            _ => Err(DecodeError::UnknownId(value)),
        }
    }
}

impl MessageId {
    pub fn payload_length(self) -> PayloadLength {
        match self {
            MessageId::Choke
            | MessageId::Unchoke
            | MessageId::Interested
            | MessageId::NotInterested => PayloadLength::Exact(0),
            // piece index
            MessageId::Have => PayloadLength::Exact(4),
            // one bit per piece, only the session knows how many pieces there are
            MessageId::Bitfield => PayloadLength::AtLeast(1),
            // piece index, begin, length
            MessageId::Request | MessageId::Cancel => PayloadLength::Exact(12),
            // piece index, begin, block
            MessageId::Piece => PayloadLength::AtLeast(8),
            // listen port
            MessageId::Port => PayloadLength::Exact(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    Exact(usize),
    AtLeast(usize),
}

impl PayloadLength {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            PayloadLength::Exact(n) => len == n,
            PayloadLength::AtLeast(n) => len >= n,
        }
    }
}

impl fmt::Display for PayloadLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadLength::Exact(n) => write!(f, "exactly {n}"),
            PayloadLength::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// Behaviour shared by every message kind.
pub trait PeerMessage: fmt::Display + Sized {
    const ID: MessageId;

    /// Builds the message from a frame body: the id byte followed by the payload.
    fn create(frame: &[u8]) -> Result<Self, DecodeError>;

    fn payload_len(&self) -> usize;

    fn write_payload(&self, dst: &mut BytesMut);

    /// Side effect of receiving this message from the remote peer.
    fn apply_received(
        &self,
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError>;

    fn write_to(&self, dst: &mut BytesMut) {
        codec::write_header(Some(Self::ID as u8), self.payload_len(), dst);
        self.write_payload(dst);
    }

    /// Wire bytes of the message, length prefix included.
    fn serialize(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst);
        dst.freeze()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Checks the id byte of `frame` and the payload length rule of `id`,
/// returning the payload.
pub(crate) fn split_payload(id: MessageId, frame: &[u8]) -> Result<&[u8], DecodeError> {
    let (&actual, payload) = frame.split_first().ok_or(DecodeError::MissingId)?;
    if actual != id as u8 {
        return Err(DecodeError::UnexpectedId {
            expected: id,
            actual,
        });
    }

    let expected = id.payload_length();
    if !expected.accepts(payload.len()) {
        return Err(DecodeError::WrongPayloadLength {
            id,
            expected,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke(ChokeMessage),
    Unchoke(UnchokeMessage),
    Interested(InterestedMessage),
    NotInterested(NotInterestedMessage),
    Have(HaveMessage),
    Bitfield(BitfieldMessage),
    Request(RequestMessage),
    Piece(PieceMessage),
    Cancel(CancelMessage),
    Port(PortMessage),
}

// Runs `$body` with `$inner` bound to the variant's message, or `$keep_alive`.
macro_rules! each_variant {
    ($message:expr, $inner:ident => $body:expr, KeepAlive => $keep_alive:expr) => {
        match $message {
            Message::KeepAlive => $keep_alive,
            Message::Choke($inner) => $body,
            Message::Unchoke($inner) => $body,
            Message::Interested($inner) => $body,
            Message::NotInterested($inner) => $body,
            Message::Have($inner) => $body,
            Message::Bitfield($inner) => $body,
            Message::Request($inner) => $body,
            Message::Piece($inner) => $body,
            Message::Cancel($inner) => $body,
            Message::Port($inner) => $body,
        }
    };
}

impl Message {
    /// Decodes a frame body as produced by [`codec::MessageCodec`]. An empty
    /// body is a keep-alive.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let Some(&id) = frame.first() else {
            return Ok(Message::KeepAlive);
        };

        let message = match MessageId::try_from(id)? {
            MessageId::Choke => Message::Choke(ChokeMessage::create(frame)?),
            MessageId::Unchoke => Message::Unchoke(UnchokeMessage::create(frame)?),
            MessageId::Interested => Message::Interested(InterestedMessage::create(frame)?),
            MessageId::NotInterested => {
                Message::NotInterested(NotInterestedMessage::create(frame)?)
            }
            MessageId::Have => Message::Have(HaveMessage::create(frame)?),
            MessageId::Bitfield => Message::Bitfield(BitfieldMessage::create(frame)?),
            MessageId::Request => Message::Request(RequestMessage::create(frame)?),
            MessageId::Piece => Message::Piece(PieceMessage::create(frame)?),
            MessageId::Cancel => Message::Cancel(CancelMessage::create(frame)?),
            MessageId::Port => Message::Port(PortMessage::create(frame)?),
        };
        Ok(message)
    }

    pub fn id(&self) -> Option<MessageId> {
        fn id_of<M: PeerMessage>(_: &M) -> MessageId {
            M::ID
        }
        each_variant!(self, message => Some(id_of(message)), KeepAlive => None)
    }

    pub fn payload_len(&self) -> usize {
        each_variant!(self, message => message.payload_len(), KeepAlive => 0)
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        each_variant!(
            self,
            message => message.write_to(dst),
            KeepAlive => codec::write_header(None, 0, dst)
        )
    }

    pub fn serialize(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst);
        dst.freeze()
    }

    pub fn apply_received(
        &self,
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        each_variant!(
            self,
            message => message.apply_received(session, storage),
            KeepAlive => Ok(())
        )
    }

    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        each_variant!(
            self,
            message => fmt::Display::fmt(message, f),
            KeepAlive => f.write_str("keep alive")
        )
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident($message:ty)),* $(,)?) => {
        $(
            impl From<$message> for Message {
                fn from(message: $message) -> Self {
                    Message::$variant(message)
                }
            }
        )*
    };
}

impl_from_variant!(
    Choke(ChokeMessage),
    Unchoke(UnchokeMessage),
    Interested(InterestedMessage),
    NotInterested(NotInterestedMessage),
    Have(HaveMessage),
    Bitfield(BitfieldMessage),
    Request(RequestMessage),
    Piece(PieceMessage),
    Cancel(CancelMessage),
    Port(PortMessage),
);
