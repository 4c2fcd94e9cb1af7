use thiserror::Error;

use crate::message::{MessageId, PayloadLength};

/// The remote peer sent bytes that are not a valid message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{id:?} message expects a payload of {expected} bytes, got {actual}")]
    WrongPayloadLength {
        id: MessageId,
        expected: PayloadLength,
        actual: usize,
    },

    #[error("unknown message id {0}")]
    UnknownId(u8),

    #[error("expected {expected:?} message id, got {actual}")]
    UnexpectedId { expected: MessageId, actual: u8 },

    #[error("frame has no message id")]
    MissingId,
}

/// A message that is well formed but can't be accepted on this connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolFault {
    #[error("bitfield is {actual} bytes, expected {expected}")]
    BadBitfieldLength { expected: usize, actual: usize },

    #[error("both peers are seeders, nothing left to exchange")]
    MutualSeeder,

    #[error("piece index {index} is out of range, torrent has {num_pieces} pieces")]
    PieceIndexOutOfRange { index: u32, num_pieces: usize },

    #[error("invalid block index={index}, begin={begin}, length={length}")]
    InvalidBlock { index: u32, begin: u32, length: u32 },
}

/// The connection layer used the session in the wrong order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session resources are not allocated")]
    NotAllocated,

    #[error("invalid session resources: piece length {piece_length}, total length {total_length}")]
    InvalidResources { piece_length: u32, total_length: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error(transparent)]
    Fault(#[from] ProtocolFault),

    #[error(transparent)]
    Session(#[from] SessionError),
}
