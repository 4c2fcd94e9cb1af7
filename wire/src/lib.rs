//! Peer wire message layer of BitDrift.
//!
//! Frames and parses the messages two connected peers exchange, validates
//! them and applies their effect to the state of the connection.
//! https://www.bittorrent.org/beps/bep_0003.html#peer-protocol

pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod session;
pub mod storage;
pub mod types;

pub use codec::{CodecError, MessageCodec};
pub use config::WireConfig;
pub use connection::PeerConnection;
pub use dispatcher::{DispatchError, MessageDispatcher};
pub use error::{ApplyError, DecodeError, ProtocolFault, SessionError};
pub use message::{Message, MessageId, PeerMessage};
pub use session::PeerSession;
pub use storage::{LocalPieces, PieceStorage};
pub use types::BitField;
