use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use super::{MessageId, PeerMessage, split_payload};
use crate::{
    error::{ApplyError, DecodeError},
    session::PeerSession,
    storage::PieceStorage,
};

/// Port the sender's DHT node listens on.
/// https://www.bittorrent.org/beps/bep_0005.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMessage {
    pub port: u16,
}

impl PortMessage {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl PeerMessage for PortMessage {
    const ID: MessageId = MessageId::Port;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut payload = split_payload(Self::ID, frame)?;
        Ok(Self::new(payload.get_u16()))
    }

    fn payload_len(&self) -> usize {
        2
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        dst.put_u16(self.port);
    }

    fn apply_received(
        &self,
        session: &mut PeerSession,
        _storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        session.dht_port = Some(self.port);
        Ok(())
    }
}

impl fmt::Display for PortMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.port)
    }
}
