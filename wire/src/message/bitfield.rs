use std::fmt;

use bytes::BytesMut;
use log::debug;

use super::{MessageId, PeerMessage, split_payload};
use crate::{
    error::{ApplyError, DecodeError, ProtocolFault},
    session::PeerSession,
    storage::PieceStorage,
    types::BitField,
};

/// Every piece the sender has, sent once right after the handshake.
///
/// The bytes are copied in on construction, the message never borrows the
/// buffer it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfieldMessage {
    bitfield: BitField,
}

impl BitfieldMessage {
    pub fn new(bitfield: &[u8]) -> Self {
        Self {
            bitfield: BitField::from_slice(bitfield),
        }
    }

    /// Our own pieces, ready to be sent to a peer. Spare bits are zero.
    pub fn from_storage(storage: &dyn PieceStorage) -> Self {
        let mut bitfield = storage.bitfield();
        bitfield.set_uninitialized(false);
        Self::new(bitfield.as_raw_slice())
    }

    pub fn bitfield(&self) -> &[u8] {
        self.bitfield.as_raw_slice()
    }

    pub fn bitfield_len(&self) -> usize {
        self.bitfield.as_raw_slice().len()
    }

    pub fn set_bitfield(&mut self, bitfield: &[u8]) {
        self.bitfield = BitField::from_slice(bitfield);
    }
}

impl PeerMessage for BitfieldMessage {
    const ID: MessageId = MessageId::Bitfield;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let payload = split_payload(Self::ID, frame)?;
        Ok(Self::new(payload))
    }

    fn payload_len(&self) -> usize {
        self.bitfield_len()
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        dst.extend_from_slice(self.bitfield());
    }

    fn apply_received(
        &self,
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        // Fails with BadBitfieldLength if the peer counts a different number of pieces.
        session.set_bitfield(self.bitfield())?;

        if session.is_peer_seeder() && storage.is_download_complete() {
            debug!("{}: both sides are seeders", session.addr());
            return Err(ProtocolFault::MutualSeeder.into());
        }
        Ok(())
    }
}

impl fmt::Display for BitfieldMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bitfield {}", hex::encode(self.bitfield()))
    }
}
