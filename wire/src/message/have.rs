use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use super::{MessageId, PeerMessage, split_payload};
use crate::{
    error::{ApplyError, DecodeError},
    session::PeerSession,
    storage::PieceStorage,
};

/// The sender finished and verified a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaveMessage {
    pub piece_index: u32,
}

impl HaveMessage {
    pub fn new(piece_index: u32) -> Self {
        Self { piece_index }
    }
}

impl PeerMessage for HaveMessage {
    const ID: MessageId = MessageId::Have;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut payload = split_payload(Self::ID, frame)?;
        Ok(Self::new(payload.get_u32()))
    }

    fn payload_len(&self) -> usize {
        4
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        dst.put_u32(self.piece_index);
    }

    // A peer becoming a seeder through have messages is not checked for
    // mutual seeding here, only a bitfield triggers that.
    fn apply_received(
        &self,
        session: &mut PeerSession,
        _storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        session.set_piece(self.piece_index)
    }
}

impl fmt::Display for HaveMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "have index={}", self.piece_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ProtocolFault, error::SessionError, storage::LocalPieces};

    #[test]
    fn test_create() {
        let have = HaveMessage::create(&[4, 0, 0, 1, 2]).unwrap();
        assert_eq!(have.piece_index, 258);
    }

    #[test]
    fn test_create_wrong_length() {
        assert!(matches!(
            HaveMessage::create(&[4, 0, 0, 1]),
            Err(DecodeError::WrongPayloadLength { actual: 3, .. })
        ));
        assert!(matches!(
            HaveMessage::create(&[4, 0, 0, 0, 1, 0]),
            Err(DecodeError::WrongPayloadLength { actual: 5, .. })
        ));
    }

    #[test]
    fn test_serialize() {
        assert_eq!(
            &HaveMessage::new(258).serialize()[..],
            &[0, 0, 0, 5, 4, 0, 0, 1, 2]
        );
    }

    #[test]
    fn test_apply_received() {
        let mut session = PeerSession::new("127.0.0.1:6881".parse().unwrap());
        session.allocate_resources(1024, 10 * 1024).unwrap();
        let storage = LocalPieces::new(10);

        HaveMessage::new(9)
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.has_piece(9));
        assert_eq!(hex::encode(session.bitfield().unwrap()), "0040");

        assert_eq!(
            HaveMessage::new(10).apply_received(&mut session, &storage),
            Err(ApplyError::Fault(ProtocolFault::PieceIndexOutOfRange {
                index: 10,
                num_pieces: 10
            }))
        );
    }

    #[test]
    fn test_completing_pieces_by_have_is_not_mutual_seeder() {
        let mut session = PeerSession::new("127.0.0.1:6881".parse().unwrap());
        session.allocate_resources(1024, 1024).unwrap();
        let storage = LocalPieces::new(1);
        storage.mark_piece(0);

        HaveMessage::new(0)
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.is_peer_seeder());
    }

    #[test]
    fn test_apply_before_allocation() {
        let mut session = PeerSession::new("127.0.0.1:6881".parse().unwrap());
        let storage = LocalPieces::new(1);
        assert_eq!(
            HaveMessage::new(0).apply_received(&mut session, &storage),
            Err(ApplyError::Session(SessionError::NotAllocated))
        );
    }
}
