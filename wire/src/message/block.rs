use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;

use super::{MessageId, PeerMessage, split_payload};
use crate::{
    error::{ApplyError, DecodeError, ProtocolFault},
    session::{Block, BlockInfo, PeerSession},
    storage::PieceStorage,
};

fn read_block_info(mut payload: &[u8]) -> BlockInfo {
    let piece_index = payload.get_u32();
    let begin = payload.get_u32();
    let length = payload.get_u32();
    BlockInfo::new(piece_index, begin, length)
}

fn write_block_info(block: &BlockInfo, dst: &mut BytesMut) {
    dst.put_u32(block.piece_index);
    dst.put_u32(block.begin);
    dst.put_u32(block.length);
}

/// Asks the receiver to upload a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMessage {
    pub block: BlockInfo,
}

impl RequestMessage {
    pub fn new(piece_index: u32, begin: u32, length: u32) -> Self {
        Self {
            block: BlockInfo::new(piece_index, begin, length),
        }
    }
}

impl PeerMessage for RequestMessage {
    const ID: MessageId = MessageId::Request;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let payload = split_payload(Self::ID, frame)?;
        Ok(Self {
            block: read_block_info(payload),
        })
    }

    fn payload_len(&self) -> usize {
        12
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        write_block_info(&self.block, dst);
    }

    fn apply_received(
        &self,
        session: &mut PeerSession,
        storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        let BlockInfo {
            piece_index,
            begin,
            length,
        } = self.block;
        session.check_block(piece_index, begin, length)?;
        if length == 0 || length > session.max_block_length() {
            return Err(ProtocolFault::InvalidBlock {
                index: piece_index,
                begin,
                length,
            }
            .into());
        }

        if session.is_choked {
            debug!("{}: ignoring {} while choked", session.addr(), self);
            return Ok(());
        }
        if !storage.has_piece(piece_index) {
            debug!("{}: ignoring {}, piece is missing", session.addr(), self);
            return Ok(());
        }
        session.queue_upload(self.block);
        Ok(())
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request index={}, begin={}, length={}",
            self.block.piece_index, self.block.begin, self.block.length
        )
    }
}

/// Withdraws an earlier request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelMessage {
    pub block: BlockInfo,
}

impl CancelMessage {
    pub fn new(piece_index: u32, begin: u32, length: u32) -> Self {
        Self {
            block: BlockInfo::new(piece_index, begin, length),
        }
    }
}

impl PeerMessage for CancelMessage {
    const ID: MessageId = MessageId::Cancel;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let payload = split_payload(Self::ID, frame)?;
        Ok(Self {
            block: read_block_info(payload),
        })
    }

    fn payload_len(&self) -> usize {
        12
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        write_block_info(&self.block, dst);
    }

    fn apply_received(
        &self,
        session: &mut PeerSession,
        _storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        session.cancel_upload(&self.block);
        Ok(())
    }
}

impl fmt::Display for CancelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cancel index={}, begin={}, length={}",
            self.block.piece_index, self.block.begin, self.block.length
        )
    }
}

/// Block data answering a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceMessage {
    pub piece_index: u32,
    pub begin: u32,
    pub block: Bytes,
}

impl PieceMessage {
    pub fn new(piece_index: u32, begin: u32, block: Bytes) -> Self {
        Self {
            piece_index,
            begin,
            block,
        }
    }

    pub fn block_info(&self) -> BlockInfo {
        BlockInfo::new(self.piece_index, self.begin, self.block.len() as u32)
    }
}

impl PeerMessage for PieceMessage {
    const ID: MessageId = MessageId::Piece;

    fn create(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut payload = split_payload(Self::ID, frame)?;
        let piece_index = payload.get_u32();
        let begin = payload.get_u32();
        Ok(Self::new(piece_index, begin, Bytes::copy_from_slice(payload)))
    }

    fn payload_len(&self) -> usize {
        8 + self.block.len()
    }

    fn write_payload(&self, dst: &mut BytesMut) {
        dst.put_u32(self.piece_index);
        dst.put_u32(self.begin);
        dst.extend_from_slice(&self.block);
    }

    fn apply_received(
        &self,
        session: &mut PeerSession,
        _storage: &dyn PieceStorage,
    ) -> Result<(), ApplyError> {
        let info = self.block_info();
        session.check_block(info.piece_index, info.begin, info.length)?;

        if !session.take_outstanding(&info) {
            debug!("{}: discarding unrequested {}", session.addr(), self);
            return Ok(());
        }
        session.push_received(Block {
            piece_index: self.piece_index,
            begin: self.begin,
            data: self.block.clone(),
        });
        Ok(())
    }
}

impl fmt::Display for PieceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "piece index={}, begin={}, length={}",
            self.piece_index,
            self.begin,
            self.block.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::WireConfig, storage::LocalPieces};

    const BLOCK: u32 = 16 * 1024;

    fn session() -> PeerSession {
        let mut session = PeerSession::new("127.0.0.1:6881".parse().unwrap());
        session.allocate_resources(2 * BLOCK, 3 * 2 * BLOCK as u64).unwrap();
        session
    }

    fn storage() -> LocalPieces {
        let storage = LocalPieces::new(3);
        storage.mark_piece(0);
        storage
    }

    #[test]
    fn test_request_create_and_serialize() {
        let request = RequestMessage::create(&[6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]).unwrap();
        assert_eq!(request, RequestMessage::new(1, BLOCK, BLOCK));
        assert_eq!(
            &request.serialize()[..],
            &[0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]
        );
    }

    #[test]
    fn test_request_is_queued_when_unchoked() {
        let mut session = session();
        let storage = storage();
        session.set_choked(false);

        let request = RequestMessage::new(0, BLOCK, BLOCK);
        request.apply_received(&mut session, &storage).unwrap();
        request.apply_received(&mut session, &storage).unwrap();
        assert_eq!(session.upload_queue(), &[request.block]);
    }

    #[test]
    fn test_request_is_ignored_when_choked() {
        let mut session = session();
        let storage = storage();

        RequestMessage::new(0, 0, BLOCK)
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.upload_queue().is_empty());
    }

    #[test]
    fn test_request_for_missing_piece_is_ignored() {
        let mut session = session();
        let storage = storage();
        session.set_choked(false);

        RequestMessage::new(1, 0, BLOCK)
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.upload_queue().is_empty());
    }

    #[test]
    fn test_request_outside_piece_is_fault() {
        let mut session = session();
        let storage = storage();
        session.set_choked(false);

        assert_eq!(
            RequestMessage::new(0, BLOCK, BLOCK + 1).apply_received(&mut session, &storage),
            Err(ApplyError::Fault(ProtocolFault::InvalidBlock {
                index: 0,
                begin: BLOCK,
                length: BLOCK + 1
            }))
        );
        assert!(matches!(
            RequestMessage::new(3, 0, BLOCK).apply_received(&mut session, &storage),
            Err(ApplyError::Fault(ProtocolFault::PieceIndexOutOfRange { index: 3, .. }))
        ));
        assert!(RequestMessage::new(0, 0, 0)
            .apply_received(&mut session, &storage)
            .is_err());
    }

    #[test]
    fn test_request_longer_than_max_block_is_fault() {
        let config = WireConfig {
            max_block_length: 1024,
            ..WireConfig::default()
        };
        let mut session = PeerSession::with_config("127.0.0.1:6881".parse().unwrap(), &config);
        session.allocate_resources(2 * BLOCK, 2 * BLOCK as u64).unwrap();
        let storage = storage();

        assert!(matches!(
            RequestMessage::new(0, 0, 1025).apply_received(&mut session, &storage),
            Err(ApplyError::Fault(ProtocolFault::InvalidBlock { .. }))
        ));
    }

    #[test]
    fn test_cancel_removes_queued_request() {
        let mut session = session();
        let storage = storage();
        session.set_choked(false);

        RequestMessage::new(0, 0, BLOCK)
            .apply_received(&mut session, &storage)
            .unwrap();
        RequestMessage::new(0, BLOCK, BLOCK)
            .apply_received(&mut session, &storage)
            .unwrap();
        CancelMessage::new(0, 0, BLOCK)
            .apply_received(&mut session, &storage)
            .unwrap();
        assert_eq!(session.upload_queue(), &[BlockInfo::new(0, BLOCK, BLOCK)]);
    }

    #[test]
    fn test_piece_create() {
        let piece = PieceMessage::create(&[7, 0, 0, 0, 2, 0, 0, 0, 4, 0xaa, 0xbb]).unwrap();
        assert_eq!(piece.piece_index, 2);
        assert_eq!(piece.begin, 4);
        assert_eq!(&piece.block[..], &[0xaa, 0xbb]);
        assert_eq!(piece.payload_len(), 10);

        assert!(matches!(
            PieceMessage::create(&[7, 0, 0, 0, 2, 0, 0, 0]),
            Err(DecodeError::WrongPayloadLength { actual: 7, .. })
        ));
    }

    #[test]
    fn test_piece_for_outstanding_request() {
        let mut session = session();
        let storage = storage();
        session.add_outstanding(BlockInfo::new(1, 0, 4));

        PieceMessage::new(1, 0, Bytes::from_static(b"data"))
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.outstanding_requests().is_empty());
        assert_eq!(session.downloaded(), 4);

        let blocks = session.take_received_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].piece_index, 1);
        assert_eq!(&blocks[0].data[..], b"data");
        assert!(session.take_received_blocks().is_empty());
    }

    #[test]
    fn test_unrequested_piece_is_discarded() {
        let mut session = session();
        let storage = storage();

        PieceMessage::new(1, 0, Bytes::from_static(b"data"))
            .apply_received(&mut session, &storage)
            .unwrap();
        assert!(session.take_received_blocks().is_empty());
        assert_eq!(session.downloaded(), 0);
    }

    #[test]
    fn test_piece_outside_piece_is_fault() {
        let mut session = session();
        let storage = storage();

        assert!(matches!(
            PieceMessage::new(2, 2 * BLOCK - 1, Bytes::from_static(b"xy"))
                .apply_received(&mut session, &storage),
            Err(ApplyError::Fault(ProtocolFault::InvalidBlock { index: 2, .. }))
        ));
    }
}
