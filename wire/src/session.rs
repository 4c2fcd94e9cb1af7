use std::net::SocketAddr;

use bytes::Bytes;
use log::warn;

use crate::{
    config::WireConfig,
    error::{ApplyError, ProtocolFault, SessionError},
    types::{BitField, bitfield_byte_len},
};

pub(crate) type Result<T> = std::result::Result<T, SessionError>;

/// A block of a piece, as named by request and cancel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, begin: u32, length: u32) -> Self {
        Self {
            piece_index,
            begin,
            length,
        }
    }
}

/// Block data sent by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub piece_index: u32,
    pub begin: u32,
    pub data: Bytes,
}

/// Per torrent parameters, known once the handshake picked a torrent.
#[derive(Debug)]
struct SessionResources {
    piece_length: u32,
    total_length: u64,
    num_pieces: usize,
    // Raw bytes as the peer sent them, spare bits included.
    peer_bitfield: BitField,
    is_peer_seeder: bool,
}

impl SessionResources {
    fn piece_index(&self, index: u32) -> std::result::Result<usize, ProtocolFault> {
        let index_usize = index as usize;
        if index_usize < self.num_pieces {
            Ok(index_usize)
        } else {
            Err(ProtocolFault::PieceIndexOutOfRange {
                index,
                num_pieces: self.num_pieces,
            })
        }
    }

    fn update_seeder(&mut self) {
        self.is_peer_seeder = self.peer_bitfield[..self.num_pieces].all();
    }
}

/// State of one peer connection.
///
/// Owned by the connection and handed to each received message by `&mut`, so
/// messages of a peer are applied one after the other.
#[derive(Debug)]
pub struct PeerSession {
    addr: SocketAddr,
    resources: Option<SessionResources>,

    // I'm choke the peer
    pub is_choked: bool,
    // I'm interested the peer
    pub is_interesting: bool,
    // The peer is choke me
    pub is_peer_choked: bool,
    // The peer is interested me
    pub is_peer_interesting: bool,

    // DHT port announced by the peer
    pub dht_port: Option<u16>,

    max_block_length: u32,
    max_upload_queue: usize,
    // Blocks the peer asked us for
    upload_queue: Vec<BlockInfo>,
    // Blocks we asked the peer for
    outstanding_requests: Vec<BlockInfo>,
    received_blocks: Vec<Block>,
    downloaded: u64,
}

impl PeerSession {
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_config(addr, &WireConfig::default())
    }

    pub fn with_config(addr: SocketAddr, config: &WireConfig) -> Self {
        Self {
            addr,
            resources: None,
            is_choked: true,
            is_interesting: false,
            is_peer_choked: true,
            is_peer_interesting: false,
            dht_port: None,
            max_block_length: config.max_block_length,
            max_upload_queue: config.max_upload_queue,
            upload_queue: Vec::new(),
            outstanding_requests: Vec::new(),
            received_blocks: Vec::new(),
            downloaded: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sets up the piece geometry of the torrent. The peer's bitfield starts
    /// out empty.
    pub fn allocate_resources(&mut self, piece_length: u32, total_length: u64) -> Result<()> {
        if piece_length == 0 || total_length == 0 {
            return Err(SessionError::InvalidResources {
                piece_length,
                total_length,
            });
        }

        let num_pieces = total_length.div_ceil(piece_length as u64) as usize;
        let bitfield_len = bitfield_byte_len(num_pieces);
        self.resources = Some(SessionResources {
            piece_length,
            total_length,
            num_pieces,
            peer_bitfield: BitField::repeat(false, bitfield_len * 8),
            is_peer_seeder: false,
        });
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.resources.is_some()
    }

    fn resources(&self) -> Result<&SessionResources> {
        self.resources.as_ref().ok_or(SessionError::NotAllocated)
    }

    fn resources_mut(&mut self) -> Result<&mut SessionResources> {
        self.resources.as_mut().ok_or(SessionError::NotAllocated)
    }

    pub fn num_pieces(&self) -> Result<usize> {
        Ok(self.resources()?.num_pieces)
    }

    pub fn expected_bitfield_len(&self) -> Result<usize> {
        Ok(bitfield_byte_len(self.num_pieces()?))
    }

    /// The peer's bitfield as raw bytes.
    pub fn bitfield(&self) -> Result<&[u8]> {
        Ok(self.resources()?.peer_bitfield.as_raw_slice())
    }

    /// Replaces the peer's bitfield and recomputes whether the peer is a seeder.
    pub fn set_bitfield(&mut self, bitfield: &[u8]) -> std::result::Result<(), ApplyError> {
        let resources = self.resources_mut()?;
        let expected = bitfield_byte_len(resources.num_pieces);
        if bitfield.len() != expected {
            return Err(ProtocolFault::BadBitfieldLength {
                expected,
                actual: bitfield.len(),
            }
            .into());
        }

        resources.peer_bitfield = BitField::from_slice(bitfield);
        resources.update_seeder();
        Ok(())
    }

    pub fn has_piece(&self, index: u32) -> bool {
        match &self.resources {
            Some(resources) => resources
                .piece_index(index)
                .is_ok_and(|i| resources.peer_bitfield[i]),
            None => false,
        }
    }

    /// Marks a piece as present at the peer.
    pub fn set_piece(&mut self, index: u32) -> std::result::Result<(), ApplyError> {
        let resources = self.resources_mut()?;
        let index = resources.piece_index(index)?;
        resources.peer_bitfield.set(index, true);
        resources.update_seeder();
        Ok(())
    }

    /// Whether the peer has every piece. False until resources are allocated.
    pub fn is_peer_seeder(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|resources| resources.is_peer_seeder)
    }

    /// Length of the piece at `index`, the last one may be shorter.
    pub fn piece_size(&self, index: u32) -> std::result::Result<u32, ApplyError> {
        let resources = self.resources()?;
        let index = resources.piece_index(index)? as u64;
        let offset = index * resources.piece_length as u64;
        let size = (resources.total_length - offset).min(resources.piece_length as u64);
        Ok(size as u32)
    }

    /// Checks that the block lies inside its piece.
    pub fn check_block(
        &self,
        index: u32,
        begin: u32,
        length: u32,
    ) -> std::result::Result<(), ApplyError> {
        let piece_size = self.piece_size(index)?;
        if begin as u64 + length as u64 > piece_size as u64 {
            return Err(ProtocolFault::InvalidBlock {
                index,
                begin,
                length,
            }
            .into());
        }
        Ok(())
    }

    pub fn max_block_length(&self) -> u32 {
        self.max_block_length
    }

    /// Records that the peer chokes or unchokes us. A choke discards the
    /// requests we have in flight, the peer won't answer them.
    pub fn set_peer_choked(&mut self, choked: bool) {
        self.is_peer_choked = choked;
        if choked {
            self.outstanding_requests.clear();
        }
    }

    /// Records that we choke or unchoke the peer. A choke drops the requests
    /// the peer made so far.
    pub fn set_choked(&mut self, choked: bool) {
        self.is_choked = choked;
        if choked {
            self.upload_queue.clear();
        }
    }

    /// Queues a request from the peer, returns false if it was not queued.
    pub fn queue_upload(&mut self, block: BlockInfo) -> bool {
        if self.upload_queue.contains(&block) {
            return false;
        }
        if self.upload_queue.len() >= self.max_upload_queue {
            warn!(
                "{}: upload queue is full, dropping request index={}, begin={}",
                self.addr, block.piece_index, block.begin
            );
            return false;
        }
        self.upload_queue.push(block);
        true
    }

    pub fn cancel_upload(&mut self, block: &BlockInfo) {
        self.upload_queue.retain(|it| it != block);
    }

    pub fn upload_queue(&self) -> &[BlockInfo] {
        &self.upload_queue
    }

    pub fn pop_upload(&mut self) -> Option<BlockInfo> {
        if self.upload_queue.is_empty() {
            None
        } else {
            Some(self.upload_queue.remove(0))
        }
    }

    pub fn add_outstanding(&mut self, block: BlockInfo) {
        if !self.outstanding_requests.contains(&block) {
            self.outstanding_requests.push(block);
        }
    }

    /// Removes a request we sent, returns whether it was outstanding.
    pub fn take_outstanding(&mut self, block: &BlockInfo) -> bool {
        let before = self.outstanding_requests.len();
        self.outstanding_requests.retain(|it| it != block);
        self.outstanding_requests.len() != before
    }

    pub fn outstanding_requests(&self) -> &[BlockInfo] {
        &self.outstanding_requests
    }

    pub(crate) fn push_received(&mut self, block: Block) {
        self.downloaded += block.data.len() as u64;
        self.received_blocks.push(block);
    }

    /// Hands the received blocks to the piece assembly.
    pub fn take_received_blocks(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.received_blocks)
    }

    /// Bytes of requested block data received from the peer.
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }
}
