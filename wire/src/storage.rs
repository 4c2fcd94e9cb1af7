use std::sync::{
    PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use crate::types::BitField;

/// What the message layer needs to know about our own pieces.
///
/// Shared by every connection of a torrent, reads must be safe from many
/// connections at once. The message layer never writes through it.
pub trait PieceStorage: Send + Sync {
    fn is_download_complete(&self) -> bool;

    fn has_piece(&self, index: u32) -> bool;

    /// Our pieces, one bit each, `num_pieces` bits long.
    fn bitfield(&self) -> BitField;

    fn num_pieces(&self) -> usize;
}

/// In memory record of the pieces we have verified.
#[derive(Debug)]
pub struct LocalPieces {
    pieces: RwLock<BitField>,
    download_complete: AtomicBool,
}

impl LocalPieces {
    pub fn new(num_pieces: usize) -> Self {
        Self::from_bitfield(BitField::repeat(false, num_pieces))
    }

    pub fn from_bitfield(pieces: BitField) -> Self {
        let download_complete = pieces.all();
        Self {
            pieces: RwLock::new(pieces),
            download_complete: AtomicBool::new(download_complete),
        }
    }

    /// Records a verified piece, returns false if the index is out of range.
    pub fn mark_piece(&self, index: u32) -> bool {
        let mut pieces = self.pieces.write().unwrap_or_else(PoisonError::into_inner);
        let index = index as usize;
        if index >= pieces.len() {
            return false;
        }
        pieces.set(index, true);
        if pieces.all() {
            self.download_complete.store(true, Ordering::Release);
        }
        true
    }

    /// Overrides the completion flag, e.g. when a file selection changes
    /// what counts as complete.
    pub fn set_download_complete(&self, complete: bool) {
        self.download_complete.store(complete, Ordering::Release);
    }
}

impl PieceStorage for LocalPieces {
    fn is_download_complete(&self) -> bool {
        self.download_complete.load(Ordering::Acquire)
    }

    fn has_piece(&self, index: u32) -> bool {
        let pieces = self.pieces.read().unwrap_or_else(PoisonError::into_inner);
        pieces.get(index as usize).is_some_and(|bit| *bit)
    }

    fn bitfield(&self) -> BitField {
        self.pieces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn num_pieces(&self) -> usize {
        self.pieces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
