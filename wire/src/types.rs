use bitvec::{order::Msb0, vec::BitVec};

// Represents which pieces exists for a peer.
// Each bit represents a piece, where 1 means the piece exists and 0 means it does not.
// The bitfield sent on the wire is padded to whole bytes, the spare bits at the end
// are not pieces.
// Using Msb0 order for BitVec to match the BitTorrent protocol specification.
// https://www.bittorrent.org/beps/bep_0003.html#peer-messages
pub type BitField = BitVec<u8, Msb0>;

/// Number of bytes needed to carry one bit per piece.
pub fn bitfield_byte_len(num_pieces: usize) -> usize {
    num_pieces.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_byte_len_rounds_up() {
        assert_eq!(bitfield_byte_len(0), 0);
        assert_eq!(bitfield_byte_len(1), 1);
        assert_eq!(bitfield_byte_len(8), 1);
        assert_eq!(bitfield_byte_len(9), 2);
        assert_eq!(bitfield_byte_len(16), 2);
    }

    #[test]
    fn test_bitfield_is_msb_first() {
        let bitfield = BitField::from_vec(vec![0x80, 0x01]);
        assert!(bitfield[0]);
        assert!(!bitfield[1]);
        assert!(bitfield[15]);
    }
}
