//! Zobrist hashing for transposition table keys.
//! One 64-bit random per (color, piece type, square), per castling-right
//! bit, per en-passant file, and one for the side to move. The generator is
//! seeded with a fixed constant so the same keys appear every run; hash
//! behavior is reproducible across processes.

use crate::bitboard::{CastlingRight, COLOR_CNT, PIECETYPE_CNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

pub struct ZobristKeys {
    /// Indexed [color][piece type][square]; the PT_ALL/NONE slot stays zero.
    pub piece_keys: [[[u64; 64]; PIECETYPE_CNT]; COLOR_CNT],
    /// One key per castling-right bit.
    pub castling_keys: [u64; 4],
    /// En-passant file (0-7).
    pub ep_keys: [u64; 8],
    /// XORed in when it is Black's turn.
    pub side_key: u64,
}

impl ZobristKeys {
    /// Combined key for a castling-rights mask: XOR of the per-bit keys.
    /// XORing with `castling_key(old ^ new)` flips exactly the changed bits.
    #[inline]
    pub fn castling_key(&self, rights: CastlingRight) -> u64 {
        let mut key = 0u64;
        for (bit, k) in self.castling_keys.iter().enumerate() {
            if rights & (1 << bit) != 0 {
                key ^= k;
            }
        }
        key
    }
}

static ZOBRIST: OnceLock<ZobristKeys> = OnceLock::new();

/// Initialize the key set. Must be called once at startup.
pub fn init() {
    ZOBRIST.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x5EED_0F_B1E0D_C0DE);

        let mut keys = ZobristKeys {
            piece_keys: [[[0u64; 64]; PIECETYPE_CNT]; COLOR_CNT],
            castling_keys: [0u64; 4],
            ep_keys: [0u64; 8],
            side_key: 0,
        };

        for color in 0..COLOR_CNT {
            // Real piece types only; index 0 is the all-pieces pseudo-type.
            for pt in 1..PIECETYPE_CNT {
                for s in 0..64 {
                    keys.piece_keys[color][pt][s] = rng.gen();
                }
            }
        }

        for k in keys.castling_keys.iter_mut() {
            *k = rng.gen();
        }

        for k in keys.ep_keys.iter_mut() {
            *k = rng.gen();
        }

        keys.side_key = rng.gen();

        keys
    });
}

/// Get a reference to the global key set.
#[inline]
pub fn keys() -> &'static ZobristKeys {
    ZOBRIST
        .get()
        .expect("Zobrist keys not initialized! Call zobrist::init() first.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitboard::{CR_ALL, CR_WHITE_OO, CR_WHITE_OOO};

    #[test]
    fn test_zobrist_init() {
        init();
        let k = keys();
        assert_ne!(k.side_key, 0);
        assert_ne!(k.piece_keys[0][1][0], k.piece_keys[0][1][1]);
        assert_ne!(k.piece_keys[0][1][0], k.piece_keys[1][1][0]);
        // The pseudo-type slot must contribute nothing.
        assert_eq!(k.piece_keys[0][0][17], 0);
    }

    #[test]
    fn test_castling_key_composition() {
        init();
        let k = keys();
        assert_eq!(k.castling_key(0), 0);
        assert_eq!(
            k.castling_key(CR_WHITE_OO | CR_WHITE_OOO),
            k.castling_keys[0] ^ k.castling_keys[1]
        );
        // Flipping one bit out of a full mask changes the key by that bit.
        assert_eq!(
            k.castling_key(CR_ALL) ^ k.castling_key(CR_ALL & !CR_WHITE_OO),
            k.castling_keys[0]
        );
    }
}
