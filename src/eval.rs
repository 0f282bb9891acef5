//! Static evaluation: material plus piece-square tables.
//!
//! The position keeps a single incrementally-maintained accumulator, signed
//! from White's perspective; `Position::evaluate` is O(1). Weights keep the
//! standard material ordering (P < N ~ B < R < Q) that SEE pruning and
//! capture ordering rely on.

use crate::bitboard::*;
use std::sync::OnceLock;

pub type Score = i32;

pub const SCORE_ZERO: Score = 0;
pub const SCORE_WIN: Score = 30000;
pub const SCORE_LOSE: Score = -30000;

/// Hard cap on game length; also the undo-stack capacity.
pub const MAX_GAME_PLY: usize = 1024;

/// Scores beyond these bounds are distance-to-mate relative.
pub const SCORE_WIN_MIN: Score = SCORE_WIN - MAX_GAME_PLY as Score;
pub const SCORE_LOSE_MAX: Score = SCORE_LOSE + MAX_GAME_PLY as Score;

#[inline]
pub fn is_win_score(s: Score) -> bool {
    s > SCORE_WIN_MIN
}

#[inline]
pub fn is_lose_score(s: Score) -> bool {
    s < SCORE_LOSE_MAX
}

/// Piece weights in centipawns, indexed by piece type. The king weight only
/// matters to exchange simulation, where it must dominate every other piece.
pub const PT_WEIGHT: [Score; PIECETYPE_CNT] = [0, 100, 320, 330, 500, 900, 10000];

#[inline]
pub fn pt_weight(pt: PieceType) -> Score {
    PT_WEIGHT[pt as usize]
}

// ============================================================
// Piece-square tables, from White's perspective, a1 = index 0.
// ============================================================

#[rustfmt::skip]
const PAWN_PST: [Score; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
    -1,  1, -4, -8, -8, -4,  1, -1,
    -2,  0, -3, -1, -1, -3,  0, -2,
    -2,  2,  6, 12, 12,  6,  2, -2,
     3,  8, 14, 22, 22, 14,  8,  3,
     5, 12, 18, 28, 28, 18, 12,  5,
    10, 15, 20, 30, 30, 20, 15, 10,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT_PST: [Score; 64] = [
    -50,-30,-20,-15,-15,-20,-30,-50,
    -30,-10,  0,  5,  5,  0,-10,-30,
    -20,  5, 15, 20, 20, 15,  5,-20,
    -10, 10, 20, 25, 25, 20, 10,-10,
    -10, 10, 20, 25, 25, 20, 10,-10,
    -20,  5, 15, 20, 20, 15,  5,-20,
    -30,-10,  0,  5,  5,  0,-10,-30,
    -50,-30,-20,-15,-15,-20,-30,-50,
];

#[rustfmt::skip]
const BISHOP_PST: [Score; 64] = [
    -10,-10,-10,-10,-10,-10,-10,-10,
     -5,  5,  2,  5,  5,  2,  5, -5,
     -5,  5, 10,  8,  8, 10,  5, -5,
     -5,  2,  8, 12, 12,  8,  2, -5,
     -5,  5, 10, 12, 12, 10,  5, -5,
     -5, 10, 10,  5,  5, 10, 10, -5,
     -5,  8,  2,  2,  2,  2,  8, -5,
    -10,-10,-10,-10,-10,-10,-10,-10,
];

#[rustfmt::skip]
const ROOK_PST: [Score; 64] = [
    -2,  0,  4,  6,  6,  4,  0, -2,
    -5, -2,  0,  2,  2,  0, -2, -5,
    -5, -2,  0,  0,  0,  0, -2, -5,
    -5, -2,  0,  0,  0,  0, -2, -5,
    -5, -2,  0,  0,  0,  0, -2, -5,
     0,  2,  5,  8,  8,  5,  2,  0,
    10, 12, 15, 18, 18, 15, 12, 10,
     5,  5,  5,  5,  5,  5,  5,  5,
];

#[rustfmt::skip]
const QUEEN_PST: [Score; 64] = [
    -15,-10, -5,  0,  0, -5,-10,-15,
    -10, -2,  3,  3,  3,  3, -2,-10,
     -5,  3,  5,  5,  5,  5,  3, -5,
      0,  3,  5,  8,  8,  5,  3,  0,
     -3,  3,  5,  8,  8,  5,  3, -3,
     -5,  0,  5,  3,  3,  5,  0, -5,
    -10, -5, -2, -2, -2, -2, -5,-10,
    -15,-10, -5, -5, -5, -5,-10,-15,
];

#[rustfmt::skip]
const KING_PST: [Score; 64] = [
     20, 30, 10, -5, -5, 10, 30, 20,
     20, 20,  0,-10,-10,  0, 20, 20,
    -10,-15,-20,-25,-25,-20,-15,-10,
    -25,-30,-35,-40,-40,-35,-30,-25,
    -40,-45,-50,-55,-55,-50,-45,-40,
    -35,-40,-50,-55,-55,-50,-40,-35,
    -25,-35,-45,-50,-50,-45,-35,-25,
    -20,-30,-40,-50,-50,-40,-30,-20,
];

const PST: [&[Score; 64]; PIECETYPE_CNT] = [
    &[0; 64], // PT_NONE slot
    &PAWN_PST,
    &KNIGHT_PST,
    &BISHOP_PST,
    &ROOK_PST,
    &QUEEN_PST,
    &KING_PST,
];

/// Signed (color, type, square) value table the accumulator is built from:
/// material plus square bonus, positive for White and negative for Black.
struct PsqTable {
    values: [[[Score; 64]; PIECETYPE_CNT]; COLOR_CNT],
}

static PSQ: OnceLock<PsqTable> = OnceLock::new();

/// Initialize the PSQ value table. Must be called once at startup.
pub fn init() {
    PSQ.get_or_init(|| {
        let mut values = [[[0; 64]; PIECETYPE_CNT]; COLOR_CNT];
        for pt in PAWN..=KING {
            for s in 0..64usize {
                let v = PT_WEIGHT[pt as usize] + PST[pt as usize][s];
                values[Color::White.index()][pt as usize][s] = v;
                // Black pieces score from the mirrored square and count
                // negatively in the White-relative accumulator.
                values[Color::Black.index()][pt as usize][s ^ 56] = -v;
            }
        }
        PsqTable { values }
    });
}

/// Accumulator contribution of a piece standing on a square.
#[inline]
pub fn psq_value(c: Color, pt: PieceType, s: Square) -> Score {
    PSQ.get()
        .expect("PSQ table not initialized! Call eval::init() first.")
        .values[c.index()][pt as usize][s as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        init();
    }

    #[test]
    fn test_material_ordering() {
        assert!(pt_weight(PAWN) < pt_weight(KNIGHT));
        assert!(pt_weight(KNIGHT) <= pt_weight(BISHOP));
        assert!(pt_weight(BISHOP) < pt_weight(ROOK));
        assert!(pt_weight(ROOK) < pt_weight(QUEEN));
        assert!(pt_weight(QUEEN) < pt_weight(KING));
    }

    #[test]
    fn test_psq_symmetry() {
        setup();
        // A black piece on the mirrored square exactly cancels the white one.
        for pt in PAWN..=KING {
            for s in 0..64u8 {
                assert_eq!(
                    psq_value(Color::White, pt, s),
                    -psq_value(Color::Black, pt, s ^ 56)
                );
            }
        }
    }

    #[test]
    fn test_psq_includes_material() {
        setup();
        assert_eq!(psq_value(Color::White, PAWN, sq::A2), pt_weight(PAWN) - 1);
        assert!(psq_value(Color::White, QUEEN, sq::D4) > pt_weight(ROOK));
    }

    #[test]
    fn test_mate_score_bounds() {
        assert!(is_win_score(SCORE_WIN - 1));
        assert!(!is_win_score(SCORE_WIN_MIN));
        assert!(is_lose_score(SCORE_LOSE + 1));
        assert!(!is_lose_score(SCORE_LOSE_MAX));
    }
}
