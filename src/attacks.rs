//! Precomputed attack tables.
//! - Knight and king: lookup tables
//! - Pawns: per-square attack and push tables for both colors
//! - Sliding pieces (bishop, rook, queen): magic bitboards whose
//!   multipliers are found at startup by rejection sampling and verified
//!   over every occupancy subset before acceptance
//! - Between-squares table and castling inner masks

use crate::bitboard::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::OnceLock;

struct AttackTables {
    knight: [Bitboard; 64],
    king: [Bitboard; 64],
    /// Pawn capture targets, indexed [color][square of the pawn].
    pawn_attacks: [[Bitboard; 64]; 2],
    /// Pawn push targets (single and, from the start rank, double).
    pawn_pushes: [[Bitboard; 64]; 2],
    /// Squares strictly between two squares on a shared line or diagonal.
    between: [[Bitboard; 64]; 64],
    /// Squares between king and rook that must be empty,
    /// indexed [color][castling side].
    castling_inner: [[Bitboard; 2]; 2],
    bishop_magics: Vec<MagicEntry>,
    rook_magics: Vec<MagicEntry>,
    bishop_table: Vec<Bitboard>,
    rook_table: Vec<Bitboard>,
}

struct MagicEntry {
    mask: Bitboard,
    magic: u64,
    shift: u8,
    offset: usize,
}

static TABLES: OnceLock<AttackTables> = OnceLock::new();

/// Initialize all attack tables. Must be called once at startup.
pub fn init() {
    TABLES.get_or_init(|| {
        let knight = init_knight_attacks();
        let king = init_king_attacks();
        let pawn_attacks = init_pawn_attacks();
        let pawn_pushes = init_pawn_pushes();
        let between = init_between();
        let castling_inner = init_castling_inner();
        let (bishop_magics, bishop_table) = init_magics(false);
        let (rook_magics, rook_table) = init_magics(true);
        AttackTables {
            knight,
            king,
            pawn_attacks,
            pawn_pushes,
            between,
            castling_inner,
            bishop_magics,
            rook_magics,
            bishop_table,
            rook_table,
        }
    });
}

fn tables() -> &'static AttackTables {
    TABLES
        .get()
        .expect("Attack tables not initialized! Call attacks::init() first.")
}

// ============================================================
// Leaper tables
// ============================================================

fn init_knight_attacks() -> [Bitboard; 64] {
    let mut attacks = [0u64; 64];
    for s in 0..64u8 {
        let bb = square_bb(s);
        let mut a: Bitboard = 0;
        a |= (bb << 17) & NOT_FILE_A; // up 2, right 1
        a |= (bb << 15) & NOT_FILE_H; // up 2, left 1
        a |= (bb << 10) & NOT_FILE_AB; // up 1, right 2
        a |= (bb << 6) & NOT_FILE_GH; // up 1, left 2
        a |= (bb >> 6) & NOT_FILE_AB; // down 1, right 2
        a |= (bb >> 10) & NOT_FILE_GH; // down 1, left 2
        a |= (bb >> 15) & NOT_FILE_A; // down 2, right 1
        a |= (bb >> 17) & NOT_FILE_H; // down 2, left 1
        attacks[s as usize] = a;
    }
    attacks
}

fn init_king_attacks() -> [Bitboard; 64] {
    let mut attacks = [0u64; 64];
    for s in 0..64u8 {
        let bb = square_bb(s);
        let mut a: Bitboard = 0;
        a |= north(bb);
        a |= south(bb);
        a |= east(bb);
        a |= west(bb);
        a |= north_east(bb);
        a |= north_west(bb);
        a |= south_east(bb);
        a |= south_west(bb);
        attacks[s as usize] = a;
    }
    attacks
}

fn init_pawn_attacks() -> [[Bitboard; 64]; 2] {
    let mut attacks = [[0u64; 64]; 2];
    for s in 0..64u8 {
        let bb = square_bb(s);
        attacks[Color::White.index()][s as usize] = north_east(bb) | north_west(bb);
        attacks[Color::Black.index()][s as usize] = south_east(bb) | south_west(bb);
    }
    attacks
}

fn init_pawn_pushes() -> [[Bitboard; 64]; 2] {
    let mut pushes = [[0u64; 64]; 2];
    for s in 0..64u8 {
        let bb = square_bb(s);
        let mut w = north(bb);
        if bb & RANK_2 != 0 {
            w |= north(w);
        }
        let mut b = south(bb);
        if bb & RANK_7 != 0 {
            b |= south(b);
        }
        pushes[Color::White.index()][s as usize] = w;
        pushes[Color::Black.index()][s as usize] = b;
    }
    pushes
}

fn init_between() -> [[Bitboard; 64]; 64] {
    let mut between = [[0u64; 64]; 64];
    for a in 0..64u8 {
        for b in 0..64u8 {
            if a == b {
                continue;
            }
            let (ar, af) = (rank_of(a) as i8, file_of(a) as i8);
            let (br, bf) = (rank_of(b) as i8, file_of(b) as i8);
            let (dr, df) = (br - ar, bf - af);
            let step = if dr == 0 {
                (0, df.signum())
            } else if df == 0 {
                (dr.signum(), 0)
            } else if dr.abs() == df.abs() {
                (dr.signum(), df.signum())
            } else {
                continue;
            };
            let mut bb: Bitboard = 0;
            let (mut r, mut f) = (ar + step.0, af + step.1);
            while (r, f) != (br, bf) {
                bb |= square_bb(make_sq(f as u8, r as u8));
                r += step.0;
                f += step.1;
            }
            between[a as usize][b as usize] = bb;
        }
    }
    between
}

fn init_castling_inner() -> [[Bitboard; 2]; 2] {
    let oo_white = square_bb(sq::F1) | square_bb(sq::G1);
    let ooo_white = square_bb(sq::B1) | square_bb(sq::C1) | square_bb(sq::D1);
    [
        [oo_white, ooo_white],
        [oo_white << 56, ooo_white << 56],
    ]
}

// ============================================================
// Magic bitboards for sliding pieces
// ============================================================

/// Relevant occupancy mask for a bishop (board edges excluded).
fn bishop_mask(s: Square) -> Bitboard {
    let mut mask: Bitboard = 0;
    let (r, f) = (rank_of(s) as i8, file_of(s) as i8);
    for &(dr, df) in &[(1, 1), (1, -1), (-1, 1), (-1, -1)] {
        let (mut cr, mut cf) = (r + dr, f + df);
        while cr > 0 && cr < 7 && cf > 0 && cf < 7 {
            mask |= square_bb(make_sq(cf as u8, cr as u8));
            cr += dr;
            cf += df;
        }
    }
    mask
}

/// Relevant occupancy mask for a rook (edges excluded on the move axes).
fn rook_mask(s: Square) -> Bitboard {
    let mut mask: Bitboard = 0;
    let (r, f) = (rank_of(s) as i8, file_of(s) as i8);
    for cr in (r + 1)..7 {
        mask |= square_bb(make_sq(f as u8, cr as u8));
    }
    for cr in 1..r {
        mask |= square_bb(make_sq(f as u8, cr as u8));
    }
    for cf in (f + 1)..7 {
        mask |= square_bb(make_sq(cf as u8, r as u8));
    }
    for cf in 1..f {
        mask |= square_bb(make_sq(cf as u8, r as u8));
    }
    mask
}

/// Ray-walking slider attacks, used to fill the magic tables and in tests.
fn slider_attacks_slow(s: Square, occ: Bitboard, rook: bool) -> Bitboard {
    let dirs: &[(i8, i8)] = if rook {
        &[(1, 0), (-1, 0), (0, 1), (0, -1)]
    } else {
        &[(1, 1), (1, -1), (-1, 1), (-1, -1)]
    };
    let mut attacks: Bitboard = 0;
    let (r, f) = (rank_of(s) as i8, file_of(s) as i8);
    for &(dr, df) in dirs {
        let (mut cr, mut cf) = (r + dr, f + df);
        while (0..8).contains(&cr) && (0..8).contains(&cf) {
            let sq2 = make_sq(cf as u8, cr as u8);
            attacks |= square_bb(sq2);
            if occ & square_bb(sq2) != 0 {
                break;
            }
            cr += dr;
            cf += df;
        }
    }
    attacks
}

/// Enumerate all subsets of a mask using the carry-rippler trick.
fn enumerate_subsets(mask: Bitboard) -> Vec<Bitboard> {
    let mut subsets = Vec::new();
    let mut subset: Bitboard = 0;
    loop {
        subsets.push(subset);
        subset = subset.wrapping_sub(mask) & mask;
        if subset == 0 {
            break;
        }
    }
    subsets
}

/// Find a magic multiplier for one square by rejection sampling.
///
/// Candidates are bit-sparse (the AND of three random words); each candidate
/// is accepted only if no two occupancy subsets map to the same index with
/// different attack sets. The per-square seed makes the result reproducible.
fn find_magic(
    s: Square,
    mask: Bitboard,
    shift: u8,
    subsets: &[Bitboard],
    reference: &[Bitboard],
    rook: bool,
) -> u64 {
    let table_len = 1usize << (64 - shift);
    let seed = 0xA11C_E5E1_D000_0000u64 ^ ((rook as u64) << 32) ^ s as u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut used: Vec<Bitboard> = vec![0; table_len];
    let mut epoch: Vec<u32> = vec![0; table_len];
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let magic: u64 = rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>();
        // Weed out multipliers that do not spread the mask's high bits.
        if popcount(mask.wrapping_mul(magic) & 0xFF00_0000_0000_0000) < 6 {
            continue;
        }
        let mut ok = true;
        for (i, &occ) in subsets.iter().enumerate() {
            let idx = (occ.wrapping_mul(magic) >> shift) as usize;
            if epoch[idx] != attempt {
                epoch[idx] = attempt;
                used[idx] = reference[i];
            } else if used[idx] != reference[i] {
                ok = false;
                break;
            }
        }
        if ok {
            return magic;
        }
    }
}

fn init_magics(rook: bool) -> (Vec<MagicEntry>, Vec<Bitboard>) {
    let masks: Vec<Bitboard> = (0..64u8)
        .map(|s| if rook { rook_mask(s) } else { bishop_mask(s) })
        .collect();
    let total: usize = masks.iter().map(|m| 1usize << popcount(*m)).sum();
    let mut table = vec![0u64; total];
    let mut magics = Vec::with_capacity(64);

    let mut offset = 0;
    for s in 0..64u8 {
        let mask = masks[s as usize];
        let bits = popcount(mask) as u8;
        let shift = 64 - bits;

        let subsets = enumerate_subsets(mask);
        let reference: Vec<Bitboard> = subsets
            .iter()
            .map(|&occ| slider_attacks_slow(s, occ, rook))
            .collect();

        let magic = find_magic(s, mask, shift, &subsets, &reference, rook);
        for (i, &occ) in subsets.iter().enumerate() {
            let idx = (occ.wrapping_mul(magic) >> shift) as usize;
            table[offset + idx] = reference[i];
        }

        magics.push(MagicEntry { mask, magic, shift, offset });
        offset += 1 << bits;
    }

    assert_eq!(offset, total);
    (magics, table)
}

// ============================================================
// Public lookup functions
// ============================================================

#[inline]
pub fn knight_attacks(s: Square) -> Bitboard {
    tables().knight[s as usize]
}

#[inline]
pub fn king_attacks(s: Square) -> Bitboard {
    tables().king[s as usize]
}

#[inline]
pub fn pawn_attacks(c: Color, s: Square) -> Bitboard {
    tables().pawn_attacks[c.index()][s as usize]
}

#[inline]
pub fn pawn_pushes(c: Color, s: Square) -> Bitboard {
    tables().pawn_pushes[c.index()][s as usize]
}

#[inline]
pub fn between_bb(a: Square, b: Square) -> Bitboard {
    tables().between[a as usize][b as usize]
}

#[inline]
pub fn castling_inner(c: Color, side: CastlingSide) -> Bitboard {
    tables().castling_inner[c.index()][match side {
        CastlingSide::Kingside => 0,
        CastlingSide::Queenside => 1,
    }]
}

#[inline]
pub fn bishop_attacks(s: Square, occ: Bitboard) -> Bitboard {
    let t = tables();
    let entry = &t.bishop_magics[s as usize];
    let idx = ((occ & entry.mask).wrapping_mul(entry.magic) >> entry.shift) as usize;
    t.bishop_table[entry.offset + idx]
}

#[inline]
pub fn rook_attacks(s: Square, occ: Bitboard) -> Bitboard {
    let t = tables();
    let entry = &t.rook_magics[s as usize];
    let idx = ((occ & entry.mask).wrapping_mul(entry.magic) >> entry.shift) as usize;
    t.rook_table[entry.offset + idx]
}

#[inline]
pub fn queen_attacks(s: Square, occ: Bitboard) -> Bitboard {
    bishop_attacks(s, occ) | rook_attacks(s, occ)
}

/// Attacks of a piece type from a square on an otherwise empty board.
pub fn empty_board_attacks(pt: PieceType, s: Square) -> Bitboard {
    match pt {
        KNIGHT => knight_attacks(s),
        BISHOP => bishop_attacks(s, 0),
        ROOK => rook_attacks(s, 0),
        QUEEN => queen_attacks(s, 0),
        KING => king_attacks(s),
        _ => 0,
    }
}
