//! Staged, ordered move supply for the search.
//!
//! Phases: the transposition-table move first (validated for
//! pseudo-legality against hash collisions, and for full legality at the
//! root), then generation with scoring, then best-first selection skipping
//! the TT move, and at the root of a parallel search the moves that were
//! deferred because a peer thread was already searching them.

use crate::bitboard::{piece_type, PAWN, PIECETYPE_CNT};
use crate::movegen::GenKind;
use crate::moves::{Move, MoveList, MoveScore, MoveType, MOVE_NONE};
use crate::position::Position;
use crate::smp::RootSlot;
use std::sync::atomic::Ordering;

pub const MAX_KILLERS: usize = 3;

// Move-ordering bonuses. Magnitudes keep the tiers disjoint:
// TT move >> winning captures >> killers >> countermove >> history.
pub const MS_TT_BONUS: MoveScore = 1_500_000_000;
pub const MS_KILLER_BONUS: MoveScore = 1_200_000;
pub const MS_COUNTERMOVE_BONUS: MoveScore = 300_000;
pub const MS_CAPTURE_BONUS_VICTIM: [MoveScore; PIECETYPE_CNT] =
    [0, 100_000, 285_000, 300_000, 500_000, 1_000_000, 0];
pub const MS_CAPTURE_BONUS_ATTACKER: [MoveScore; PIECETYPE_CNT] =
    [0, 1_000_000, 800_000, 750_000, 400_000, 200_000, 0];

/// Per-ply ring of quiet moves that caused beta cutoffs, most recent first.
#[derive(Clone, Copy)]
pub struct KillerRing {
    moves: [Move; MAX_KILLERS],
    len: usize,
}

impl KillerRing {
    pub const fn new() -> Self {
        KillerRing {
            moves: [MOVE_NONE; MAX_KILLERS],
            len: 0,
        }
    }

    #[inline]
    pub fn contains(&self, m: Move) -> bool {
        self.moves[..self.len].contains(&m)
    }

    /// Unshift a new killer to the front; known killers are not re-added
    /// and the ring never exceeds its capacity.
    pub fn push_front(&mut self, m: Move) {
        if self.contains(m) {
            return;
        }
        let keep = self.len.min(MAX_KILLERS - 1);
        for i in (0..keep).rev() {
            self.moves[i + 1] = self.moves[i];
        }
        self.moves[0] = m;
        self.len = (self.len + 1).min(MAX_KILLERS);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for KillerRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed scoring view over one thread's ordering state. The search
/// constructs it per node; the picker consumes it when scoring the list.
pub struct MoveOrderer<'a> {
    pub tt_move: Move,
    pub history: &'a [[MoveScore; 64]; 64],
    pub killers: &'a KillerRing,
    pub countermove: Move,
}

impl MoveOrderer<'_> {
    pub fn score(&self, pos: &Position, list: &mut MoveList) {
        for i in 0..list.count() {
            let m = list.get(i).mv;
            let mut score = self.history[m.from_sq() as usize][m.to_sq() as usize];
            if m == self.tt_move {
                score += MS_TT_BONUS;
            }
            if pos.is_capture(m) {
                let victim = if m.move_type() == MoveType::EnPassant {
                    PAWN
                } else {
                    piece_type(pos.board[m.to_sq() as usize])
                };
                let attacker = piece_type(pos.board[m.from_sq() as usize]);
                score += MS_CAPTURE_BONUS_VICTIM[victim as usize]
                    + MS_CAPTURE_BONUS_ATTACKER[attacker as usize];
            } else {
                if m == self.countermove {
                    score += MS_COUNTERMOVE_BONUS;
                }
                if self.killers.contains(m) {
                    score += MS_KILLER_BONUS;
                }
            }
            list.get_mut(i).score = score;
        }
    }
}

/// View of the shared root-search slots used to avoid searching a root
/// move a peer thread is currently on (the ABDADA deferral criterion).
pub struct RootDeferral<'a> {
    pub slots: &'a [RootSlot],
    pub thread_id: usize,
    pub depth: i8,
}

impl RootDeferral<'_> {
    fn is_busy(&self, m: Move) -> bool {
        self.slots.iter().enumerate().any(|(i, slot)| {
            i != self.thread_id
                && slot.depth.load(Ordering::Acquire) == self.depth as i32
                && slot.mv.load(Ordering::Acquire) == m.raw() as u32
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PickPhase {
    TtMove,
    Generate,
    Generated,
    Deferred,
}

pub struct MovePicker {
    phase: PickPhase,
    tt_move: Move,
    list: MoveList,
    deferred: MoveList,
    root: bool,
}

impl MovePicker {
    /// Picker for interior nodes: pseudo-legal supply, legality is checked
    /// lazily when the move is made.
    pub fn new(tt_move: Move) -> Self {
        MovePicker {
            phase: PickPhase::TtMove,
            tt_move,
            list: MoveList::new(),
            deferred: MoveList::new(),
            root: false,
        }
    }

    /// Picker for the root: fully legal supply plus peer deferral.
    pub fn root(tt_move: Move) -> Self {
        MovePicker {
            root: true,
            ..MovePicker::new(tt_move)
        }
    }

    /// Next move in order, or MOVE_NONE when exhausted.
    pub fn next(
        &mut self,
        pos: &mut Position,
        ord: &MoveOrderer,
        defer: Option<&RootDeferral>,
    ) -> Move {
        loop {
            match self.phase {
                PickPhase::TtMove => {
                    self.phase = PickPhase::Generate;
                    if self.tt_move != MOVE_NONE
                        && pos.is_pseudo_legal(self.tt_move)
                        && (!self.root || pos.is_legal(self.tt_move))
                    {
                        return self.tt_move;
                    }
                }
                PickPhase::Generate => {
                    if self.root {
                        pos.generate_legal_moves(&mut self.list);
                    } else {
                        pos.generate_pseudolegal_moves(GenKind::All, &mut self.list);
                    }
                    ord.score(pos, &mut self.list);
                    self.phase = PickPhase::Generated;
                }
                PickPhase::Generated => {
                    let m = self.list.get_next_best();
                    if m == MOVE_NONE {
                        self.phase = PickPhase::Deferred;
                        continue;
                    }
                    if m == self.tt_move {
                        continue;
                    }
                    if let Some(d) = defer {
                        if d.is_busy(m) {
                            self.deferred.add(m);
                            continue;
                        }
                    }
                    return m;
                }
                PickPhase::Deferred => {
                    // Deferred moves return in insertion order.
                    return self.deferred.get_next_best();
                }
            }
        }
    }
}
