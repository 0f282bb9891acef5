//! Per-thread search: iterative deepening with aspiration windows feeding
//! principal-variation search, quiescence over capture sequences, and the
//! quiet-move heuristics (killers, history, countermoves). Each searcher
//! owns a private position copy and ordering tables; only the
//! transposition table, the atomic counters/flags and the root-search
//! slots are shared.

use crate::bitboard::*;
use crate::eval::{
    pt_weight, Score, SCORE_LOSE, SCORE_WIN, SCORE_ZERO,
};
use crate::movegen::GenKind;
use crate::movepick::{KillerRing, MoveOrderer, MovePicker, RootDeferral};
use crate::moves::{Move, MoveList, MoveScore, MOVE_NONE};
use crate::position::{Position, PositionInfo};
use crate::smp::{SearchEvent, SearchProcesser, SearchResults, SharedSearch};
use crate::tt::{score_from_tt, score_to_tt, Bound, TranspositionTable};
use std::sync::Arc;

/// Deepest ply the heuristic tables cover; quiescence tails stay well
/// below this even at the maximum configured depth.
pub const MAX_SEARCH_PLY: usize = 128;

/// Base half-width of the aspiration window.
pub const ASPIRATION_DELTA_BASE: Score = 25;

/// Futility margin for delta pruning in quiescence.
const DELTA_MARGIN: Score = 330;

pub struct Searcher {
    pos: Position,
    thread_id: usize,
    shared: Arc<SharedSearch>,
    tt: Arc<TranspositionTable>,
    /// Ply relative to the search root.
    search_ply: usize,
    /// Table age stamped on every store of this search.
    tt_age: u16,
    /// Moves leading to the current node, for the countermove heuristic.
    prev_moves: [Move; MAX_SEARCH_PLY],
    history: Box<[[MoveScore; 64]; 64]>,
    countermoves: Box<[[Move; 64]; 64]>,
    killers: Vec<KillerRing>,
}

impl Searcher {
    pub fn new(
        pos: Position,
        thread_id: usize,
        shared: Arc<SharedSearch>,
        tt: Arc<TranspositionTable>,
    ) -> Self {
        Searcher {
            pos,
            thread_id,
            shared,
            tt,
            search_ply: 0,
            tt_age: 0,
            prev_moves: [MOVE_NONE; MAX_SEARCH_PLY],
            history: Box::new([[0; 64]; 64]),
            countermoves: Box::new([[MOVE_NONE; 64]; 64]),
            killers: vec![KillerRing::new(); MAX_SEARCH_PLY],
        }
    }

    // ============================================================
    // Move doing/undoing with lazy legality
    // ============================================================

    /// Play a pseudo-legal move if it is legal. On success the ply advances
    /// and the prior state is returned for `undo_move`.
    fn do_move_checked(&mut self, m: Move) -> Option<PositionInfo> {
        let mover = self.pos.turn;
        let prev = self.pos.do_move(m);
        if self.pos.is_attacked(self.pos.king_sq(mover), self.pos.turn) {
            self.pos.undo_move(m, &prev);
            return None;
        }
        self.prev_moves[self.search_ply] = m;
        self.search_ply += 1;
        Some(prev)
    }

    fn undo_move(&mut self, m: Move, prev: &PositionInfo) {
        self.pos.undo_move(m, prev);
        self.search_ply -= 1;
    }

    /// Countermove answering the move that led to this node.
    fn countermove(&self) -> Move {
        if self.search_ply == 0 {
            return MOVE_NONE;
        }
        let pm = self.prev_moves[self.search_ply - 1];
        if pm == MOVE_NONE {
            MOVE_NONE
        } else {
            self.countermoves[pm.from_sq() as usize][pm.to_sq() as usize]
        }
    }

    // ============================================================
    // Static exchange evaluation
    // ============================================================

    /// Value of the best capture sequence on `s` opened by `by`, playing
    /// the least valuable attacker each turn. The position is mutated
    /// temporarily and restored exactly.
    fn see(&mut self, s: Square, by: Color) -> Score {
        let Some(from) = self.pos.least_attacker(s, by) else {
            return SCORE_ZERO;
        };
        let capt = self.pos.board[s as usize];
        debug_assert_ne!(capt, NO_PIECE);
        let (c, pt) = (piece_color(capt).unwrap(), piece_type(capt));
        self.pos.remove_piece(s);
        self.pos.move_piece(from, s);
        let value = SCORE_ZERO.max(pt_weight(pt) - self.see(s, by.flip()));
        self.pos.move_piece(s, from);
        self.pos.put_piece(s, c, pt);
        value
    }

    /// Exchange value of the specific capture `from`x`to` by `by`. Unlike
    /// `see` the opening capture is forced, so the result may be negative.
    pub fn see_capture(&mut self, from: Square, to: Square, by: Color) -> Score {
        let capt = self.pos.board[to as usize];
        debug_assert_ne!(capt, NO_PIECE);
        let (c, pt) = (piece_color(capt).unwrap(), piece_type(capt));
        self.pos.remove_piece(to);
        self.pos.move_piece(from, to);
        let value = pt_weight(pt) - self.see(to, by.flip());
        self.pos.move_piece(to, from);
        self.pos.put_piece(to, c, pt);
        value
    }

    // ============================================================
    // Quiescence
    // ============================================================

    /// Depth-0 extension over capturing sequences (all evasions in check)
    /// to settle the static score.
    fn quiescence(&mut self, mut alpha: Score, beta: Score) -> Score {
        self.shared.count_node();
        let in_check = self.pos.is_in_check();
        let stand_pat = self.pos.evaluate();
        if stand_pat >= beta {
            return beta;
        }
        if alpha < stand_pat {
            alpha = stand_pat;
        }

        let mut list = MoveList::new();
        self.pos.generate_pseudolegal_moves(GenKind::Captures, &mut list);
        if list.is_empty() {
            return if in_check {
                SCORE_LOSE + self.search_ply as Score
            } else {
                stand_pat
            };
        }
        let ord = MoveOrderer {
            tt_move: MOVE_NONE,
            history: &self.history,
            killers: &self.killers[self.search_ply],
            countermove: self.countermove(),
        };
        ord.score(&self.pos, &mut list);
        list.sort();

        let mut any_legal = false;
        for i in 0..list.count() {
            let m = list.get(i).mv;
            let us = self.pos.turn;
            let victim = piece_type(self.pos.board[m.to_sq() as usize]);
            let mut prune = false;
            // Delta-prune captures that cannot lift alpha even with margin.
            if stand_pat + pt_weight(victim) + DELTA_MARGIN < alpha {
                prune = true;
            } else if victim != PT_NONE && self.see_capture(m.from_sq(), m.to_sq(), us) < SCORE_ZERO
            {
                // Losing exchanges are not worth extending.
                prune = true;
            }
            let Some(prev) = self.do_move_checked(m) else {
                continue;
            };
            any_legal = true;
            if prune {
                self.undo_move(m, &prev);
                continue;
            }
            let score = -self.quiescence(-beta, -alpha);
            self.undo_move(m, &prev);
            if self.shared.should_stop() {
                return SCORE_ZERO;
            }
            if score > alpha {
                alpha = score;
                if alpha >= beta {
                    break;
                }
            }
        }
        if any_legal {
            alpha
        } else if in_check {
            SCORE_LOSE + self.search_ply as Score
        } else {
            stand_pat
        }
    }

    // ============================================================
    // Principal variation search
    // ============================================================

    fn pvs(&mut self, depth: i8, mut alpha: Score, mut beta: Score) -> Score {
        self.shared.check_time();
        if depth == 0 {
            return self.quiescence(alpha, beta);
        }
        self.shared.count_node();
        if self.pos.info.rule50 >= 100 {
            return SCORE_ZERO;
        }

        let old_alpha = alpha;
        let key = self.pos.zobrist_key();
        let mut tt_move = MOVE_NONE;
        if let Some(entry) = self.tt.probe(key) {
            if entry.depth >= depth {
                let tt_score = score_from_tt(entry.score, self.search_ply as i32);
                if entry.bound.is_lower() && tt_score > alpha {
                    alpha = tt_score;
                }
                if entry.bound.is_upper() && tt_score < beta {
                    beta = tt_score;
                }
                if alpha >= beta {
                    return alpha;
                }
            }
            // Even when the entry cannot cut, its move seeds ordering.
            tt_move = entry.mv;
            self.shared.count_tt_hit();
        }

        let counter = self.countermove();
        let mut picker = MovePicker::new(tt_move);
        let mut best_score = SCORE_LOSE;
        let mut best_move = MOVE_NONE;
        let mut any_legal = false;
        let mut pv_search = true;
        loop {
            let m = {
                let ord = MoveOrderer {
                    tt_move,
                    history: &self.history,
                    killers: &self.killers[self.search_ply],
                    countermove: counter,
                };
                picker.next(&mut self.pos, &ord, None)
            };
            if m == MOVE_NONE {
                break;
            }
            let Some(prev) = self.do_move_checked(m) else {
                continue;
            };
            any_legal = true;
            let score;
            if pv_search {
                score = -self.pvs(depth - 1, -beta, -alpha);
            } else {
                let mut s = -self.pvs(depth - 1, -alpha - 1, -alpha);
                if !self.shared.should_stop() && beta > s && s > alpha {
                    s = -self.pvs(depth - 1, -beta, -s);
                }
                score = s;
            }
            self.undo_move(m, &prev);
            if self.shared.should_stop() {
                return SCORE_ZERO;
            }
            if score > best_score {
                pv_search = false;
                best_score = score;
                best_move = m;
                if score > alpha {
                    alpha = score;
                    if alpha >= beta {
                        if !self.pos.is_capture(m) {
                            self.killers[self.search_ply].push_front(m);
                            self.history[m.from_sq() as usize][m.to_sq() as usize] +=
                                depth as MoveScore * depth as MoveScore;
                            if self.search_ply > 0 {
                                let pm = self.prev_moves[self.search_ply - 1];
                                if pm != MOVE_NONE {
                                    self.countermoves[pm.from_sq() as usize]
                                        [pm.to_sq() as usize] = m;
                                }
                            }
                        }
                        break;
                    }
                }
            }
        }

        if !any_legal {
            return if self.pos.is_in_check() {
                SCORE_LOSE + self.search_ply as Score
            } else {
                SCORE_ZERO
            };
        }
        let bound = if alpha == old_alpha {
            Bound::Upper
        } else if alpha < beta {
            Bound::Exact
        } else {
            Bound::Lower
        };
        self.tt.store(
            key,
            depth,
            bound,
            score_to_tt(best_score, self.search_ply as i32),
            best_move,
            self.tt_age,
        );
        alpha
    }

    // ============================================================
    // Iterative deepening
    // ============================================================

    fn publish_root(&self, depth: i8, m: Move) {
        let slot = &self.shared.root_slots[self.thread_id];
        slot.depth
            .store(depth as i32, std::sync::atomic::Ordering::Release);
        slot.mv
            .store(m.raw() as u32, std::sync::atomic::Ordering::Release);
    }

    fn clear_root_slot(&self) {
        self.shared.root_slots[self.thread_id]
            .mv
            .store(MOVE_NONE.raw() as u32, std::sync::atomic::Ordering::Release);
    }

    /// Top-level iterative deepening with aspiration windows. Thread 0
    /// emits an INFO event after each completed iteration. Returns the last
    /// fully completed iteration's result.
    pub fn id_search(&mut self, depth: i8, processer: Option<&SearchProcesser>) -> SearchResults {
        for k in self.killers.iter_mut() {
            k.clear();
        }
        self.search_ply = 0;
        self.tt_age = self.tt.age();
        let mut best_move = MOVE_NONE;
        let mut best_score: Score = SCORE_ZERO;
        let mut result = SearchResults::default();

        'deepening: for search_depth in 1..=depth.max(1) {
            let mut cur_best_score = best_score;
            let mut cur_best_move = best_move;
            // Skew the window per thread so lazy-SMP peers diverge.
            let mut delta = ASPIRATION_DELTA_BASE + 7 * self.thread_id as Score;
            let mut alpha = (cur_best_score - delta).max(SCORE_LOSE);
            let mut beta = (cur_best_score + delta).min(SCORE_WIN);

            loop {
                let mut picker = MovePicker::root(cur_best_move);
                cur_best_score = alpha;
                let mut pv_search = true;
                let mut any_root_move = false;
                loop {
                    let m = {
                        let ord = MoveOrderer {
                            tt_move: cur_best_move,
                            history: &self.history,
                            killers: &self.killers[0],
                            countermove: MOVE_NONE,
                        };
                        let defer = RootDeferral {
                            slots: &self.shared.root_slots,
                            thread_id: self.thread_id,
                            depth: search_depth,
                        };
                        picker.next(&mut self.pos, &ord, Some(&defer))
                    };
                    if m == MOVE_NONE {
                        break;
                    }
                    any_root_move = true;
                    self.publish_root(search_depth, m);
                    let Some(prev) = self.do_move_checked(m) else {
                        continue;
                    };
                    let score;
                    if pv_search {
                        score = -self.pvs(search_depth - 1, -beta, -cur_best_score);
                    } else {
                        let mut s =
                            -self.pvs(search_depth - 1, -cur_best_score - 1, -cur_best_score);
                        if !self.shared.should_stop() && beta > s && s > cur_best_score {
                            s = -self.pvs(search_depth - 1, -beta, -s);
                        }
                        score = s;
                    }
                    self.undo_move(m, &prev);
                    self.clear_root_slot();
                    if self.shared.should_stop() {
                        break;
                    }
                    if score > cur_best_score {
                        pv_search = false;
                        cur_best_score = score;
                        cur_best_move = m;
                        if cur_best_score >= beta {
                            break;
                        }
                    }
                }
                if !any_root_move {
                    // Mated or stalemated root; nothing deeper to learn.
                    let score = if self.pos.is_in_check() { SCORE_LOSE } else { SCORE_ZERO };
                    result = SearchResults {
                        best_move: MOVE_NONE,
                        score,
                        depth: search_depth,
                    };
                    break 'deepening;
                }
                if self.shared.should_stop() {
                    break 'deepening;
                }
                // A score strictly inside the window is final for this depth.
                if alpha < cur_best_score && cur_best_score < beta {
                    break;
                }
                delta <<= 1;
                alpha = (cur_best_score - delta).max(SCORE_LOSE);
                beta = (cur_best_score + delta).min(SCORE_WIN);
            }

            // Accept the iteration only if it ran to completion.
            best_move = cur_best_move;
            best_score = cur_best_score;
            result = SearchResults {
                best_move,
                score: best_score,
                depth: search_depth,
            };
            if best_move != MOVE_NONE && !self.pos.is_capture(best_move) {
                self.killers[0].push_front(best_move);
                self.history[best_move.from_sq() as usize][best_move.to_sq() as usize] +=
                    search_depth as MoveScore * search_depth as MoveScore;
            }
            if self.thread_id == 0 {
                if let Some(p) = processer {
                    (p.as_ref())(&SearchEvent::Info {
                        results: result,
                        stats: self.shared.stats(),
                    });
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::SCORE_WIN_MIN;
    use crate::smp::SearchOptions;

    fn setup() {
        crate::init();
    }

    fn searcher_for(fen: &str, threads: usize) -> Searcher {
        let mut pos = Position::new();
        pos.load_fen(fen, false).unwrap();
        let shared = SharedSearch::new(&SearchOptions {
            time_limit_ms: 60_000,
            thread_count: threads,
            search_depth: 10,
        });
        let tt = Arc::new(TranspositionTable::new(16));
        Searcher::new(pos, 0, shared, tt)
    }

    #[test]
    fn test_see_capture_undefended_pawn() {
        setup();
        let mut s = searcher_for("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1", 1);
        assert_eq!(s.see_capture(sq::E4, sq::D5, Color::White), pt_weight(PAWN));
    }

    #[test]
    fn test_see_capture_knight_bystander() {
        setup();
        // The d6 knight does not cover d5, so the capture wins a clean pawn
        // and can never be worse than an even exchange.
        let mut s = searcher_for("4k3/8/3n4/3p4/4P3/8/8/4K3 w - - 0 1", 1);
        let v = s.see_capture(sq::E4, sq::D5, Color::White);
        assert!(v >= pt_weight(PAWN) - pt_weight(PAWN));
        assert_eq!(v, pt_weight(PAWN));
    }

    #[test]
    fn test_see_capture_defended_pawn_even() {
        setup();
        // d5 defended by the e6 pawn: PxP, pxP is dead even.
        let mut s = searcher_for("4k3/8/4p3/3p4/4P3/8/8/4K3 w - - 0 1", 1);
        assert_eq!(s.see_capture(sq::E4, sq::D5, Color::White), 0);
    }

    #[test]
    fn test_see_capture_losing_for_heavy_attacker() {
        setup();
        // Queen takes a pawn defended by a pawn: loses material.
        let mut s = searcher_for("4k3/8/4p3/3p4/8/8/8/3QK3 w - - 0 1", 1);
        assert!(s.see_capture(sq::D1, sq::D5, Color::White) < 0);
    }

    #[test]
    fn test_see_restores_position_exactly() {
        setup();
        let fen = "4k3/8/4p3/3p4/4P3/8/8/3QK3 w - - 0 1";
        let mut s = searcher_for(fen, 1);
        let snapshot = s.pos.clone();
        s.see_capture(sq::E4, sq::D5, Color::White);
        assert_eq!(s.pos, snapshot);
        assert_eq!(s.pos.info.key, s.pos.compute_key());
    }

    #[test]
    fn test_mate_in_one_recognition() {
        setup();
        let mut s = searcher_for("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 1);
        let result = s.id_search(4, None);
        assert_eq!(result.best_move, Move::new(sq::A1, sq::A8));
        assert!(
            result.score >= SCORE_WIN_MIN,
            "mate score expected, got {}",
            result.score
        );
    }

    #[test]
    fn test_mate_in_two_back_rank() {
        setup();
        // 1. Re8+ Rxe8 2. Qxe8#
        let mut s = searcher_for("3r2k1/5ppp/8/8/8/8/4RPPP/4Q1K1 w - - 0 1", 1);
        let result = s.id_search(6, None);
        assert!(result.score >= SCORE_WIN_MIN, "got {}", result.score);
        assert_eq!(result.best_move, Move::new(sq::E2, sq::E8));
    }

    #[test]
    fn test_search_is_deterministic_single_thread() {
        setup();
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
        let mut a = searcher_for(fen, 1);
        let ra = a.id_search(5, None);
        let mut b = searcher_for(fen, 1);
        let rb = b.id_search(5, None);
        assert_eq!(ra.best_move, rb.best_move);
        assert_eq!(ra.score, rb.score);
        assert_eq!(ra.depth, rb.depth);
    }

    #[test]
    fn test_search_avoids_hanging_queen() {
        setup();
        // White queen en prise on h5; depth 3 is plenty to notice.
        let mut s = searcher_for("rnb1kbnr/pppp1ppp/8/4p2q/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 3", 1);
        let result = s.id_search(3, None);
        assert_ne!(result.best_move, MOVE_NONE);
    }

    #[test]
    fn test_mated_root_reports_lose() {
        setup();
        // Fool's mate delivered: White to move has no legal moves.
        let mut s = searcher_for(
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
            1,
        );
        let result = s.id_search(4, None);
        assert_eq!(result.best_move, MOVE_NONE);
        assert_eq!(result.score, SCORE_LOSE);
    }

    #[test]
    fn test_stalemate_root_reports_zero() {
        setup();
        let mut s = searcher_for("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 1);
        let result = s.id_search(4, None);
        assert_eq!(result.best_move, MOVE_NONE);
        assert_eq!(result.score, SCORE_ZERO);
    }

    #[test]
    fn test_deeper_search_does_not_worsen_mate_score(){
        setup();
        let fen = "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1";
        let mut s4 = searcher_for(fen, 1);
        let r4 = s4.id_search(4, None);
        let mut s6 = searcher_for(fen, 1);
        let r6 = s6.id_search(6, None);
        assert!(r6.score >= SCORE_WIN_MIN);
        assert_eq!(r4.best_move, r6.best_move);
    }
}
