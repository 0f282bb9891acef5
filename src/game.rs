//! Game facade: owns the stable position, the search coordinator, the
//! played-move history and the repetition bookkeeping, and classifies the
//! game state after every change. While a search runs, every mutating
//! operation is rejected with `EngineBusy`.

use crate::bitboard::*;
use crate::errors::{EngineError, OptionError};
use crate::moves::{Move, MoveList};
use crate::notation::{self, MoveFormat, MOVE_FORMAT_CNT};
use crate::position::{Position, PositionInfo};
use crate::smp::{
    MultiSearcher, SearchOptions, SearchProcesser, SearchResults, SearchStats,
    SEARCH_DEPTH_MAX, SEARCH_DEPTH_MIN, TIME_LIMIT_MAX, TIME_LIMIT_MIN,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Active,
    WhiteWin,
    BlackWin,
    Draw,
}

/// Why a game is drawn; meaningful only when the state is `Draw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCause {
    Rule50,
    Material,
    ThreefoldRepetition,
    Stalemate,
}

/// One played move: enough to undo it and to dump the game in any format.
struct GameRecord {
    mv: Move,
    prev: PositionInfo,
    text: [String; MOVE_FORMAT_CNT],
}

pub struct Game {
    pos: Position,
    searcher: MultiSearcher,
    options: SearchOptions,
    state: GameState,
    draw_cause: Option<DrawCause>,
    history: Vec<GameRecord>,
    /// Reduced-FEN occurrence counts for threefold-repetition detection.
    repeats: HashMap<String, u32>,
}

impl Game {
    pub fn new() -> Self {
        crate::init();
        let mut game = Game {
            pos: Position::start_position(),
            searcher: MultiSearcher::new(),
            options: SearchOptions::default(),
            state: GameState::Active,
            draw_cause: None,
            history: Vec::new(),
            repeats: HashMap::new(),
        };
        game.seed_repeats();
        game.update_game_state();
        game
    }

    fn busy_check(&self) -> Result<(), EngineError> {
        if self.searcher.is_in_search() {
            Err(EngineError::EngineBusy)
        } else {
            Ok(())
        }
    }

    fn seed_repeats(&mut self) {
        self.repeats.clear();
        self.repeats.insert(self.pos.write_fen(true), 1);
    }

    // ============================================================
    // Accessors
    // ============================================================

    #[inline]
    pub fn position(&self) -> &Position {
        &self.pos
    }

    #[inline]
    pub fn game_state(&self) -> GameState {
        self.state
    }

    #[inline]
    pub fn draw_cause(&self) -> Option<DrawCause> {
        self.draw_cause
    }

    #[inline]
    pub fn is_in_search(&self) -> bool {
        self.searcher.is_in_search()
    }

    #[inline]
    pub fn search_options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn max_thread_count(&self) -> usize {
        self.searcher.max_thread_count()
    }

    // ============================================================
    // Position setup
    // ============================================================

    /// Back to the standard opening position. An in-flight search must be
    /// ended explicitly first.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.busy_check()?;
        self.pos.reset();
        self.history.clear();
        self.seed_repeats();
        self.update_game_state();
        Ok(())
    }

    pub fn load_fen(&mut self, fen: &str, omit_counters: bool) -> Result<(), EngineError> {
        self.busy_check()?;
        self.pos.load_fen(fen, omit_counters)?;
        self.history.clear();
        self.seed_repeats();
        self.update_game_state();
        Ok(())
    }

    pub fn write_fen(&self, omit_counters: bool) -> String {
        self.pos.write_fen(omit_counters)
    }

    // ============================================================
    // Doing and undoing moves
    // ============================================================

    /// Play a move after validating it against the legal move set.
    pub fn do_move(&mut self, m: Move) -> Result<(), EngineError> {
        self.busy_check()?;
        let mut legal = MoveList::new();
        self.pos.generate_legal_moves_ex(&mut legal);
        if !legal.contains(m) {
            return Err(EngineError::IllegalMove(m.to_uci()));
        }
        // Render every text form against the pre-move position.
        let text = [
            notation::move_to_an(m),
            notation::move_to_san(&mut self.pos, m)?,
            m.to_uci(),
        ];
        let prev = self.pos.do_move(m);
        *self.repeats.entry(self.pos.write_fen(true)).or_insert(0) += 1;
        self.history.push(GameRecord { mv: m, prev, text });
        self.update_game_state();
        Ok(())
    }

    /// Play a move given in AN, SAN or UCI text.
    pub fn do_move_text(&mut self, text: &str, fmt: MoveFormat) -> Result<(), EngineError> {
        self.busy_check()?;
        let m = notation::move_from_text(&mut self.pos, text, fmt)?;
        self.do_move(m)
    }

    /// Take back the last played move. Returns false at the start state.
    pub fn undo_move(&mut self) -> Result<bool, EngineError> {
        self.busy_check()?;
        let Some(record) = self.history.pop() else {
            return Ok(false);
        };
        let fen = self.pos.write_fen(true);
        if let Some(count) = self.repeats.get_mut(&fen) {
            *count -= 1;
            if *count == 0 {
                self.repeats.remove(&fen);
            }
        }
        self.pos.undo_move(record.mv, &record.prev);
        self.update_game_state();
        Ok(true)
    }

    pub fn perft(&mut self, depth: u32) -> Result<u64, EngineError> {
        self.busy_check()?;
        Ok(self.pos.perft(depth))
    }

    // ============================================================
    // Game state classification
    // ============================================================

    /// Whether neither side retains mating material: K vs K, K+minor vs K,
    /// or K+B vs K+B with same-colored bishops.
    fn draw_by_material(&self) -> bool {
        let count =
            |c: Color, pt: PieceType| self.pos.piece_count[c.index()][pt as usize];
        let total_w = count(Color::White, PT_ALL);
        let total_b = count(Color::Black, PT_ALL);
        if total_w > 2 || total_b > 2 {
            return false;
        }
        if total_w == 1 && total_b == 1 {
            return true;
        }
        for side in [Color::White, Color::Black] {
            if count(side.flip(), PT_ALL) == 1
                && (count(side, BISHOP) == 1 || count(side, KNIGHT) == 1)
            {
                return true;
            }
        }
        if count(Color::White, BISHOP) == 1 && count(Color::Black, BISHOP) == 1 {
            let wb = self.pos.piece_sq[Color::White.index()][BISHOP as usize][0];
            let bb = self.pos.piece_sq[Color::Black.index()][BISHOP as usize][0];
            let square_color = |s: Square| (rank_of(s) + file_of(s)) & 1;
            return square_color(wb) == square_color(bb);
        }
        false
    }

    fn threefold_repetition(&self) -> bool {
        self.repeats
            .get(&self.pos.write_fen(true))
            .is_some_and(|&n| n >= 3)
    }

    /// Classify the position into active / win / draw with a cause.
    pub fn update_game_state(&mut self) {
        if self.searcher.is_in_search() {
            return;
        }
        let mut legal = MoveList::new();
        self.pos.generate_legal_moves(&mut legal);
        self.draw_cause = None;
        if legal.is_empty() {
            if self.pos.is_in_check() {
                self.state = if self.pos.turn == Color::White {
                    GameState::BlackWin
                } else {
                    GameState::WhiteWin
                };
            } else {
                self.state = GameState::Draw;
                self.draw_cause = Some(DrawCause::Stalemate);
            }
        } else if self.pos.info.rule50 >= 100 {
            self.state = GameState::Draw;
            self.draw_cause = Some(DrawCause::Rule50);
        } else if self.draw_by_material() {
            self.state = GameState::Draw;
            self.draw_cause = Some(DrawCause::Material);
        } else if self.threefold_repetition() {
            self.state = GameState::Draw;
            self.draw_cause = Some(DrawCause::ThreefoldRepetition);
        } else {
            self.state = GameState::Active;
        }
    }

    // ============================================================
    // Search plumbing
    // ============================================================

    pub fn set_search_processer(&mut self, processer: SearchProcesser) {
        self.searcher.set_processer(processer);
    }

    pub fn set_search_options(&mut self, options: SearchOptions) -> Result<(), EngineError> {
        self.busy_check()?;
        self.options = SearchOptions {
            time_limit_ms: clamp_with_warning(
                "TimeLimit",
                options.time_limit_ms,
                TIME_LIMIT_MIN,
                TIME_LIMIT_MAX,
            ),
            thread_count: clamp_with_warning(
                "ThreadCount",
                options.thread_count,
                1,
                self.max_thread_count(),
            ),
            search_depth: clamp_with_warning(
                "SearchDepth",
                options.search_depth,
                SEARCH_DEPTH_MIN,
                SEARCH_DEPTH_MAX,
            ),
        };
        Ok(())
    }

    /// Set a named option. Unknown names and non-numeric values fail;
    /// out-of-range values are clamped with a warning.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.busy_check()?;
        match name {
            "TimeLimit" => {
                let v: u64 = parse_option(name, value)?;
                self.options.time_limit_ms =
                    clamp_with_warning(name, v, TIME_LIMIT_MIN, TIME_LIMIT_MAX);
            }
            "ThreadCount" => {
                let v: usize = parse_option(name, value)?;
                self.options.thread_count =
                    clamp_with_warning(name, v, 1, self.max_thread_count());
            }
            "SearchDepth" => {
                let v: i64 = parse_option(name, value)?;
                self.options.search_depth = clamp_with_warning(
                    name,
                    v,
                    SEARCH_DEPTH_MIN as i64,
                    SEARCH_DEPTH_MAX as i64,
                ) as i8;
            }
            _ => return Err(OptionError::UnknownOption(name.to_string()).into()),
        }
        Ok(())
    }

    /// Hand a snapshot of the position to the coordinator and return
    /// immediately; results arrive through events and `end_search`.
    pub fn start_search(&mut self) -> Result<(), EngineError> {
        self.searcher.start_search(&self.pos, &self.options)
    }

    /// Stop a running search (if any) and collect the best results.
    pub fn end_search(&mut self) -> (SearchResults, SearchStats) {
        let results = self.searcher.end_search();
        self.update_game_state();
        results
    }

    // ============================================================
    // Game files
    // ============================================================

    /// Load a whole game from text: `<n>. <white> <black>` per move pair.
    /// Replaces the current game; stops at mate or draw.
    pub fn load_game(&mut self, text: &str, fmt: MoveFormat) -> Result<(), EngineError> {
        self.busy_check()?;
        self.reset()?;
        let mut tokens = text.split_whitespace();
        loop {
            let expected = (self.pos.game_ply / 2 + 1) as u32;
            let token = if self.pos.turn == Color::White {
                let Some(number) = tokens.next() else {
                    break;
                };
                if number != format!("{expected}.") {
                    return Err(crate::errors::ParseError::BadMoveNumber(expected).into());
                }
                match tokens.next() {
                    Some(t) => t,
                    None => break,
                }
            } else {
                match tokens.next() {
                    Some(t) => t,
                    None => break,
                }
            };
            self.do_move_text(token, fmt)?;
            if self.state != GameState::Active {
                break;
            }
        }
        Ok(())
    }

    /// Dump the played moves as `<n>. <white> <black>` lines.
    pub fn write_game(&self, fmt: MoveFormat) -> String {
        let mut out = String::new();
        for (ply, record) in self.history.iter().enumerate() {
            if ply % 2 == 0 {
                if ply > 0 {
                    out.push('\n');
                }
                out.push_str(&format!("{}.", ply / 2 + 1));
            }
            out.push(' ');
            out.push_str(&record.text[fmt as usize]);
        }
        if !self.history.is_empty() {
            out.push('\n');
        }
        out
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_option<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, OptionError> {
    value
        .parse()
        .map_err(|_| OptionError::NotANumber(name.to_string(), value.to_string()))
}

fn clamp_with_warning<T: PartialOrd + Copy + std::fmt::Display>(
    name: &str,
    value: T,
    min: T,
    max: T,
) -> T {
    if value < min {
        log::warn!("option {name}={value} below minimum, clamped to {min}");
        min
    } else if value > max {
        log::warn!("option {name}={value} above maximum, clamped to {max}");
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::MOVE_NONE;

    #[test]
    fn test_new_game_is_active() {
        let game = Game::new();
        assert_eq!(game.game_state(), GameState::Active);
        assert_eq!(game.draw_cause(), None);
        assert!(!game.is_in_search());
    }

    #[test]
    fn test_do_move_in_all_formats() {
        let mut game = Game::new();
        game.do_move_text("e2-e4", MoveFormat::An).unwrap();
        game.do_move_text("e5", MoveFormat::San).unwrap();
        game.do_move_text("g1f3", MoveFormat::Uci).unwrap();
        assert_eq!(
            game.write_fen(false),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut game = Game::new();
        assert!(matches!(
            game.do_move(Move::new(sq::E2, sq::E5)),
            Err(EngineError::IllegalMove(_))
        ));
        assert!(matches!(
            game.do_move_text("Ke2", MoveFormat::San),
            Err(EngineError::IllegalMove(_))
        ));
    }

    #[test]
    fn test_undo_move() {
        let mut game = Game::new();
        let start = game.write_fen(false);
        game.do_move_text("e4", MoveFormat::San).unwrap();
        assert!(game.undo_move().unwrap());
        assert_eq!(game.write_fen(false), start);
        assert!(!game.undo_move().unwrap(), "nothing left to undo");
    }

    #[test]
    fn test_checkmate_classification() {
        let mut game = Game::new();
        for m in ["f3", "e5", "g4", "Qh4#"] {
            game.do_move_text(m, MoveFormat::San).unwrap();
        }
        assert_eq!(game.game_state(), GameState::BlackWin);
    }

    #[test]
    fn test_stalemate_detection() {
        let mut game = Game::new();
        game.load_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
        assert_eq!(game.game_state(), GameState::Draw);
        assert_eq!(game.draw_cause(), Some(DrawCause::Stalemate));
    }

    #[test]
    fn test_threefold_repetition() {
        let mut game = Game::new();
        let shuffle = ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1", "Ng8"];
        for (i, m) in shuffle.iter().enumerate() {
            game.do_move_text(m, MoveFormat::San).unwrap();
            if i < shuffle.len() - 1 {
                assert_eq!(game.game_state(), GameState::Active, "premature draw at {m}");
            }
        }
        assert_eq!(game.game_state(), GameState::Draw);
        assert_eq!(game.draw_cause(), Some(DrawCause::ThreefoldRepetition));
        // Undoing the repetition revives the game.
        game.undo_move().unwrap();
        assert_eq!(game.game_state(), GameState::Active);
    }

    #[test]
    fn test_rule50_draw() {
        let mut game = Game::new();
        game.load_fen("4k3/8/8/8/8/8/4R3/4K3 w - - 99 80", false).unwrap();
        assert_eq!(game.game_state(), GameState::Active);
        game.do_move_text("Ra2", MoveFormat::San).unwrap();
        assert_eq!(game.game_state(), GameState::Draw);
        assert_eq!(game.draw_cause(), Some(DrawCause::Rule50));
    }

    #[test]
    fn test_material_draws() {
        let mut game = Game::new();
        game.load_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1", false).unwrap();
        assert_eq!(game.draw_cause(), Some(DrawCause::Material));

        game.load_fen("4k3/8/8/8/8/8/8/3NK3 w - - 0 1", false).unwrap();
        assert_eq!(game.draw_cause(), Some(DrawCause::Material));

        // Same-colored bishops (both on light squares).
        game.load_fen("3bk3/8/8/8/8/8/8/2B1K3 w - - 0 1", false).unwrap();
        assert_eq!(game.draw_cause(), Some(DrawCause::Material));

        // Opposite-colored bishops are not an automatic draw here.
        game.load_fen("2b1k3/8/8/8/8/8/8/2B1K3 w - - 0 1", false).unwrap();
        assert_eq!(game.game_state(), GameState::Active);

        // A rook is mating material.
        game.load_fen("4k3/8/8/8/8/8/8/3RK3 w - - 0 1", false).unwrap();
        assert_eq!(game.game_state(), GameState::Active);
    }

    #[test]
    fn test_option_clamping_and_errors() {
        let mut game = Game::new();
        game.set_option("TimeLimit", "50").unwrap();
        assert_eq!(game.search_options().time_limit_ms, TIME_LIMIT_MIN);
        game.set_option("TimeLimit", "2000000").unwrap();
        assert_eq!(game.search_options().time_limit_ms, TIME_LIMIT_MAX);
        game.set_option("SearchDepth", "7").unwrap();
        assert_eq!(game.search_options().search_depth, 7);
        game.set_option("SearchDepth", "99").unwrap();
        assert_eq!(game.search_options().search_depth, SEARCH_DEPTH_MAX);
        game.set_option("ThreadCount", "1").unwrap();
        assert_eq!(game.search_options().thread_count, 1);

        assert!(matches!(
            game.set_option("Ponder", "true"),
            Err(EngineError::Option(OptionError::UnknownOption(_)))
        ));
        assert!(matches!(
            game.set_option("TimeLimit", "fast"),
            Err(EngineError::Option(OptionError::NotANumber(_, _)))
        ));
    }

    #[test]
    fn test_mutations_rejected_during_search() {
        let mut game = Game::new();
        game.set_option("TimeLimit", "60000").unwrap();
        game.set_option("SearchDepth", "40").unwrap();
        game.set_option("ThreadCount", "1").unwrap();
        game.start_search().unwrap();
        assert!(game.is_in_search());
        // Give the search thread time to complete at least one iteration.
        std::thread::sleep(std::time::Duration::from_millis(100));

        assert!(matches!(game.do_move_text("e4", MoveFormat::San), Err(EngineError::EngineBusy)));
        assert!(matches!(game.undo_move(), Err(EngineError::EngineBusy)));
        assert!(matches!(game.reset(), Err(EngineError::EngineBusy)));
        assert!(matches!(
            game.load_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false),
            Err(EngineError::EngineBusy)
        ));
        assert!(matches!(
            game.set_option("SearchDepth", "5"),
            Err(EngineError::EngineBusy)
        ));
        assert!(matches!(game.perft(2), Err(EngineError::EngineBusy)));
        assert!(matches!(game.start_search(), Err(EngineError::Concurrency)));

        let (results, _) = game.end_search();
        assert!(!game.is_in_search());
        assert!(results.depth >= 1);
        // After the search the facade accepts moves again.
        game.do_move(results.best_move).unwrap();
    }

    #[test]
    fn test_search_finds_mate_through_facade() {
        use crate::smp::SearchEvent;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let mut game = Game::new();
        game.load_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", false).unwrap();
        game.set_option("SearchDepth", "4").unwrap();
        game.set_option("ThreadCount", "1").unwrap();
        game.set_option("TimeLimit", "60000").unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        game.set_search_processer(Arc::new(move |e: &SearchEvent| {
            if matches!(e, SearchEvent::Finished { .. }) {
                flag.store(true, Ordering::SeqCst);
            }
        }));
        game.start_search().unwrap();
        while !finished.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (results, stats) = game.end_search();
        assert_eq!(results.best_move, Move::new(sq::A1, sq::A8));
        assert_eq!(results.depth, 4);
        assert!(stats.visited_nodes > 0);
    }

    #[test]
    fn test_game_file_roundtrip() {
        let mut game = Game::new();
        for m in ["e4", "e5", "Nf3", "Nc6", "Bb5"] {
            game.do_move_text(m, MoveFormat::San).unwrap();
        }
        let dump = game.write_game(MoveFormat::San);
        assert_eq!(dump, "1. e4 e5\n2. Nf3 Nc6\n3. Bb5\n");

        let mut replay = Game::new();
        replay.load_game(&dump, MoveFormat::San).unwrap();
        assert_eq!(replay.write_fen(false), game.write_fen(false));
        assert_eq!(replay.write_game(MoveFormat::San), dump);
    }

    #[test]
    fn test_game_file_bad_move_number() {
        let mut game = Game::new();
        assert!(matches!(
            game.load_game("2. e4 e5", MoveFormat::San),
            Err(EngineError::Parse(crate::errors::ParseError::BadMoveNumber(1)))
        ));
    }

    #[test]
    fn test_game_dump_other_formats() {
        let mut game = Game::new();
        game.do_move_text("e4", MoveFormat::San).unwrap();
        game.do_move_text("e5", MoveFormat::San).unwrap();
        assert_eq!(game.write_game(MoveFormat::Uci), "1. e2e4 e7e5\n");
        assert_eq!(game.write_game(MoveFormat::An), "1. e2-e4 e7-e5\n");
    }

    #[test]
    fn test_end_search_without_start() {
        let mut game = Game::new();
        let (results, stats) = game.end_search();
        assert_eq!(results.best_move, MOVE_NONE);
        assert_eq!(stats.visited_nodes, 0);
    }
}
