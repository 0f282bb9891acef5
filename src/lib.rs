//! Chess engine core: bitboard position representation with magic-bitboard
//! attack tables, legal/pseudo-legal move generation, and a multi-threaded
//! iterative-deepening PVS search sharing a bucketed transposition table.

pub mod attacks;
pub mod bitboard;
pub mod errors;
pub mod eval;
pub mod game;
pub mod movegen;
pub mod movepick;
pub mod moves;
pub mod notation;
pub mod position;
pub mod search;
pub mod smp;
pub mod tt;
pub mod zobrist;

pub use bitboard::{Color, Piece, PieceType, Square};
pub use errors::{EngineError, OptionError, ParseError};
pub use game::{DrawCause, Game, GameState};
pub use moves::{Move, MoveList};
pub use notation::MoveFormat;
pub use position::Position;
pub use smp::{SearchEvent, SearchOptions, SearchProcesser, SearchResults, SearchStats};

/// One-time initialization of the process-wide read-only tables (attack
/// and magic tables, Zobrist keys, piece-square values). Idempotent; must
/// run before any engine object is used. `Game::new` calls it itself.
pub fn init() {
    attacks::init();
    zobrist::init();
    eval::init();
}
