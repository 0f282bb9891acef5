//! Failure values raised at the API boundaries. Parsing and engine
//! operations return these instead of panicking; errors inside a search are
//! recovered locally and never surface here.

use thiserror::Error;

/// Malformed FEN or move text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("missing rank delimiter")]
    MissingRankDelimiter,
    #[error("rank {0} does not describe exactly 8 files")]
    BadRankWidth(u8),
    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),
    #[error("pawn on back rank")]
    PawnOnBackRank,
    #[error("each side must have exactly one king")]
    KingCount,
    #[error("invalid side to move '{0}'")]
    InvalidSideToMove(String),
    #[error("invalid castling availability '{0}'")]
    InvalidCastling(String),
    #[error("invalid en-passant square '{0}'")]
    InvalidEnPassant(String),
    #[error("invalid move counter '{0}'")]
    InvalidCounter(String),
    #[error("move string '{0}' is too short")]
    MoveTooShort(String),
    #[error("invalid square in move '{0}'")]
    InvalidSquare(String),
    #[error("missing promotion piece type")]
    MissingPromotion,
    #[error("invalid promotion piece type '{0}'")]
    InvalidPromotion(char),
    #[error("malformed move '{0}'")]
    MalformedMove(String),
    #[error("move '{0}' is ambiguous")]
    AmbiguousMove(String),
    #[error("missing or wrong move number, expected {0}")]
    BadMoveNumber(u32),
}

/// Bad option name or value. Out-of-range values are not errors; they are
/// clamped with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("option '{0}' expects a number, got '{1}'")]
    NotANumber(String, String),
}

/// Engine-level operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Option(#[from] OptionError),
    #[error("move '{0}' cannot be legally played in this position")]
    IllegalMove(String),
    #[error("operation rejected while a search is in progress")]
    EngineBusy,
    #[error("a search is already in progress")]
    Concurrency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_descriptive() {
        assert_eq!(
            ParseError::InvalidEnPassant("e5".into()).to_string(),
            "invalid en-passant square 'e5'"
        );
        assert_eq!(ParseError::MissingPromotion.to_string(), "missing promotion piece type");
        assert_eq!(ParseError::MissingRankDelimiter.to_string(), "missing rank delimiter");
        assert_eq!(
            EngineError::IllegalMove("e2e5".into()).to_string(),
            "move 'e2e5' cannot be legally played in this position"
        );
        assert_eq!(
            OptionError::UnknownOption("Ponder".into()).to_string(),
            "unknown option 'Ponder'"
        );
    }

    #[test]
    fn test_parse_error_converts_to_engine_error() {
        let e: EngineError = ParseError::MissingRankDelimiter.into();
        assert_eq!(e.to_string(), "missing rank delimiter");
    }
}
