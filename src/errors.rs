use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenParseError {
    #[error("FEN string is missing the board part")]
    MissingBoard,
    #[error("board part of FEN has {0} ranks, expected 8")]
    BoardRanks(usize),
    #[error("wrong number of squares in rank: \"{0}\"")]
    BadSquaresInRank(String),
    #[error("unexpected character in piece placement: '{0}'")]
    UnexpectedCharacter(char),
    #[error("expected side to be 'w' or 'b', got \"{0}\"")]
    InvalidSide(String),
    #[error("expected side-to-move part")]
    MissingSide,
    #[error("expected castling part")]
    MissingCastling,
    #[error("invalid castling token: '{0}'")]
    InvalidCastling(char),
    #[error("castling rights name a missing rook: '{0}'")]
    CastlingWithoutRook(char),
    #[error("{0} has no king")]
    MissingKing(&'static str),
    #[error("{0} has more than one king")]
    TooManyKings(&'static str),
    #[error("expected en passant part")]
    MissingEnPassant,
    #[error("invalid en passant square: \"{0}\"")]
    InvalidEnPassant(String),
    #[error("invalid halfmove clock: \"{0}\"")]
    InvalidHalfmoveClock(String),
    #[error("invalid fullmove number: \"{0}\"")]
    InvalidFullmoveNumber(String),
    #[error("the waiting side's king is capturable")]
    WaitingKingCapturable,
}

/// Errors that can occur when parsing the `position` command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionParseError {
    #[error("failed to parse FEN: {0}")]
    Fen(#[from] FenParseError),
    #[error("`position` requires a position specifier (fen or startpos)")]
    MissingSpecifier,
    #[error("unknown position specifier \"{0}\", expected fen or startpos")]
    UnknownSpecifier(String),
    #[error("`position startpos` must be followed by `moves` or nothing, got \"{0}\"")]
    InvalidStartposSuffix(String),
}

/// Errors that can occur when parsing the `go` command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GoParseError {
    #[error("missing value after `{0}`")]
    MissingValue(&'static str),
    #[error("failed to parse value for `{param}`: {source}")]
    InvalidValue {
        param: &'static str,
        source: ParseIntError,
    },
}

/// Errors that can occur when parsing the `setoption` command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetOptionParseError {
    #[error("`setoption` must be followed by `name`")]
    MissingNameKeyword,
    #[error("missing option name after `setoption name`")]
    MissingOptionName,
    #[error("unknown option \"{0}\"")]
    UnknownOption(String),
    #[error("invalid value \"{value}\" for option `{name}`")]
    InvalidValue { name: &'static str, value: String },
    #[error("value {got} out of range for option `{name}`, expected {lo}..={hi}")]
    ValueOutOfRange {
        name: &'static str,
        lo: i64,
        hi: i64,
        got: i64,
    },
}

/// Top-level UCI errors.
#[derive(Debug, Error)]
pub enum UciError {
    #[error("unknown command: \"{0}\"")]
    UnknownCommand(String),
    #[error("{0}")]
    Position(#[from] PositionParseError),
    #[error("{0}")]
    Go(#[from] GoParseError),
    #[error("{0}")]
    SetOption(#[from] SetOptionParseError),
    #[error("missing depth after `perft`")]
    PerftMissingDepth,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
