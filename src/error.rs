//! Crate-wide error type. One variant per failure kind in the design's error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("out of bounds: tried to read {requested} byte(s) at offset {offset}, buffer is {len} byte(s)")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        len: usize,
    },

    #[error("malformed ELF: {0}")]
    MalformedElf(String),

    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    #[error("reserved opcode encoding: {0}")]
    ReservedOpcode(String),

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("cannot encode instruction: {0}")]
    InvalidEncoding(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
