use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// Errors produced by the demultiplexer, the frame parsers and the reform engine.
///
/// Per-unit problems (a broken PES packet, an undecodable audio frame) are
/// normally absorbed by the component that hit them and only show up in
/// [`Diagnostics`](crate::diagnostics::Diagnostics). What escapes as an error
/// is either a caller mistake or a `Format` error that invalidates the whole
/// recording.
#[derive(Error, Debug)]
pub enum ReformError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("reached end of data")]
    Eof,

    #[error("format error: {0}")]
    Format(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("parse float error: {0}")]
    ParseFloat(#[from] ParseFloatError),
}

impl ReformError {
    /// Whether the error aborts processing of the whole recording.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReformError::Format(_) | ReformError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ReformError>;
