//! AAC audio carried as ADTS.

pub mod channels;
pub mod decoder;
pub mod dual_mono;
pub mod parser;
pub mod types;

pub use decoder::{AacDecoder, DecodedFrame, DecoderFactory, HeaderDecoder};
pub use dual_mono::{split_dual_mono, DualMonoSplitter};
pub use parser::AdtsParser;
pub use types::{AdtsHeader, ElementId, SyntaxElement};
