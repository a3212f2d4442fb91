//! MPEG-2 video (ISO/IEC 13818-2) elementary stream parsing.

pub mod parser;
pub mod types;

pub use parser::{find_start_codes, Mpeg2Parser};
pub use types::*;
