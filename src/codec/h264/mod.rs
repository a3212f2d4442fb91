//! # H.264/AVC Elementary Stream Parsing
//!
//! Turns Annex B payloads into presented pictures:
//!
//! - NAL unit splitting and emulation prevention removal
//! - Sequence and Picture Parameter Sets (SPS/PPS), including VUI and HRD
//! - Buffering period and picture timing SEI
//! - Field pairing and pic_struct mapping
//!
//! ## Example
//!
//! ```rust
//! use tsreform::av::PayloadUnit;
//! use tsreform::codec::h264::H264Parser;
//! use tsreform::diagnostics::Diagnostics;
//!
//! let mut parser = H264Parser::new();
//! let mut diag = Diagnostics::new();
//! let unit = PayloadUnit::new(vec![0u8, 0, 1, 0x09, 0xF0]).with_pts(3003);
//! assert!(parser.parse_unit(&unit, &mut diag).is_empty());
//! ```

/// Parser for H.264 bitstreams
pub mod parser;
/// Parameter set and header types
pub mod types;


#[doc(inline)]
pub use parser::*;
#[doc(inline)]
pub use types::*;
