//! Core timeline types shared by the parsers, the demuxer and the reform engine.
//!
//! Everything here is plain data: frame descriptors produced once by a parser
//! and then only read.

mod event;
mod frame;
mod packet;
pub mod timestamp;

pub use event::*;
pub use frame::*;
pub use packet::PayloadUnit;

/// MPEG system clock for PTS/DTS, in Hz.
pub const MPEG_CLOCK_HZ: i64 = 90_000;
