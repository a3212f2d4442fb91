//! Container formats.
//!
//! Only the MPEG-2 transport stream is read; everything downstream works on
//! the frame descriptors it produces.

pub mod ts;

pub use self::ts::{DemuxConfig, DemuxSink, PacketSize, TsDemuxer};
