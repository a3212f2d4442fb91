//! # MPEG Transport Stream (TS) Demultiplexing
//!
//! - TS packet parsing with 188/192-byte framing and resynchronisation
//! - Program Specific Information (PAT/PMT) section assembly with CRC check
//! - Packetized Elementary Stream (PES) reassembly
//! - PCR clock recovery and wall-clock time anchors
//!
//! ## Example
//!
//! ```rust
//! use tsreform::av::{AudioFrameInfo, VideoFrameInfo};
//! use tsreform::diagnostics::Diagnostics;
//! use tsreform::format::ts::{DemuxConfig, DemuxSink, PidTable, TsDemuxer};
//!
//! #[derive(Default)]
//! struct Count(usize);
//!
//! impl DemuxSink for Count {
//!     fn on_pid_table(&mut self, _table: &PidTable) {}
//!     fn on_video_frames(&mut self, frames: &[VideoFrameInfo]) {
//!         self.0 += frames.len();
//!     }
//!     fn on_audio_frames(&mut self, _idx: usize, _frames: &[AudioFrameInfo]) {}
//! }
//!
//! let mut demuxer = TsDemuxer::new(DemuxConfig::default());
//! let mut sink = Count::default();
//! let mut diag = Diagnostics::new();
//! demuxer.feed(&[0x47, 0x1F, 0xFF, 0x10], &mut sink, &mut diag);
//! demuxer.flush(&mut sink, &mut diag);
//! assert_eq!(sink.0, 0);
//! ```

pub mod clock;
pub mod demuxer;
pub mod parser;
pub mod pes;
pub mod psi;
pub mod reader;
pub mod types;

pub use clock::PcrClock;
pub use demuxer::{DemuxConfig, DemuxSink, PacketSize, TsDemuxer};
pub use parser::{parse_adaptation_field, parse_header, parse_pat, parse_pmt};
pub use pes::{parse_pes_header, PesAssembler, PesHeader};
pub use psi::SectionAssembler;
pub use reader::demux_reader;
pub use types::*;
