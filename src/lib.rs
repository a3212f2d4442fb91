#![doc(html_root_url = "https://docs.rs/tsreform/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsreform - MPEG-2 TS recording processor
//!
//! `tsreform` turns a broadcast transport stream recording into a frame
//! accurate plan for re-encoding it. The recording is read once, in order,
//! and then analysed as a whole.
//!
//! ## Features
//!
//! ### Transport layer
//! - 188 and 192 byte packets, detected automatically
//! - PAT/PMT section assembly with CRC check
//! - Continuity checks and resynchronisation
//! - PCR clock reconstruction and wall clock anchors
//!
//! ### Elementary streams
//! - MPEG-2 video: sequence, GOP and picture headers with field pairing
//! - H.264: SPS/PPS, SEI picture timing and slice headers
//! - AAC in ADTS, including dual mono splitting
//!
//! ### Reform engine
//! - 33-bit timestamp unwrapping across wraps and series
//! - Format sections and per-file frame tables with pulldown expansion
//! - Audio to video alignment with gap repair statistics
//! - Partitioning by commercial zones and division points
//! - Bitrate zones for the encoder
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsreform::config::Config;
//! use tsreform::diagnostics::Diagnostics;
//! use tsreform::format::ts::{demux_reader, TsDemuxer};
//! use tsreform::reform::{PartitionSpec, RecordingCollector, StreamReform};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let mut file = tokio::fs::File::open("recording.ts").await?;
//!
//!     let mut demuxer = TsDemuxer::new(config.demux.clone());
//!     let mut collector = RecordingCollector::new();
//!     let mut diag = Diagnostics::new();
//!     demux_reader(&mut file, &mut demuxer, &mut collector, &mut diag).await?;
//!
//!     let plan = StreamReform::new(config.reform).reform(collector.finish(), &mut diag)?;
//!     for (key, output) in plan.partition(&PartitionSpec::default())? {
//!         println!("{:?}: {} frames", key, output.video_frames.len());
//!     }
//!     println!("{}", diag);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: frame descriptors, stream events and timestamp arithmetic
//! - `codec`: elementary stream parsers (MPEG-2, H.264, AAC)
//! - `format`: the transport stream demuxer and its async driver
//! - `reform`: the stream reform engine
//! - `diagnostics`: advisory counters for recoverable problems
//! - `error`: error type and result alias
//! - `config`: run settings from environment and file
//! - `utils`: bit reader/writer and CRC

/// Frame, event and timestamp types
pub mod av;

/// Elementary stream parsers
pub mod codec;

/// Run configuration
pub mod config;

pub mod diagnostics;

/// Error types and utilities
pub mod error;

/// Container formats
pub mod format;

pub mod reform;

/// Common utilities and helper functions
pub mod utils;

pub use diagnostics::{Counter, Diagnostics};
pub use error::{ReformError, Result};
