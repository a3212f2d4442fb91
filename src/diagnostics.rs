//! Advisory counters for recoverable per-unit problems.
//!
//! Components never fail on a broken packet or frame; they drop it, bump a
//! counter here and carry on. The host reads the counters when the job is
//! done.

use std::fmt;

/// A named diagnostic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    /// Frames that arrived without any usable timestamp.
    UnknownPts,
    /// Audio frames the reference decoder rejected twice.
    DecodeError,
    /// Transport PTS disagreeing with the SEI-derived PTS.
    PtsMismatch,
    /// Backward jumps beyond the tolerated limit.
    NonContinuousPts,
    SyncLost,
    ContinuityError,
    TransportError,
    Scrambled,
    CrcError,
    MalformedPes,
    MalformedHeader,
    /// Rolling audio buffer discarded after exceeding the frame length limit.
    AudioDesync,
    UnpairedField,
    AudioSkipped,
    AudioInserted,
    AudioUnderfilled,
    FrameFileMismatch,
}

impl Counter {
    pub const ALL: [Counter; 17] = [
        Counter::UnknownPts,
        Counter::DecodeError,
        Counter::PtsMismatch,
        Counter::NonContinuousPts,
        Counter::SyncLost,
        Counter::ContinuityError,
        Counter::TransportError,
        Counter::Scrambled,
        Counter::CrcError,
        Counter::MalformedPes,
        Counter::MalformedHeader,
        Counter::AudioDesync,
        Counter::UnpairedField,
        Counter::AudioSkipped,
        Counter::AudioInserted,
        Counter::AudioUnderfilled,
        Counter::FrameFileMismatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::UnknownPts => "unknown_pts",
            Counter::DecodeError => "decode_error",
            Counter::PtsMismatch => "pts_mismatch",
            Counter::NonContinuousPts => "non_continuous_pts",
            Counter::SyncLost => "sync_lost",
            Counter::ContinuityError => "continuity_error",
            Counter::TransportError => "transport_error",
            Counter::Scrambled => "scrambled",
            Counter::CrcError => "crc_error",
            Counter::MalformedPes => "malformed_pes",
            Counter::MalformedHeader => "malformed_header",
            Counter::AudioDesync => "audio_desync",
            Counter::UnpairedField => "unpaired_field",
            Counter::AudioSkipped => "audio_skipped",
            Counter::AudioInserted => "audio_inserted",
            Counter::AudioUnderfilled => "audio_underfilled",
            Counter::FrameFileMismatch => "frame_file_mismatch",
        }
    }
}

/// Counter set threaded through the demuxer, the parsers and the reform engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    counts: [u64; Counter::ALL.len()],
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: Counter, n: u64) {
        self.counts[counter as usize] += n;
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter as usize]
    }

    /// Folds another counter set into this one.
    pub fn merge(&mut self, other: &Diagnostics) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        Counter::ALL.iter().map(move |&c| (c.name(), self.get(c)))
    }

    pub fn is_clean(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter().filter(|(_, v)| *v > 0) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        if first {
            write!(f, "clean")?;
        }
        Ok(())
    }
}
