use log::debug;

use super::types::{PCR_HZ, PCR_WRAP};

/// A jump larger than this between consecutive PCRs restarts the clock.
const MAX_PCR_GAP: i64 = 10 * PCR_HZ;

/// Reconstructs the transport clock from the Program Clock Reference.
///
/// PCR values are extended across the 33-bit wrap and interpolated linearly
/// between the last two samples by byte position. Elapsed time survives
/// discontinuities: each new clock segment continues where the previous one
/// stopped.
#[derive(Debug, Clone, Default)]
pub struct PcrClock {
    /// (byte position, extended 27 MHz value)
    prev: Option<(i64, i64)>,
    last: Option<(i64, i64)>,
    segment_start: i64,
    elapsed_base: i64,
}

impl PcrClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }

    /// Records a PCR seen in the packet at `byte_pos`.
    pub fn update(&mut self, pcr: i64, byte_pos: i64, discontinuity: bool) {
        let Some((_, last)) = self.last else {
            self.last = Some((byte_pos, pcr));
            self.segment_start = pcr;
            return;
        };

        let mut diff = pcr - last.rem_euclid(PCR_WRAP);
        if diff > PCR_WRAP / 2 {
            diff -= PCR_WRAP;
        } else if diff < -PCR_WRAP / 2 {
            diff += PCR_WRAP;
        }
        let extended = last + diff;

        if discontinuity || diff < 0 || diff > MAX_PCR_GAP {
            debug!(
                "PCR discontinuity at byte {}: {} -> {}",
                byte_pos, last, extended
            );
            self.elapsed_base += last - self.segment_start;
            self.segment_start = extended;
            self.prev = None;
        } else {
            self.prev = self.last;
        }
        self.last = Some((byte_pos, extended));
    }

    /// 90 kHz clock at a byte position, interpolated from the last two PCRs.
    pub fn clock_at(&self, byte_pos: i64) -> Option<i64> {
        let (last_pos, last) = self.last?;
        let value = match self.prev {
            Some((prev_pos, prev)) if last_pos > prev_pos => {
                let rate = (last - prev) as f64 / (last_pos - prev_pos) as f64;
                last + ((byte_pos - last_pos) as f64 * rate) as i64
            }
            _ => last,
        };
        Some(value / 300)
    }

    /// 90 kHz clock at the most recent PCR.
    pub fn now(&self) -> Option<i64> {
        self.last.map(|(_, v)| v / 300)
    }

    /// Milliseconds of clock time covered since the first PCR.
    pub fn elapsed_ms(&self) -> i64 {
        match self.last {
            Some((_, last)) => (self.elapsed_base + last - self.segment_start) / (PCR_HZ / 1000),
            None => 0,
        }
    }
}
