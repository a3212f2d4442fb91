use bytes::BytesMut;
use log::debug;

use crate::av::PayloadUnit;
use crate::diagnostics::{Counter, Diagnostics};
use crate::error::{ReformError, Result};

/// Packetized Elementary Stream (PES) header fields needed for timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// Bytes following the length field, 0 when unbounded.
    pub packet_length: u16,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<i64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<i64>,
    /// Offset of the payload within the PES packet.
    pub payload_offset: usize,
}

/// Stream ids without the optional PES header.
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
}

/// Reads a 5-byte PTS/DTS field.
pub fn read_timestamp(b: &[u8]) -> i64 {
    (((b[0] as i64 >> 1) & 0x07) << 30)
        | ((b[1] as i64) << 22)
        | ((b[2] as i64 >> 1) << 15)
        | ((b[3] as i64) << 7)
        | (b[4] as i64 >> 1)
}

pub fn parse_pes_header(data: &[u8]) -> Result<PesHeader> {
    if data.len() < 6 || data[0] != 0 || data[1] != 0 || data[2] != 1 {
        return Err(ReformError::InvalidData("missing PES start code".into()));
    }
    let stream_id = data[3];
    let packet_length = ((data[4] as u16) << 8) | data[5] as u16;
    if !has_optional_header(stream_id) {
        return Ok(PesHeader {
            stream_id,
            packet_length,
            pts: None,
            dts: None,
            payload_offset: 6,
        });
    }

    if data.len() < 9 || data[6] & 0xC0 != 0x80 {
        return Err(ReformError::InvalidData("bad PES optional header".into()));
    }
    let pts_dts_flags = data[7] >> 6;
    let payload_offset = 9 + data[8] as usize;
    if data.len() < payload_offset {
        return Err(ReformError::InvalidData("PES header overruns payload".into()));
    }

    let (pts, dts) = match pts_dts_flags {
        0b10 if payload_offset >= 14 => (Some(read_timestamp(&data[9..14])), None),
        0b11 if payload_offset >= 19 => (
            Some(read_timestamp(&data[9..14])),
            Some(read_timestamp(&data[14..19])),
        ),
        0b00 => (None, None),
        _ => return Err(ReformError::InvalidData("PES timestamp flags".into())),
    };

    Ok(PesHeader {
        stream_id,
        packet_length,
        pts,
        dts,
        payload_offset,
    })
}

/// Collects the transport payloads of one PID into PES packets.
#[derive(Debug, Default)]
pub struct PesAssembler {
    buffer: BytesMut,
    started: bool,
    file_offset: i64,
    clock: Option<i64>,
}

impl PesAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one packet payload. A unit start completes the previous packet,
    /// which is returned.
    pub fn push(
        &mut self,
        payload: &[u8],
        unit_start: bool,
        file_offset: i64,
        clock: Option<i64>,
        diag: &mut Diagnostics,
    ) -> Option<PayloadUnit> {
        let completed = if unit_start { self.finish(diag) } else { None };
        if unit_start {
            self.started = true;
            self.file_offset = file_offset;
            self.clock = clock;
        }
        if self.started {
            self.buffer.extend_from_slice(payload);
        }
        completed
    }

    /// Throws away the packet in progress; the data up to the next unit
    /// start is unusable.
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.started = false;
    }

    pub fn flush(&mut self, diag: &mut Diagnostics) -> Option<PayloadUnit> {
        self.finish(diag)
    }

    fn finish(&mut self, diag: &mut Diagnostics) -> Option<PayloadUnit> {
        if !self.started {
            return None;
        }
        self.started = false;
        let mut data = self.buffer.split().freeze();

        let header = match parse_pes_header(&data) {
            Ok(h) => h,
            Err(e) => {
                debug!("dropping PES at {}: {}", self.file_offset, e);
                diag.incr(Counter::MalformedPes);
                return None;
            }
        };
        if header.packet_length > 0 {
            let declared = 6 + header.packet_length as usize;
            if data.len() < declared {
                debug!(
                    "dropping truncated PES at {}: {} of {} bytes",
                    self.file_offset,
                    data.len(),
                    declared
                );
                diag.incr(Counter::MalformedPes);
                return None;
            }
            data.truncate(declared);
        }

        Some(PayloadUnit {
            data: data.slice(header.payload_offset..),
            pts: header.pts,
            dts: header.dts,
            clock: self.clock,
            file_offset: self.file_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn timestamp(marker: u8, ts: i64) -> [u8; 5] {
        [
            marker | (((ts >> 29) & 0x0E) as u8) | 1,
            (ts >> 22) as u8,
            (((ts >> 14) & 0xFE) | 1) as u8,
            (ts >> 7) as u8,
            (((ts << 1) & 0xFE) | 1) as u8,
        ]
    }

    fn pes(pts: i64, dts: Option<i64>, payload: &[u8], bounded: bool) -> Vec<u8> {
        let header_len = if dts.is_some() { 10 } else { 5 };
        let mut out = vec![0, 0, 1, 0xE0, 0, 0, 0x80];
        out.push(if dts.is_some() { 0xC0 } else { 0x80 });
        out.push(header_len);
        out.extend(timestamp(if dts.is_some() { 0x30 } else { 0x20 }, pts));
        if let Some(dts) = dts {
            out.extend(timestamp(0x10, dts));
        }
        out.extend_from_slice(payload);
        if bounded {
            let len = (out.len() - 6) as u16;
            out[4..6].copy_from_slice(&len.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_parse_timestamps() {
        let pts = (1i64 << 32) + 12345;
        let header = parse_pes_header(&pes(pts, Some(pts - 3003), b"x", true)).unwrap();
        assert_eq!(header.pts, Some(pts));
        assert_eq!(header.dts, Some(pts - 3003));
        assert_eq!(header.payload_offset, 19);
        assert_eq!(header.packet_length, 14);
    }

    #[test]
    fn test_assemble_across_packets() {
        let mut diag = Diagnostics::new();
        let mut asm = PesAssembler::new();
        let packet = pes(9000, None, &[0xAA; 300], false);

        assert!(asm.push(&packet[..184], true, 0, Some(100), &mut diag).is_none());
        assert!(asm.push(&packet[184..], false, 188, None, &mut diag).is_none());
        let unit = asm
            .push(&pes(12003, None, b"next", true), true, 376, None, &mut diag)
            .unwrap();
        assert_eq!(unit.pts, Some(9000));
        assert_eq!(unit.clock, Some(100));
        assert_eq!(unit.file_offset, 0);
        assert_eq!(&unit.data[..], &[0xAA; 300][..]);

        let last = asm.flush(&mut diag).unwrap();
        assert_eq!(&last.data[..], b"next");
        assert!(diag.is_clean());
    }

    #[test]
    fn test_truncated_and_discarded() {
        let mut diag = Diagnostics::new();
        let mut asm = PesAssembler::new();
        let packet = pes(0, None, &[1; 100], true);
        asm.push(&packet[..50], true, 0, None, &mut diag);
        assert!(asm.flush(&mut diag).is_none());
        assert_eq!(diag.get(Counter::MalformedPes), 1);

        asm.push(&packet, true, 0, None, &mut diag);
        asm.discard();
        assert!(asm.flush(&mut diag).is_none());
        // continuation without a start is ignored
        assert!(asm.push(&packet, false, 0, None, &mut diag).is_none());
        assert!(asm.flush(&mut diag).is_none());
        assert_eq!(diag.get(Counter::MalformedPes), 1);
    }
}
