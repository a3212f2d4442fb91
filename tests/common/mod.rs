//! Synthetic transport streams for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use tsreform::utils::{crc32_mpeg2, BitWriter};

pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x110;
pub const STREAM_TYPE_MPEG2: u8 = 0x02;
pub const STREAM_TYPE_ADTS: u8 = 0x0F;

/// 29.97 fps frame period.
pub const FRAME_TICKS: i64 = 3003;
/// 1024 samples at 48 kHz.
pub const AUDIO_TICKS: i64 = 1920;

fn timestamp(prefix: u8, ts: i64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 29) & 0x0E) as u8) | 1,
        (ts >> 22) as u8,
        (((ts >> 14) & 0xFE) | 1) as u8,
        (ts >> 7) as u8,
        (((ts << 1) & 0xFE) | 1) as u8,
    ]
}

/// Writes transport packets with per-PID continuity counters.
#[derive(Default)]
pub struct TsBuilder {
    data: Vec<u8>,
    cc: HashMap<u16, u8>,
    pmt_version: u8,
}

impl TsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.cc.entry(pid).or_insert(0x0F);
        *cc = (*cc + 1) & 0x0F;
        *cc
    }

    /// One packet, stuffed through the adaptation field when short.
    pub fn packet(&mut self, pid: u16, unit_start: bool, payload: &[u8]) {
        let cc = self.next_cc(pid);
        let mut out = vec![
            0x47,
            ((unit_start as u8) << 6) | (pid >> 8) as u8,
            pid as u8,
            0x10 | cc,
        ];
        let room = 184;
        if payload.len() < room {
            let af_len = room - payload.len() - 1;
            out[3] |= 0x20;
            out.push(af_len as u8);
            if af_len > 0 {
                out.push(0);
                out.resize(out.len() + af_len - 1, 0xFF);
            }
        }
        out.extend_from_slice(payload);
        assert_eq!(out.len(), 188);
        self.data.extend(out);
    }

    fn section(&mut self, pid: u16, mut section: Vec<u8>) {
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        let mut payload = vec![0];
        payload.extend(section);
        self.packet(pid, true, &payload);
    }

    pub fn pat(&mut self) {
        self.section(
            0,
            vec![
                0x00,
                0xB0,
                0x0D,
                0x00,
                0x01,
                0xC1,
                0x00,
                0x00,
                0x00,
                0x01,
                0xE0 | (PMT_PID >> 8) as u8,
                PMT_PID as u8,
            ],
        );
    }

    /// A PMT listing `(stream_type, pid)` pairs; every call bumps the version.
    pub fn pmt(&mut self, pcr_pid: u16, streams: &[(u8, u16)]) {
        let length = 13 + 5 * streams.len();
        let mut section = vec![
            0x02,
            0xB0 | (length >> 8) as u8,
            length as u8,
            0x00,
            0x01,
            0xC1 | ((self.pmt_version & 0x1F) << 1),
            0x00,
            0x00,
            0xE0 | (pcr_pid >> 8) as u8,
            pcr_pid as u8,
            0xF0,
            0x00,
        ];
        for &(stream_type, pid) in streams {
            section.extend([stream_type, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0x00]);
        }
        self.pmt_version += 1;
        self.section(PMT_PID, section);
    }

    /// An adaptation-only packet carrying a 27 MHz PCR.
    pub fn pcr(&mut self, pid: u16, pcr: i64) {
        let cc = *self.cc.get(&pid).unwrap_or(&0);
        let base = pcr / 300;
        let ext = pcr % 300;
        let mut out = vec![0x47, (pid >> 8) as u8, pid as u8, 0x20 | cc, 183, 0x10];
        out.extend([
            (base >> 25) as u8,
            (base >> 17) as u8,
            (base >> 9) as u8,
            (base >> 1) as u8,
            (((base & 1) << 7) as u8) | 0x7E | ((ext >> 8) as u8),
            ext as u8,
        ]);
        out.resize(188, 0xFF);
        self.data.extend(out);
    }

    /// A PES packet split over as many transport packets as needed.
    pub fn pes(&mut self, pid: u16, stream_id: u8, pts: i64, dts: Option<i64>, es: &[u8]) {
        let mut header = vec![0, 0, 1, stream_id, 0, 0, 0x80];
        match dts {
            Some(dts) => {
                header.extend([0xC0, 10]);
                header.extend(timestamp(3, pts));
                header.extend(timestamp(1, dts));
            }
            None => {
                header.extend([0x80, 5]);
                header.extend(timestamp(2, pts));
            }
        }
        // video PES length stays open
        if stream_id & 0xF0 != 0xE0 {
            let length = header.len() - 6 + es.len();
            header[4] = (length >> 8) as u8;
            header[5] = length as u8;
        }
        header.extend_from_slice(es);

        for (i, chunk) in header.chunks(184).enumerate() {
            self.packet(pid, i == 0, chunk);
        }
    }

    /// Wraps every 188-byte packet in a 4-byte timestamp prefix.
    pub fn to_192(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() / 188 * 192);
        for (i, packet) in self.data.chunks(188).enumerate() {
            out.extend((i as u32 * 1000).to_be_bytes());
            out.extend_from_slice(packet);
        }
        out
    }
}

/// An ADTS AAC-LC frame at 48 kHz with filler payload.
pub fn adts_frame(channel_configuration: u8, len: usize) -> Vec<u8> {
    let mut out = vec![
        0xFF,
        0xF1,
        (1 << 6) | (3 << 2) | (channel_configuration >> 2),
        ((channel_configuration & 3) << 6) | (len >> 11) as u8,
        (len >> 3) as u8,
        (((len & 7) << 5) as u8) | 0x1F,
        0xFC,
    ];
    out.resize(len, 0x5A);
    out
}

/// Payload bits carried by each single channel element of [`dual_mono_frame`].
pub const SCE_PAYLOAD_BITS: usize = 24;

/// A `channel_configuration = 0` ADTS frame whose raw data is two single
/// channel elements (tags 0 and 1) and an END element.
pub fn dual_mono_frame() -> Vec<u8> {
    let mut w = BitWriter::new();
    for tag in 0..2u32 {
        w.write_bits(0, 3); // SCE
        w.write_bits(tag, 4);
        w.write_bits(0xA5_0000 | tag, SCE_PAYLOAD_BITS as u32);
    }
    w.write_bits(7, 3); // END
    let raw = finish(w);

    let mut out = adts_frame(0, 7 + raw.len());
    out[7..].copy_from_slice(&raw);
    out
}

fn start_code(code: u8, body: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0, 0, 1, code];
    out.extend(body);
    out
}

fn finish(mut w: BitWriter) -> Vec<u8> {
    w.byte_align(false);
    w.finish().unwrap()
}

/// Sequence header, sequence extension and GOP header of an interlaced
/// 29.97 fps stream.
pub fn mpeg2_sequence(width: u32, height: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(width, 12);
    w.write_bits(height, 12);
    w.write_bits(3, 4);
    w.write_bits(4, 4);
    w.write_bits(0x3FFFF, 18);
    w.write_bit(true);
    w.write_bits(0x3FF, 10);
    w.write_bits(0, 3);
    let mut out = start_code(0xB3, finish(w));

    let mut w = BitWriter::new();
    w.write_bits(1, 4);
    w.write_bits(0x48, 8);
    w.write_bit(false);
    w.write_bits(1, 2);
    w.write_bits(0, 4);
    w.write_bits(0x0FF, 12);
    w.write_bit(true);
    w.write_bits(0x11, 8);
    w.write_bit(false);
    w.write_bits(0, 7);
    out.extend(start_code(0xB5, finish(w)));

    let mut w = BitWriter::new();
    w.write_bit(false);
    w.write_bits(0, 5);
    w.write_bits(0, 6);
    w.write_bit(true);
    w.write_bits(0, 6);
    w.write_bits(0, 6);
    w.write_bit(true);
    w.write_bit(false);
    out.extend(start_code(0xB8, finish(w)));
    out
}

/// A top-field-first frame picture with its coding extension and a slice.
pub fn mpeg2_picture(coding_type: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 10);
    w.write_bits(coding_type, 3);
    w.write_bits(0xFFFF, 16);
    if coding_type >= 2 {
        w.write_bits(0b0111, 4);
    }
    if coding_type == 3 {
        w.write_bits(0b0111, 4);
    }
    w.write_bit(false);
    let mut out = start_code(0x00, finish(w));

    let mut w = BitWriter::new();
    w.write_bits(8, 4);
    w.write_bits(0xFFFF, 16);
    w.write_bits(1, 2);
    w.write_bits(3, 2);
    w.write_bit(true);
    w.write_bits(0b10101, 5);
    w.write_bit(false);
    w.write_bit(true);
    w.write_bit(false);
    w.write_bit(false);
    out.extend(start_code(0xB5, finish(w)));
    out.extend(start_code(0x01, vec![0x12, 0x34, 0x56, 0x78]));
    out
}

/// Layout of a synthetic recording.
pub struct Recording {
    pub video_frames: usize,
    pub audio_frames: usize,
    pub gop: usize,
    pub first_pts: i64,
    /// Video frame from which the picture size changes, with the new width.
    pub switch: Option<(usize, u32)>,
    /// Audio as [`dual_mono_frame`]s instead of stereo frames.
    pub dual_mono: bool,
}

impl Default for Recording {
    fn default() -> Self {
        Self {
            video_frames: 60,
            audio_frames: 100,
            gop: 15,
            first_pts: 90_000,
            switch: None,
            dual_mono: false,
        }
    }
}

impl Recording {
    /// Interleaves video, audio and PCR in presentation order.
    pub fn build(&self) -> TsBuilder {
        let mut ts = TsBuilder::new();
        ts.pat();
        ts.pmt(VIDEO_PID, &[(STREAM_TYPE_MPEG2, VIDEO_PID), (STREAM_TYPE_ADTS, AUDIO_PID)]);

        let (mut v, mut a) = (0, 0);
        let mut next_pcr = self.first_pts - 9000;
        while v < self.video_frames || a < self.audio_frames {
            let video_pts = self.first_pts + v as i64 * FRAME_TICKS;
            let audio_pts = self.first_pts + a as i64 * AUDIO_TICKS;
            let video_next = v < self.video_frames && (a >= self.audio_frames || video_pts <= audio_pts);
            let now = if video_next { video_pts } else { audio_pts };
            while next_pcr <= now {
                ts.pcr(VIDEO_PID, next_pcr * 300);
                next_pcr += 9000;
            }

            if video_next {
                let mut es = Vec::new();
                if v % self.gop == 0 {
                    let width = match self.switch {
                        Some((from, width)) if v >= from => width,
                        _ => 1440,
                    };
                    es.extend(mpeg2_sequence(width, 1080));
                }
                es.extend(mpeg2_picture(if v % self.gop == 0 { 1 } else { 2 }));
                ts.pes(VIDEO_PID, 0xE0, video_pts, None, &es);
                v += 1;
            } else {
                let frame = if self.dual_mono {
                    dual_mono_frame()
                } else {
                    adts_frame(2, 200)
                };
                ts.pes(AUDIO_PID, 0xC0, audio_pts, None, &frame);
                a += 1;
            }
        }
        ts
    }
}
