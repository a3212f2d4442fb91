use std::collections::HashMap;

use bytes::BytesMut;
use log::{debug, info, warn};

use super::clock::PcrClock;
use super::parser::{parse_adaptation_field, parse_header, parse_pat, parse_pmt};
use super::pes::PesAssembler;
use super::psi::SectionAssembler;
use super::types::*;
use crate::av::timestamp::PTS_MASK;
use crate::av::{AudioFrameInfo, PayloadUnit, TimeAnchor, VideoFrameInfo, MPEG_CLOCK_HZ};
use crate::codec::aac::DecoderFactory;
use crate::codec::{is_video_stream_type, AdtsParser, VideoParser, STREAM_TYPE_ADTS_AAC};
use crate::diagnostics::{Counter, Diagnostics};
use crate::utils::section_crc_ok;

/// Transport packet framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketSize {
    /// Detected from the spacing of sync bytes.
    #[default]
    Auto,
    /// Always 188 or 192 bytes.
    Fixed(usize),
}

#[derive(Debug, Clone)]
pub struct DemuxConfig {
    pub packet_size: PacketSize,
    /// Wall clock of the first PCR, milliseconds since the Unix epoch.
    pub recording_start_ms: i64,
    /// Spacing of emitted [`TimeAnchor`]s.
    pub anchor_interval_secs: f64,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            packet_size: PacketSize::Auto,
            recording_start_ms: 0,
            anchor_interval_secs: 10.0,
        }
    }
}

/// Receives everything the demuxer extracts, in stream order.
pub trait DemuxSink {
    /// The programme layout changed. Frames delivered afterwards belong to
    /// the new table.
    fn on_pid_table(&mut self, table: &PidTable);

    fn on_video_frames(&mut self, frames: &[VideoFrameInfo]);

    fn on_audio_frames(&mut self, audio_idx: usize, frames: &[AudioFrameInfo]);

    fn on_time_anchor(&mut self, _anchor: TimeAnchor) {}
}

struct VideoStream {
    pid: u16,
    assembler: PesAssembler,
    parser: VideoParser,
}

struct AudioStream {
    pid: u16,
    assembler: PesAssembler,
    parser: AdtsParser,
}

enum SyncSearch {
    Found(usize),
    /// A candidate exists at this position but the next packet is not
    /// buffered yet.
    NeedMore(usize),
    NotFound,
}

/// Scans for a position where two consecutive packets start with a sync byte.
fn find_sync(data: &[u8], packet_size: usize) -> SyncSearch {
    for (pos, &byte) in data.iter().enumerate() {
        if byte != SYNC_BYTE {
            continue;
        }
        match data.get(pos + packet_size) {
            Some(&SYNC_BYTE) => return SyncSearch::Found(pos),
            Some(_) => continue,
            None => return SyncSearch::NeedMore(pos),
        }
    }
    SyncSearch::NotFound
}

/// Detects the packet size from three sync bytes at equal spacing.
fn detect_packet_size(data: &[u8]) -> Option<(usize, usize)> {
    for size in [TS_PACKET_SIZE, TS_PACKET_SIZE_192] {
        let span = 2 * size;
        if data.len() <= span {
            continue;
        }
        let found = (0..data.len() - span).find(|&pos| {
            data[pos] == SYNC_BYTE && data[pos + size] == SYNC_BYTE && data[pos + span] == SYNC_BYTE
        });
        if let Some(pos) = found {
            return Some((pos, size));
        }
    }
    None
}

/// Bytes scanned for a packet size before the head of the buffer is given up.
const DETECT_WINDOW: usize = 8 * TS_PACKET_SIZE_192;

/// MPEG-2 transport stream demultiplexer for one programme.
///
/// Follows the first programme of the PAT, reassembles PES units of its
/// video stream and its ADTS audio streams, and hands them to the matching
/// frame parsers. Bytes may be fed in chunks of any size.
pub struct TsDemuxer {
    config: DemuxConfig,
    packet_size: Option<usize>,
    buffer: BytesMut,
    /// File offset of `buffer[0]`.
    offset: i64,
    pat_sections: SectionAssembler,
    pmt_pid: Option<u16>,
    pmt_sections: SectionAssembler,
    pmt: Option<Pmt>,
    table: PidTable,
    continuity: HashMap<u16, u8>,
    video: Option<VideoStream>,
    audio: Vec<AudioStream>,
    clock: PcrClock,
    next_anchor: Option<i64>,
    audio_decoder: Option<DecoderFactory>,
}

impl TsDemuxer {
    pub fn new(config: DemuxConfig) -> Self {
        let packet_size = match config.packet_size {
            PacketSize::Fixed(size) => Some(size),
            PacketSize::Auto => None,
        };
        Self {
            config,
            packet_size,
            buffer: BytesMut::new(),
            offset: 0,
            pat_sections: SectionAssembler::new(),
            pmt_pid: None,
            pmt_sections: SectionAssembler::new(),
            pmt: None,
            table: PidTable::default(),
            continuity: HashMap::new(),
            video: None,
            audio: Vec::new(),
            clock: PcrClock::new(),
            next_anchor: None,
            audio_decoder: None,
        }
    }

    /// Decodes audio through decoders made by `factory`, one per audio
    /// stream, instead of the header-only [`HeaderDecoder`].
    ///
    /// [`HeaderDecoder`]: crate::codec::aac::HeaderDecoder
    pub fn with_decoder(config: DemuxConfig, factory: DecoderFactory) -> Self {
        Self {
            audio_decoder: Some(factory),
            ..Self::new(config)
        }
    }

    pub fn packet_size(&self) -> Option<usize> {
        self.packet_size
    }

    pub fn pid_table(&self) -> &PidTable {
        &self.table
    }

    /// Consumes a chunk of the transport stream.
    pub fn feed<S: DemuxSink>(&mut self, data: &[u8], sink: &mut S, diag: &mut Diagnostics) {
        self.buffer.extend_from_slice(data);
        self.drain_packets(sink, diag);
    }

    /// Ends the stream: completes the units in progress and the parsers'
    /// held-back pictures.
    pub fn flush<S: DemuxSink>(&mut self, sink: &mut S, diag: &mut Diagnostics) {
        if self.packet_size.is_none() {
            self.packet_size = Some(TS_PACKET_SIZE);
            self.drain_packets(sink, diag);
        }
        // the last 192-byte packet lacks the next packet's timestamp prefix
        if self.buffer.len() >= TS_PACKET_SIZE && self.buffer[0] == SYNC_BYTE {
            let packet = self.buffer.split_to(TS_PACKET_SIZE).freeze();
            let pos = self.offset;
            self.offset += TS_PACKET_SIZE as i64;
            self.process_packet(&packet, pos, sink, diag);
        }
        if !self.buffer.is_empty() {
            debug!("discarding {} trailing bytes", self.buffer.len());
            self.offset += self.buffer.len() as i64;
            self.buffer.clear();
        }
        self.flush_streams(sink, diag);
    }

    fn skip(&mut self, n: usize) {
        let _ = self.buffer.split_to(n);
        self.offset += n as i64;
    }

    fn drain_packets<S: DemuxSink>(&mut self, sink: &mut S, diag: &mut Diagnostics) {
        loop {
            let size = match self.packet_size {
                Some(size) => size,
                None => match detect_packet_size(&self.buffer) {
                    Some((pos, size)) => {
                        if pos > 0 {
                            diag.incr(Counter::SyncLost);
                            self.skip(pos);
                        }
                        info!("detected {}-byte transport packets", size);
                        self.packet_size = Some(size);
                        size
                    }
                    None => {
                        if self.buffer.len() > DETECT_WINDOW {
                            diag.incr(Counter::SyncLost);
                            let excess = self.buffer.len() - 3 * TS_PACKET_SIZE_192;
                            self.skip(excess);
                        }
                        return;
                    }
                },
            };

            if self.buffer.len() < size.min(TS_PACKET_SIZE) {
                return;
            }
            if self.buffer[0] != SYNC_BYTE {
                match find_sync(&self.buffer, size) {
                    SyncSearch::Found(pos) => {
                        warn!("sync lost at byte {}, skipped {} bytes", self.offset, pos);
                        diag.incr(Counter::SyncLost);
                        self.skip(pos);
                    }
                    SyncSearch::NeedMore(pos) => {
                        if pos > 0 {
                            diag.incr(Counter::SyncLost);
                            self.skip(pos);
                        }
                        return;
                    }
                    SyncSearch::NotFound => {
                        diag.incr(Counter::SyncLost);
                        let n = self.buffer.len();
                        self.skip(n);
                        return;
                    }
                }
                continue;
            }
            if self.buffer.len() < size {
                return;
            }

            let packet = self.buffer.split_to(size).freeze();
            let pos = self.offset;
            self.offset += size as i64;
            self.process_packet(&packet[..TS_PACKET_SIZE], pos, sink, diag);
        }
    }

    fn process_packet<S: DemuxSink>(
        &mut self,
        packet: &[u8],
        pos: i64,
        sink: &mut S,
        diag: &mut Diagnostics,
    ) {
        let header = match parse_header(packet) {
            Ok(h) => h,
            Err(e) => {
                debug!("bad packet at {}: {}", pos, e);
                diag.incr(Counter::MalformedHeader);
                return;
            }
        };
        if header.transport_error {
            diag.incr(Counter::TransportError);
            return;
        }
        if header.pid == PID_NULL {
            return;
        }

        let mut payload_offset = TS_HEADER_SIZE;
        let mut discontinuity = false;
        if header.adaptation_field_exists {
            match parse_adaptation_field(packet, TS_HEADER_SIZE) {
                Ok(field) => {
                    payload_offset += field.length + 1;
                    discontinuity = field.discontinuity;
                    if let Some(pcr) = field.pcr {
                        if header.pid == self.table.pcr_pid && self.pmt.is_some() {
                            self.clock.update(pcr, pos, discontinuity);
                            self.emit_anchor(sink);
                        }
                    }
                }
                Err(e) => {
                    debug!("bad adaptation field at {}: {}", pos, e);
                    diag.incr(Counter::MalformedHeader);
                    return;
                }
            }
        }

        if !header.contains_payload || !self.check_continuity(&header, discontinuity, diag) {
            return;
        }
        if payload_offset >= packet.len() {
            return;
        }
        if header.scrambling_control != 0 {
            diag.incr(Counter::Scrambled);
            return;
        }

        let payload = &packet[payload_offset..];
        let unit_start = header.payload_unit_start;
        if header.pid == PID_PAT {
            for section in self.pat_sections.push(payload, unit_start) {
                self.handle_pat(&section, diag);
            }
        } else if Some(header.pid) == self.pmt_pid {
            for section in self.pmt_sections.push(payload, unit_start) {
                self.handle_pmt(&section, sink, diag);
            }
        } else {
            self.push_pes(header.pid, payload, unit_start, pos, sink, diag);
        }
    }

    /// Returns false for a duplicate packet. A gap breaks the unit in progress.
    fn check_continuity(
        &mut self,
        header: &TsHeader,
        discontinuity: bool,
        diag: &mut Diagnostics,
    ) -> bool {
        let cc = header.continuity_counter;
        let Some(last) = self.continuity.insert(header.pid, cc) else {
            return true;
        };
        if discontinuity {
            return true;
        }
        if cc == last {
            return false;
        }
        if cc != (last + 1) & 0x0F {
            debug!(
                "continuity error on PID {:#x}: {} -> {}",
                header.pid, last, cc
            );
            diag.incr(Counter::ContinuityError);
            self.discard_unit(header.pid);
        }
        true
    }

    fn discard_unit(&mut self, pid: u16) {
        if pid == PID_PAT {
            self.pat_sections.reset();
        } else if Some(pid) == self.pmt_pid {
            self.pmt_sections.reset();
        } else if let Some(video) = self.video.as_mut().filter(|v| v.pid == pid) {
            video.assembler.discard();
        } else if let Some(audio) = self.audio.iter_mut().find(|a| a.pid == pid) {
            audio.assembler.discard();
        }
    }

    fn handle_pat(&mut self, section: &[u8], diag: &mut Diagnostics) {
        if !section_crc_ok(section) {
            diag.incr(Counter::CrcError);
            return;
        }
        let pat = match parse_pat(section) {
            Ok(pat) => pat,
            Err(e) => {
                debug!("bad PAT: {}", e);
                diag.incr(Counter::MalformedHeader);
                return;
            }
        };
        let pmt_pid = pat.first_program_pid();
        if pmt_pid.is_some() && pmt_pid != self.pmt_pid {
            debug!("following PMT on PID {:#x}", pmt_pid.unwrap_or_default());
            self.pmt_pid = pmt_pid;
            self.pmt_sections.reset();
        }
    }

    fn handle_pmt<S: DemuxSink>(
        &mut self,
        section: &[u8],
        sink: &mut S,
        diag: &mut Diagnostics,
    ) {
        if !section_crc_ok(section) {
            diag.incr(Counter::CrcError);
            return;
        }
        let pmt = match parse_pmt(section) {
            Ok(pmt) => pmt,
            Err(e) => {
                debug!("bad PMT: {}", e);
                diag.incr(Counter::MalformedHeader);
                return;
            }
        };
        if self.pmt.as_ref() == Some(&pmt) {
            return;
        }

        let video = pmt
            .elementary_stream_infos
            .iter()
            .find(|es| is_video_stream_type(es.stream_type));
        let table = PidTable {
            pcr_pid: pmt.pcr_pid,
            video_pid: video.map(|es| es.elementary_pid),
            video_stream_type: video.map(|es| es.stream_type).unwrap_or_default(),
            audio_pids: pmt
                .elementary_stream_infos
                .iter()
                .filter(|es| es.stream_type == STREAM_TYPE_ADTS_AAC)
                .map(|es| es.elementary_pid)
                .collect(),
        };
        debug!("PMT version {}: {:?}", pmt.version, table);
        self.pmt = Some(pmt);
        if table == self.table {
            return;
        }

        // frames of the old layout go out before the change is announced
        self.flush_streams(sink, diag);
        self.rebuild_streams(&table);
        info!(
            "programme layout: video {:?} (type {:#x}), {} audio streams",
            table.video_pid,
            table.video_stream_type,
            table.audio_pids.len()
        );
        self.table = table;
        sink.on_pid_table(&self.table);
    }

    fn rebuild_streams(&mut self, table: &PidTable) {
        let keep_video = matches!(
            (&self.video, table.video_pid),
            (Some(v), Some(pid)) if v.pid == pid && v.parser.stream_type() == table.video_stream_type
        );
        if !keep_video {
            self.video = table.video_pid.and_then(|pid| {
                VideoParser::for_stream_type(table.video_stream_type).map(|parser| VideoStream {
                    pid,
                    assembler: PesAssembler::new(),
                    parser,
                })
            });
        }

        let mut old: Vec<AudioStream> = std::mem::take(&mut self.audio);
        for (idx, &pid) in table.audio_pids.iter().enumerate() {
            let stream = match old.iter().position(|a| a.pid == pid) {
                Some(i) if old[i].parser.audio_idx() as usize == idx => old.swap_remove(i),
                _ => AudioStream {
                    pid,
                    assembler: PesAssembler::new(),
                    parser: match &self.audio_decoder {
                        Some(factory) => AdtsParser::with_decoder(idx as u32, factory()),
                        None => AdtsParser::new(idx as u32),
                    },
                },
            };
            self.audio.push(stream);
        }
    }

    fn push_pes<S: DemuxSink>(
        &mut self,
        pid: u16,
        payload: &[u8],
        unit_start: bool,
        pos: i64,
        sink: &mut S,
        diag: &mut Diagnostics,
    ) {
        let clock = self.clock.clock_at(pos);
        if let Some(video) = self.video.as_mut().filter(|v| v.pid == pid) {
            if let Some(unit) = video
                .assembler
                .push(payload, unit_start, pos, clock, diag)
            {
                deliver_video(video, &unit, diag, sink);
            }
        } else if let Some(idx) = self.audio.iter().position(|a| a.pid == pid) {
            let audio = &mut self.audio[idx];
            if let Some(unit) = audio
                .assembler
                .push(payload, unit_start, pos, clock, diag)
            {
                deliver_audio(idx, audio, &unit, diag, sink);
            }
        }
    }

    fn flush_streams<S: DemuxSink>(&mut self, sink: &mut S, diag: &mut Diagnostics) {
        if let Some(video) = self.video.as_mut() {
            if let Some(unit) = video.assembler.flush(diag) {
                deliver_video(video, &unit, diag, sink);
            }
            let frames = video.parser.flush(diag);
            if !frames.is_empty() {
                sink.on_video_frames(&frames);
            }
        }
        for (idx, audio) in self.audio.iter_mut().enumerate() {
            if let Some(unit) = audio.assembler.flush(diag) {
                deliver_audio(idx, audio, &unit, diag, sink);
            }
        }
    }

    fn emit_anchor<S: DemuxSink>(&mut self, sink: &mut S) {
        let Some(now) = self.clock.now() else {
            return;
        };
        if self.next_anchor.is_some_and(|next| now < next) {
            return;
        }
        let interval = (self.config.anchor_interval_secs * MPEG_CLOCK_HZ as f64).max(1.0) as i64;
        self.next_anchor = Some(now + interval);
        sink.on_time_anchor(TimeAnchor {
            pts: now & PTS_MASK,
            wall_clock_ms: self.config.recording_start_ms + self.clock.elapsed_ms(),
        });
    }
}

fn deliver_video<S: DemuxSink>(
    video: &mut VideoStream,
    unit: &PayloadUnit,
    diag: &mut Diagnostics,
    sink: &mut S,
) {
    let frames = video.parser.parse_unit(unit, diag);
    if !frames.is_empty() {
        sink.on_video_frames(&frames);
    }
}

fn deliver_audio<S: DemuxSink>(
    idx: usize,
    audio: &mut AudioStream,
    unit: &PayloadUnit,
    diag: &mut Diagnostics,
    sink: &mut S,
) {
    let frames = audio.parser.parse_unit(unit, diag);
    if !frames.is_empty() {
        sink.on_audio_frames(idx, &frames);
    }
}
