// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Constants
pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
/// 188-byte packet followed by a 4-byte timestamp trailer.
pub const TS_PACKET_SIZE_192: usize = 192;
pub const TS_HEADER_SIZE: usize = 4;
pub const PCR_HZ: i64 = 27_000_000;
/// PCR base is 33 bits of 90 kHz, extension counts 300 per tick.
pub const PCR_WRAP: i64 = (1 << 33) * 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub program_map_pid: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub entries: Vec<PatEntry>,
}

impl Pat {
    /// PMT PID of the first real program (program number 0 is the NIT).
    pub fn first_program_pid(&self) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.program_number != 0)
            .map(|e| e.program_map_pid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pmt {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    /// 27 MHz value, base * 300 + extension.
    pub pcr: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

/// The programme layout the demuxer currently follows, derived from the PMT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidTable {
    pub pcr_pid: u16,
    pub video_pid: Option<u16>,
    pub video_stream_type: u8,
    /// ADTS audio PIDs in PMT order; the position is the audio index.
    pub audio_pids: Vec<u16>,
}
