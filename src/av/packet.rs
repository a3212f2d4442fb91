use bytes::Bytes;

/// One reassembled elementary-stream payload, as handed to a frame parser.
///
/// Timestamps are raw 33-bit values straight from the PES header.
#[derive(Debug, Clone, Default)]
pub struct PayloadUnit {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Transport clock (90 kHz, extended) at the first byte of the unit.
    pub clock: Option<i64>,
    /// Byte offset of the first transport packet of the unit.
    pub file_offset: i64,
}

impl PayloadUnit {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_clock(mut self, clock: i64) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_file_offset(mut self, offset: i64) -> Self {
        self.file_offset = offset;
        self
    }
}
