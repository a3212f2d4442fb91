/// Kind of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    /// The program map changed; carries the new audio stream count.
    PidTableChanged,
    /// A video frame was coded with different parameters than its predecessor.
    VideoFormatChanged,
    /// An audio stream changed layout or sample rate.
    AudioFormatChanged,
}

impl StreamEventKind {
    pub fn to_i32(self) -> i32 {
        match self {
            StreamEventKind::PidTableChanged => 1,
            StreamEventKind::VideoFormatChanged => 2,
            StreamEventKind::AudioFormatChanged => 3,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(StreamEventKind::PidTableChanged),
            2 => Some(StreamEventKind::VideoFormatChanged),
            3 => Some(StreamEventKind::AudioFormatChanged),
            _ => None,
        }
    }
}

/// A discrete format change notice anchored at a frame index.
///
/// `frame_idx` points into the video frame list for table and video changes,
/// and into the audio frame list for audio changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub frame_idx: i32,
    pub num_audio: i32,
    pub audio_idx: i32,
}

impl StreamEvent {
    pub fn pid_table(frame_idx: i32, num_audio: i32) -> Self {
        Self {
            kind: StreamEventKind::PidTableChanged,
            frame_idx,
            num_audio,
            audio_idx: 0,
        }
    }

    pub fn video_format(frame_idx: i32) -> Self {
        Self {
            kind: StreamEventKind::VideoFormatChanged,
            frame_idx,
            num_audio: 0,
            audio_idx: 0,
        }
    }

    pub fn audio_format(frame_idx: i32, audio_idx: i32) -> Self {
        Self {
            kind: StreamEventKind::AudioFormatChanged,
            frame_idx,
            num_audio: 0,
            audio_idx,
        }
    }
}

/// A decoded caption line with its raw presentation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptionItem {
    /// Raw 33-bit PTS.
    pub pts: i64,
    /// Display duration in 90 kHz ticks, -1 when the line lasts until the next one.
    pub duration: i64,
    pub lang_index: i32,
    pub text: String,
}

/// Pairs a transport-clock reading with wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeAnchor {
    /// Raw 33-bit 90 kHz clock value.
    pub pts: i64,
    /// Milliseconds since the Unix epoch.
    pub wall_clock_ms: i64,
}
