use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the stream controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    /// Pre-flight probe in progress
    Connecting,
    Live,
    Stopped,
    Error,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Connecting => "connecting",
            StreamState::Live => "live",
            StreamState::Stopped => "stopped",
            StreamState::Error => "error",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, StreamState::Live)
    }

    /// States from which `start` may begin a new session.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            StreamState::Idle | StreamState::Stopped | StreamState::Error
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel order of a 4-channel pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelLayout {
    #[default]
    Rgba8,
    Bgra8,
}

impl PixelLayout {
    pub const fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Snapshot of the most recent camera frame.
///
/// The pixel buffer is shared and immutable: a frame source that renders a
/// new frame swaps in a fresh buffer instead of writing into this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSample {
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl FrameSample {
    /// RGBA sample
    pub fn new(pixels: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            layout: PixelLayout::Rgba8,
        }
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of bytes a complete buffer of these dimensions holds
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }

    pub fn is_complete(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() >= self.expected_len()
    }
}

/// JPEG bytes produced from one `FrameSample`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl EncodedFrame {
    pub const CONTENT_TYPE: &'static str = "image/jpeg";

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Read model consumed by the GUI shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub frames_sent: u64,
    pub last_message: String,
    /// Incremented every time `last_message` is rewritten
    pub message_updates: u64,
    pub last_error: Option<String>,
    pub session_id: Option<String>,
}

/// Why a tick did not upload anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotLive,
    /// The previous upload of this session is still outstanding
    Busy,
    NoFrame,
    EncodeFailed(String),
}

/// Result of one capture-encode-upload tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Delivered { frames_sent: u64 },
    Rejected { status: u16 },
    /// Transport failure, swallowed without touching the status line
    Dropped { reason: String },
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped(_))
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, TickOutcome::Delivered { .. })
    }
}
