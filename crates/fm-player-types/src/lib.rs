use serde::{Deserialize, Serialize};

/// Controller lifecycle as seen by observers.
///
/// `Idle → Loaded → Playing ⇄ Paused → Stopped`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No source has been attached yet.
    #[default]
    Idle,
    /// A source is attached but playback has not started.
    Loaded,
    /// Samples are being pulled and rendered.
    Playing,
    /// Rendering is suspended; buffered audio is kept for instant resume.
    Paused,
    /// The render side was cleared and the source detached.
    Stopped,
}

/// Reason why playback ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the track.
    Eof,
    /// The source could not produce any audio.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Descriptive metadata reported by a sample source.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    /// Song title, if the format carries one.
    pub title: Option<String>,
    /// Composer/author.
    pub author: Option<String>,
    /// Human-readable format name (for example `AdLib RAD` or `WAV`).
    pub format: Option<String>,
    /// Free-form description or comment block.
    pub description: Option<String>,
}

impl TrackInfo {
    /// Best label for display: the title when present, otherwise the format name.
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.format.as_deref())
            .unwrap_or("untitled")
    }
}

/// Read-only playback projection handed to the UI layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Current controller state.
    pub state: PlaybackState,
    /// Metadata of the attached track.
    pub track: Option<TrackInfo>,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Total track duration in milliseconds, when the source knows it.
    pub duration_ms: Option<u64>,
    /// Output sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Active output device name.
    pub device: Option<String>,
    /// Current subsong (1-based).
    pub subsong: Option<usize>,
    /// Number of subsongs in the track.
    pub subsong_count: Option<usize>,
    /// Whether end-of-track rewinds and keeps playing.
    pub loop_enabled: bool,
    /// Silent frames emitted because the queue ran dry.
    pub underrun_frames: Option<u64>,
    /// Quanta that contained at least one underrun frame.
    pub underrun_events: Option<u64>,
    /// Chunks dropped by the buffered-duration cap.
    pub dropped_chunks: Option<u64>,
    /// Frames currently buffered on the render side.
    pub buffered_frames: Option<u64>,
    /// Buffered-duration cap in frames.
    pub buffer_capacity_frames: Option<u64>,
    /// Why the last track ended.
    pub end_reason: Option<PlaybackEndReason>,
}
