use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use fm_player_types::{PlaybackEndReason, PlaybackState, PlayerStatus, TrackInfo};

use crate::render::RenderStats;

/// Shared playback status updated by the player thread.
///
/// Never touched from the audio callback; render-side counters are read through
/// [`RenderStats`] atomics at snapshot time.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    pub state: PlaybackState,
    /// Metadata of the attached track.
    pub track: Option<TrackInfo>,
    /// Elapsed track position in output frames.
    pub elapsed_frames: Option<u64>,
    /// Total track duration in milliseconds when known.
    pub duration_ms: Option<u64>,
    /// Effective output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Effective output channel count.
    pub channels: Option<u16>,
    /// Selected output device name.
    pub device: Option<String>,
    /// Zero-based subsong index and subsong count.
    pub subsong: Option<(usize, usize)>,
    pub loop_enabled: bool,
    /// Counters published by the render loop.
    pub render_stats: Option<Arc<RenderStats>>,
    /// Buffered-duration cap in frames.
    pub buffer_capacity_frames: Option<u64>,
    /// Terminal playback reason from the current run.
    pub end_reason: Option<PlaybackEndReason>,
}

impl PlayerStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Return a snapshot for the UI layer.
    pub fn snapshot(&self) -> PlayerStatus {
        let elapsed_ms = match (self.elapsed_frames, self.sample_rate) {
            (Some(frames), Some(sr)) if sr > 0 => Some(frames.saturating_mul(1000) / sr as u64),
            _ => None,
        };
        let stat = |f: fn(&RenderStats) -> u64| self.render_stats.as_deref().map(f);
        PlayerStatus {
            state: self.state,
            track: self.track.clone(),
            elapsed_ms,
            duration_ms: self.duration_ms,
            sample_rate: self.sample_rate,
            channels: self.channels,
            device: self.device.clone(),
            subsong: self.subsong.map(|(current, _)| current + 1),
            subsong_count: self.subsong.map(|(_, count)| count),
            loop_enabled: self.loop_enabled,
            underrun_frames: stat(|s| s.underrun_frames.load(Ordering::Relaxed)),
            underrun_events: stat(|s| s.underrun_events.load(Ordering::Relaxed)),
            dropped_chunks: stat(|s| s.dropped_chunks.load(Ordering::Relaxed)),
            buffered_frames: stat(|s| s.buffered_frames.load(Ordering::Relaxed)),
            buffer_capacity_frames: self.buffer_capacity_frames,
            end_reason: self.end_reason,
        }
    }

    /// Clear track-specific fields when playback ends.
    pub fn clear_playback(&mut self) {
        self.track = None;
        self.elapsed_frames = None;
        self.duration_ms = None;
        self.subsong = None;
    }
}
