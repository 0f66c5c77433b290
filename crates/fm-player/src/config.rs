//! Pipeline tuning shared by the render and refill sides.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Default low-water mark: covers typical producer scheduling jitter at ~44.1 kHz.
pub const DEFAULT_LOW_WATER_FRAMES: usize = 16_384;

/// Default position reporting interval (~33 ms at 44.1 kHz, a ~30 Hz UI refresh).
pub const DEFAULT_POSITION_INTERVAL_FRAMES: u64 = 1_470;

/// Default clock rebase threshold.
pub const DEFAULT_CLOCK_REBASE_FRAMES: u64 = 1 << 32;

/// Playback tuning parameters.
///
/// Every field has a default, so a TOML file only needs the keys it overrides.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Preferred output sample rate; `None` uses the device's best rate.
    pub sample_rate: Option<u32>,
    /// Requested host callback size in frames.
    pub quantum_frames: u32,
    /// Frames pulled from the source per chunk.
    pub chunk_frames: usize,
    /// Cap on buffered audio, in seconds at the output rate.
    pub max_buffer_seconds: f32,
    /// A refill is requested while fewer frames than this are buffered.
    pub low_water_frames: usize,
    /// Buffered level the controller refills up to.
    pub target_buffer_frames: usize,
    /// Largest refill performed for a single request.
    pub max_request_frames: usize,
    /// Clock advance between position signals.
    pub position_interval_frames: u64,
    /// Clock value at which the render side rebases its frame counter.
    pub clock_rebase_frames: u64,
    /// Capacity of the producer→render message ring.
    pub command_capacity: usize,
    /// Capacity of the render→producer signal channel.
    pub signal_capacity: usize,
    /// Maximum chunks held by the render-side queue.
    pub max_chunks: usize,
    /// Rewind and keep playing at end of track.
    pub loop_enabled: bool,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-risk playback at 44.1/48 kHz.
    fn default() -> Self {
        Self {
            sample_rate: None,
            quantum_frames: 128,
            chunk_frames: 1024,
            max_buffer_seconds: 2.0,
            low_water_frames: DEFAULT_LOW_WATER_FRAMES,
            target_buffer_frames: 32_768,
            max_request_frames: 16_384,
            position_interval_frames: DEFAULT_POSITION_INTERVAL_FRAMES,
            clock_rebase_frames: DEFAULT_CLOCK_REBASE_FRAMES,
            command_capacity: 256,
            signal_capacity: 256,
            max_chunks: 512,
            loop_enabled: false,
        }
    }
}

impl PlaybackConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlaybackConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Buffered-frame cap at `rate_hz`.
    pub fn max_buffered_frames(&self, rate_hz: u32) -> usize {
        max_buffered_frames(rate_hz, self.max_buffer_seconds)
    }

    /// Reject thresholds that would starve or overflow the pipeline at `rate_hz`.
    pub fn validate(&self, rate_hz: u32) -> Result<()> {
        if self.quantum_frames == 0 || self.chunk_frames == 0 || self.max_request_frames == 0 {
            return Err(anyhow!("quantum, chunk and request sizes must be non-zero"));
        }
        if self.position_interval_frames == 0 || self.clock_rebase_frames == 0 {
            return Err(anyhow!("clock intervals must be non-zero"));
        }
        if self.command_capacity == 0 || self.signal_capacity == 0 || self.max_chunks == 0 {
            return Err(anyhow!("channel capacities must be non-zero"));
        }
        if self.low_water_frames >= self.target_buffer_frames {
            return Err(anyhow!(
                "low_water_frames ({}) must be below target_buffer_frames ({})",
                self.low_water_frames,
                self.target_buffer_frames
            ));
        }
        let prime_chunks = self.target_buffer_frames.div_ceil(self.chunk_frames);
        let chunk_slots = self.command_capacity.min(self.max_chunks);
        if prime_chunks > chunk_slots {
            return Err(anyhow!(
                "target_buffer_frames ({}) needs {prime_chunks} chunks of {} frames, \
                 more than the {chunk_slots} chunk slots",
                self.target_buffer_frames,
                self.chunk_frames
            ));
        }
        let cap = self.max_buffered_frames(rate_hz);
        if self.target_buffer_frames > cap {
            return Err(anyhow!(
                "target_buffer_frames ({}) exceeds the {} frame cap at {rate_hz} Hz",
                self.target_buffer_frames,
                cap
            ));
        }
        Ok(())
    }
}

/// Compute a buffered-frame cap for a `(rate, seconds)` target.
///
/// - If `buffer_seconds` is non-finite or `<= 0.0`, a 2 second fallback is used.
/// - The returned value is `ceil(rate_hz * buffer_seconds)`.
pub fn max_buffered_frames(rate_hz: u32, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    (rate_hz as f64 * secs as f64).ceil() as usize
}
