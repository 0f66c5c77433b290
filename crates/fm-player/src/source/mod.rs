//! Sample sources: the producer-side contract and its adapters.
//!
//! A [`SampleSource`] wraps whatever engine generates audio (an FM/tracker synth, a
//! decoded file, a test tone) behind one narrow call: "append up to N frames of
//! interleaved stereo `f32`". The refill controller is the only caller.

mod convert;
mod file;
mod raw;
mod resample;
mod tone;

use anyhow::{Result, anyhow};
use fm_player_types::TrackInfo;

pub use convert::{append_stereo, s16le_to_f32};
pub use file::FileSource;
pub use raw::RawPcmSource;
pub use resample::ResampledSource;
pub use tone::ToneSource;

/// Outcome of a [`SampleSource::produce`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Produced {
    /// Stereo frames appended to the output buffer.
    pub frames: usize,
    /// The source has nothing more to give until it is rewound.
    pub finished: bool,
}

impl Produced {
    pub fn more(frames: usize) -> Self {
        Self {
            frames,
            finished: false,
        }
    }

    pub fn last(frames: usize) -> Self {
        Self {
            frames,
            finished: true,
        }
    }
}

/// Producer of interleaved stereo `f32` PCM.
///
/// `produce` may return fewer frames than requested only when it also reports
/// `finished`. Calls after `finished` return zero frames until `seek`/`reset`.
pub trait SampleSource: Send {
    /// Native rate of the produced samples.
    fn sample_rate(&self) -> u32;

    /// Append up to `max_frames` frames to `out`.
    fn produce(&mut self, max_frames: usize, out: &mut Vec<f32>) -> Result<Produced>;

    /// Reposition to `seconds` from the start of the current subsong.
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Rewind to the start of the current subsong.
    fn reset(&mut self) -> Result<()>;

    fn track_info(&self) -> TrackInfo {
        TrackInfo::default()
    }

    /// Length of the current subsong, when known.
    fn duration_seconds(&self) -> Option<f64> {
        None
    }

    fn subsong_count(&self) -> usize {
        1
    }

    /// Zero-based index of the active subsong.
    fn current_subsong(&self) -> usize {
        0
    }

    /// Switch subsong and rewind to its start.
    fn set_subsong(&mut self, index: usize) -> Result<()> {
        if index == 0 {
            self.reset()
        } else {
            Err(anyhow!("subsong {index} out of range (1 available)"))
        }
    }
}

/// Convert a seek target to a frame index, clamped to `[0, total]`.
pub(crate) fn seconds_to_frame(seconds: f64, rate: u32, total: usize) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    ((seconds * rate as f64).round() as usize).min(total)
}
