//! In-memory signed 16-bit little-endian stereo PCM.
//!
//! This is the shape OPL-style engines render into (int16 stereo at the chip rate), so
//! a dump of such an engine's output can be played back bit-exact.

use std::path::Path;

use anyhow::{Context, Result};
use fm_player_types::TrackInfo;

use super::{Produced, SampleSource, s16le_to_f32, seconds_to_frame};

const BYTES_PER_FRAME: usize = 4;

pub struct RawPcmSource {
    data: Vec<u8>,
    rate: u32,
    pos: usize,
    title: Option<String>,
}

impl RawPcmSource {
    /// Wrap raw bytes. A trailing partial frame is ignored.
    pub fn new(data: Vec<u8>, rate: u32) -> Self {
        Self {
            data,
            rate: rate.max(1),
            pos: 0,
            title: None,
        }
    }

    /// Read a whole file into memory.
    pub fn open(path: &Path, rate: u32) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
        let mut src = Self::new(data, rate);
        src.title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
        Ok(src)
    }

    pub fn total_frames(&self) -> usize {
        self.data.len() / BYTES_PER_FRAME
    }
}

impl SampleSource for RawPcmSource {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn produce(&mut self, max_frames: usize, out: &mut Vec<f32>) -> Result<Produced> {
        let total = self.total_frames();
        let n = max_frames.min(total - self.pos);
        let bytes = &self.data[self.pos * BYTES_PER_FRAME..(self.pos + n) * BYTES_PER_FRAME];
        out.reserve(n * 2);
        for pair in bytes.chunks_exact(2) {
            out.push(s16le_to_f32([pair[0], pair[1]]));
        }
        self.pos += n;
        Ok(Produced {
            frames: n,
            finished: self.pos >= total,
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.pos = seconds_to_frame(seconds, self.rate, self.total_frames());
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn track_info(&self) -> TrackInfo {
        TrackInfo {
            title: self.title.clone(),
            format: Some("PCM s16le stereo".to_string()),
            ..Default::default()
        }
    }

    fn duration_seconds(&self) -> Option<f64> {
        Some(self.total_frames() as f64 / self.rate as f64)
    }
}
