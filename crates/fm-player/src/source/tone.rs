//! Two-operator FM tone generator.
//!
//! A sine modulator drives the phase of a sine carrier; the modulation index decays over
//! each note so the timbre goes from bright to pure, like a plucked FM patch. Each
//! configured pitch is exposed as its own subsong.

use std::f64::consts::TAU;

use anyhow::{Result, anyhow};
use fm_player_types::TrackInfo;

use super::{Produced, SampleSource, seconds_to_frame};

/// Deterministic FM voice with a fixed length.
#[derive(Clone, Debug)]
pub struct ToneSource {
    rate: u32,
    pitches: Vec<f64>,
    subsong: usize,
    total_frames: usize,
    pos: usize,
    ratio: f64,
    index: f64,
    amplitude: f32,
}

impl ToneSource {
    /// A single tone at `freq_hz` lasting `seconds`.
    pub fn new(rate: u32, freq_hz: f64, seconds: f64) -> Self {
        Self::with_pitches(rate, vec![freq_hz], seconds)
    }

    /// One subsong per pitch, each lasting `seconds`.
    pub fn with_pitches(rate: u32, pitches: Vec<f64>, seconds: f64) -> Self {
        let rate = rate.max(1);
        let pitches = if pitches.is_empty() {
            vec![440.0]
        } else {
            pitches
        };
        Self {
            rate,
            pitches,
            subsong: 0,
            total_frames: seconds_to_frame(seconds, rate, usize::MAX),
            pos: 0,
            ratio: 2.0,
            index: 3.0,
            amplitude: 0.25,
        }
    }

    /// Frame index of the next produced frame.
    pub fn position_frames(&self) -> usize {
        self.pos
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    fn sample_at(&self, frame: usize) -> f32 {
        let t = frame as f64 / self.rate as f64;
        let carrier = self.pitches[self.subsong];
        let decay = (-3.0 * t).exp();
        let modulator = (TAU * carrier * self.ratio * t).sin();
        let phase = TAU * carrier * t + self.index * decay * modulator;
        phase.sin() as f32 * self.amplitude
    }
}

impl SampleSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn produce(&mut self, max_frames: usize, out: &mut Vec<f32>) -> Result<Produced> {
        let n = max_frames.min(self.total_frames - self.pos);
        out.reserve(n * 2);
        for frame in self.pos..self.pos + n {
            let s = self.sample_at(frame);
            out.push(s);
            out.push(s);
        }
        self.pos += n;
        Ok(Produced {
            frames: n,
            finished: self.pos >= self.total_frames,
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.pos = seconds_to_frame(seconds, self.rate, self.total_frames);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn track_info(&self) -> TrackInfo {
        TrackInfo {
            title: Some(format!("{:.1} Hz", self.pitches[self.subsong])),
            author: None,
            format: Some("FM tone".to_string()),
            description: Some(format!(
                "2-op FM, ratio {:.1}, index {:.1}",
                self.ratio, self.index
            )),
        }
    }

    fn duration_seconds(&self) -> Option<f64> {
        Some(self.total_frames as f64 / self.rate as f64)
    }

    fn subsong_count(&self) -> usize {
        self.pitches.len()
    }

    fn current_subsong(&self) -> usize {
        self.subsong
    }

    fn set_subsong(&mut self, index: usize) -> Result<()> {
        if index >= self.pitches.len() {
            return Err(anyhow!(
                "subsong {index} out of range ({} available)",
                self.pitches.len()
            ));
        }
        self.subsong = index;
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_exact_length_then_finishes() {
        let mut tone = ToneSource::new(1_000, 100.0, 1.0);
        let mut out = Vec::new();

        let p = tone.produce(600, &mut out).unwrap();
        assert_eq!(p, Produced::more(600));
        let p = tone.produce(600, &mut out).unwrap();
        assert_eq!(p, Produced::last(400));
        assert_eq!(out.len(), 2_000);

        let p = tone.produce(600, &mut out).unwrap();
        assert_eq!(p, Produced::last(0));
    }

    #[test]
    fn output_is_bounded_and_deterministic() {
        let mut a = ToneSource::new(8_000, 220.0, 0.5);
        let mut b = a.clone();
        let (mut va, mut vb) = (Vec::new(), Vec::new());
        a.produce(4_000, &mut va).unwrap();
        b.produce(4_000, &mut vb).unwrap();
        assert_eq!(va, vb);
        assert!(va.iter().all(|s| s.abs() <= 0.25));
        assert!(va.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn seek_clamps_to_length() {
        let mut tone = ToneSource::new(1_000, 100.0, 2.0);
        tone.seek(0.5).unwrap();
        assert_eq!(tone.position_frames(), 500);
        tone.seek(10.0).unwrap();
        assert_eq!(tone.position_frames(), 2_000);
        tone.seek(-1.0).unwrap();
        assert_eq!(tone.position_frames(), 0);
    }

    #[test]
    fn subsongs_select_pitch_and_rewind() {
        let mut tone = ToneSource::with_pitches(1_000, vec![100.0, 200.0], 1.0);
        tone.seek(0.5).unwrap();
        tone.set_subsong(1).unwrap();
        assert_eq!(tone.current_subsong(), 1);
        assert_eq!(tone.position_frames(), 0);
        assert_eq!(tone.track_info().title.as_deref(), Some("200.0 Hz"));
        assert!(tone.set_subsong(2).is_err());
    }
}
