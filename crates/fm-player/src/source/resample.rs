//! Rate adaptation for sources whose native rate differs from the output device.
//!
//! Wraps another [`SampleSource`] and runs its output through Rubato's sinc resampler in
//! fixed-size input blocks. The filter delay is trimmed from the start of the output, and
//! once the inner source finishes the resampler is flushed with silence until the output
//! reaches `input_frames * ratio`, so neither end of the track is shifted or cut.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use fm_player_types::TrackInfo;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use super::{Produced, SampleSource};

const CHANNELS: usize = 2;

pub struct ResampledSource {
    inner: Box<dyn SampleSource>,
    resampler: Async<f32>,
    dst_rate: u32,
    ratio: f64,
    chunk_in_frames: usize,
    /// Leading output frames that are filter delay, not signal.
    delay: usize,
    /// Delay frames still to discard.
    skip: usize,
    /// Source frames consumed since the last restart.
    in_frames: u64,
    /// Output frames kept since the last restart.
    out_frames: u64,
    in_buf: Vec<f32>,
    out_buf: Vec<f32>,
    /// Resampled stereo frames not yet handed out.
    pending: Vec<f32>,
    inner_done: bool,
}

impl ResampledSource {
    /// Resample `inner` to `dst_rate`, pulling `chunk_in_frames` source frames per step.
    pub fn new(inner: Box<dyn SampleSource>, dst_rate: u32, chunk_in_frames: usize) -> Result<Self> {
        let src_rate = inner.sample_rate();
        if src_rate == 0 || dst_rate == 0 {
            return Err(anyhow!("invalid resample {src_rate} Hz -> {dst_rate} Hz"));
        }
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let chunk_in_frames = chunk_in_frames.max(1);
        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_in_frames,
            CHANNELS,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;
        let out_frames = resampler.output_frames_max();
        let delay = resampler.output_delay();

        tracing::info!(
            src_rate_hz = src_rate,
            dst_rate_hz = dst_rate,
            chunk_in_frames,
            delay_frames = delay,
            "resampling source"
        );

        Ok(Self {
            inner,
            resampler,
            dst_rate,
            ratio: f_ratio,
            chunk_in_frames,
            delay,
            skip: delay,
            in_frames: 0,
            out_frames: 0,
            in_buf: Vec::with_capacity(chunk_in_frames * CHANNELS),
            out_buf: vec![0.0; out_frames * CHANNELS],
            pending: Vec::new(),
            inner_done: false,
        })
    }

    /// Output length matching the input consumed so far.
    fn target_frames(&self) -> u64 {
        (self.in_frames as f64 * self.ratio).round() as u64
    }

    /// Inner source finished and every output frame it implies has been handed out.
    fn exhausted(&self) -> bool {
        self.inner_done && self.out_frames >= self.target_frames()
    }

    /// Pull one block from the inner source (or silence, once it has finished) and
    /// resample it into `pending`.
    fn step(&mut self) -> Result<()> {
        self.in_buf.clear();
        let partial = if self.inner_done {
            // Flush: zeros push the remaining filter state out.
            None
        } else {
            let produced = self.inner.produce(self.chunk_in_frames, &mut self.in_buf)?;
            if produced.finished {
                self.inner_done = true;
            }
            if produced.frames == 0 {
                return Ok(());
            }
            self.in_frames += produced.frames as u64;
            (produced.frames < self.chunk_in_frames).then_some(produced.frames)
        };

        // Always hand Rubato a full block; a short final block is zero-padded.
        self.in_buf.resize(self.chunk_in_frames * CHANNELS, 0.0);
        let input = InterleavedSlice::new(&self.in_buf, CHANNELS, self.chunk_in_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let out_capacity = self.out_buf.len() / CHANNELS;
        let mut output = InterleavedSlice::new_mut(&mut self.out_buf, CHANNELS, out_capacity)
            .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: partial,
        };
        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;

        let skipped = self.skip.min(nbr_out);
        self.skip -= skipped;
        let mut kept = (nbr_out - skipped) as u64;
        if self.inner_done {
            kept = kept.min(self.target_frames().saturating_sub(self.out_frames));
        }
        let start = skipped * CHANNELS;
        self.pending
            .extend_from_slice(&self.out_buf[start..start + kept as usize * CHANNELS]);
        self.out_frames += kept;
        Ok(())
    }

    fn restart(&mut self) {
        self.resampler.reset();
        self.pending.clear();
        self.inner_done = false;
        self.skip = self.delay;
        self.in_frames = 0;
        self.out_frames = 0;
    }
}

impl SampleSource for ResampledSource {
    fn sample_rate(&self) -> u32 {
        self.dst_rate
    }

    fn produce(&mut self, max_frames: usize, out: &mut Vec<f32>) -> Result<Produced> {
        while self.pending.len() / CHANNELS < max_frames && !self.exhausted() {
            self.step()?;
        }
        let n = max_frames.min(self.pending.len() / CHANNELS);
        out.extend(self.pending.drain(..n * CHANNELS));
        Ok(Produced {
            frames: n,
            finished: self.exhausted() && self.pending.is_empty(),
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.inner.seek(seconds)?;
        self.restart();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()?;
        self.restart();
        Ok(())
    }

    fn track_info(&self) -> TrackInfo {
        self.inner.track_info()
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.inner.duration_seconds()
    }

    fn subsong_count(&self) -> usize {
        self.inner.subsong_count()
    }

    fn current_subsong(&self) -> usize {
        self.inner.current_subsong()
    }

    fn set_subsong(&mut self, index: usize) -> Result<()> {
        self.inner.set_subsong(index)?;
        self.restart();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawPcmSource, ToneSource};

    fn drain_all(src: &mut dyn SampleSource) -> usize {
        let mut out = Vec::new();
        let mut total = 0;
        loop {
            let p = src.produce(1_024, &mut out).unwrap();
            total += p.frames;
            if p.finished {
                return total;
            }
            assert_eq!(p.frames, 1_024);
        }
    }

    #[test]
    fn output_length_follows_ratio() {
        let tone = ToneSource::new(49_716, 440.0, 1.0);
        let mut src = ResampledSource::new(Box::new(tone), 48_000, 1_024).unwrap();
        assert_eq!(src.sample_rate(), 48_000);

        assert_eq!(drain_all(&mut src), 48_000);
    }

    #[test]
    fn impulse_keeps_its_position() {
        // 0.1 s at 44.1 kHz with one click at frame 1000.
        let mut data = vec![0u8; 4_410 * 4];
        let click = 16_384i16.to_le_bytes();
        data[4_000..4_002].copy_from_slice(&click);
        data[4_002..4_004].copy_from_slice(&click);
        let raw = RawPcmSource::new(data, 44_100);
        let mut src = ResampledSource::new(Box::new(raw), 48_000, 512).unwrap();

        let mut out = Vec::new();
        while !src.produce(1_024, &mut out).unwrap().finished {}
        assert_eq!(out.len() / 2, 4_800);

        let peak = out
            .chunks_exact(2)
            .enumerate()
            .max_by(|a, b| a.1[0].abs().total_cmp(&b.1[0].abs()))
            .map(|(i, _)| i)
            .unwrap();
        // 1000 * 48000 / 44100 = 1088.4
        assert!((1_087..=1_089).contains(&peak), "peak at {peak}");
    }

    #[test]
    fn tail_is_flushed() {
        // The last 20 ms are loud; they must survive to the end of the output.
        let mut tone = ToneSource::new(44_100, 440.0, 0.5);
        let mut src = ResampledSource::new(Box::new(tone.clone()), 48_000, 1_024).unwrap();
        let mut out = Vec::new();
        while !src.produce(1_024, &mut out).unwrap().finished {}
        assert_eq!(out.len() / 2, 24_000);

        let mut reference = Vec::new();
        tone.produce(22_050, &mut reference).unwrap();
        let energy = |s: &[f32]| s.iter().map(|v| v * v).sum::<f32>() / s.len() as f32;
        let tail_in = energy(&reference[reference.len() - 2 * 882..]);
        let tail_out = energy(&out[out.len() - 2 * 960..]);
        assert!(tail_out > 0.5 * tail_in, "tail energy {tail_out} vs {tail_in}");
    }

    #[test]
    fn reset_restarts_stream() {
        let tone = ToneSource::new(44_100, 440.0, 0.25);
        let mut src = ResampledSource::new(Box::new(tone), 48_000, 512).unwrap();
        let first = drain_all(&mut src);
        src.reset().unwrap();
        assert_eq!(drain_all(&mut src), first);
    }

    #[test]
    fn metadata_is_forwarded() {
        let tone = ToneSource::with_pitches(44_100, vec![100.0, 200.0], 0.5);
        let mut src = ResampledSource::new(Box::new(tone), 48_000, 512).unwrap();
        assert_eq!(src.subsong_count(), 2);
        src.set_subsong(1).unwrap();
        assert_eq!(src.current_subsong(), 1);
        assert_eq!(src.duration_seconds(), Some(0.5));
    }
}
