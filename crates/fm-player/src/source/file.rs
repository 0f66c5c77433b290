//! Symphonia-backed file source.
//!
//! Decodes packets on demand from the refill thread and folds every channel layout to
//! stereo. Decode errors on single packets are skipped; a read error other than end of
//! stream is returned to the caller.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fm_player_types::TrackInfo;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::{Produced, SampleSource, append_stereo};

pub struct FileSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    rate: u32,
    duration: Option<f64>,
    info: TrackInfo,
    /// Decoded stereo frames not yet handed out.
    pending: Vec<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    eof: bool,
}

impl FileSource {
    /// Probe and open `path` for decoding.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .with_context(|| format!("probe {:?}", path))?;

        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let rate = params
            .sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .context("create decoder")?;

        let mut info = TrackInfo {
            format: codec_name_from_params(&params).map(str::to_string),
            ..Default::default()
        };
        if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            apply_tags(rev.tags(), &mut info);
        }
        if let Some(rev) = format.metadata().current() {
            apply_tags(rev.tags(), &mut info);
        }
        if info.title.is_none() {
            info.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
        }

        tracing::info!(
            path = %path.display(),
            rate_hz = rate,
            channels = params.channels.map(|c| c.count()),
            codec = info.format.as_deref().unwrap_or("unknown"),
            "opened file source"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            rate,
            duration: duration_secs_from_codec_params(&params),
            info,
            pending: Vec::new(),
            sample_buf: None,
            eof: false,
        })
    }

    /// Decode the next packet of our track into `pending`.
    fn decode_next(&mut self) -> Result<()> {
        let packet = match self.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => {
                self.eof = true;
                return Ok(());
            }
            Err(e) => return Err(anyhow!(e).context("read packet")),
        };
        if packet.track_id() != self.track_id {
            return Ok(());
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = e, "skipping undecodable packet");
                return Ok(());
            }
            Err(e) => return Err(anyhow!(e).context("decode packet")),
        };

        let spec = *decoded.spec();
        let frames = decoded.capacity() as u64;
        let needed = frames as usize * spec.channels.count();
        if self
            .sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < needed)
        {
            self.sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        let Some(buf) = self.sample_buf.as_mut() else {
            return Ok(());
        };
        buf.copy_interleaved_ref(decoded);
        append_stereo(buf.samples(), spec.channels.count(), &mut self.pending);
        Ok(())
    }
}

impl SampleSource for FileSource {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn produce(&mut self, max_frames: usize, out: &mut Vec<f32>) -> Result<Produced> {
        while self.pending.len() / 2 < max_frames && !self.eof {
            self.decode_next()?;
        }
        let n = max_frames.min(self.pending.len() / 2);
        out.extend(self.pending.drain(..n * 2));
        Ok(Produced {
            frames: n,
            finished: self.eof && self.pending.is_empty(),
        })
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let time = Time::new(seconds.trunc() as u64, seconds.fract());
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .with_context(|| format!("seek to {seconds:.3}s"))?;
        self.decoder.reset();
        self.pending.clear();
        self.eof = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.seek(0.0)
    }

    fn track_info(&self) -> TrackInfo {
        self.info.clone()
    }

    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }
}

fn apply_tags(tags: &[symphonia::core::meta::Tag], info: &mut TrackInfo) {
    for tag in tags {
        let slot = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => &mut info.title,
            Some(StandardTagKey::Artist) | Some(StandardTagKey::Composer) => &mut info.author,
            Some(StandardTagKey::Comment) => &mut info.description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(tag.value.to_string());
        }
    }
}

fn duration_secs_from_codec_params(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate?;
    if rate == 0 {
        return None;
    }
    Some(frames as f64 / rate as f64)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV writer.
    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut f = File::create(path).unwrap();
        f.write_all(b"RIFF").unwrap();
        f.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        f.write_all(b"WAVEfmt ").unwrap();
        f.write_all(&16u32.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&channels.to_le_bytes()).unwrap();
        f.write_all(&rate.to_le_bytes()).unwrap();
        f.write_all(&(rate * channels as u32 * 2).to_le_bytes()).unwrap();
        f.write_all(&(channels * 2).to_le_bytes()).unwrap();
        f.write_all(&16u16.to_le_bytes()).unwrap();
        f.write_all(b"data").unwrap();
        f.write_all(&data_len.to_le_bytes()).unwrap();
        for s in samples {
            f.write_all(&s.to_le_bytes()).unwrap();
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fm-player-{}-{name}", std::process::id()))
    }

    #[test]
    fn decodes_mono_wav_to_stereo() {
        let path = temp_path("mono.wav");
        let samples: Vec<i16> = (0..1_000).map(|i| (i * 16) as i16).collect();
        write_wav(&path, 8_000, 1, &samples);

        let mut src = FileSource::open(&path).unwrap();
        assert_eq!(src.sample_rate(), 8_000);
        assert_eq!(src.duration_seconds(), Some(1_000.0 / 8_000.0));

        let mut out = Vec::new();
        let mut total = 0;
        loop {
            let p = src.produce(256, &mut out).unwrap();
            total += p.frames;
            if p.finished {
                break;
            }
            assert_eq!(p.frames, 256);
        }
        assert_eq!(total, 1_000);
        assert_eq!(out[2], out[3]);
        assert!((out[2] - 16.0 / 32_768.0).abs() < 1e-6);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reset_replays_from_start() {
        let path = temp_path("reset.wav");
        write_wav(&path, 8_000, 2, &vec![1_000i16; 2 * 400]);

        let mut src = FileSource::open(&path).unwrap();
        let mut out = Vec::new();
        while !src.produce(512, &mut out).unwrap().finished {}
        src.reset().unwrap();

        let mut again = Vec::new();
        let p = src.produce(100, &mut again).unwrap();
        assert_eq!(p.frames, 100);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = FileSource::open(Path::new("/nonexistent/track.wav")).err().unwrap();
        assert!(format!("{err:#}").contains("open"));
    }
}
