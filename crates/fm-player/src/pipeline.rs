//! Audio session wiring: device → transport → output stream → player thread.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;

use crate::config::PlaybackConfig;
use crate::player::{PlayerHandle, spawn_player};
use crate::status::PlayerStatusState;
use crate::{device, playback, transport};

/// A running output stream with its player thread.
///
/// Dropping the session stops the stream; call [`AudioSession::shutdown`] to also stop
/// playback and join the player thread.
pub struct AudioSession {
    stream: cpal::Stream,
    player: PlayerHandle,
    status: Arc<Mutex<PlayerStatusState>>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSession {
    /// Open the output device and start streaming silence until a track is loaded.
    ///
    /// Failing to create or start the stream is the one fatal pipeline error.
    pub fn start(device_name: Option<&str>, cfg: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, device_name)?;
        let supported = device::pick_output_config(&device, cfg.sample_rate)?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();
        let sample_format = supported.sample_format();

        cfg.validate(sample_rate)
            .with_context(|| format!("playback config at {sample_rate} Hz"))?;

        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(size) = device::pick_buffer_size(&supported, cfg.quantum_frames) {
            stream_config.buffer_size = size;
        }

        let name = device::device_name(&device);
        tracing::info!(
            device = name.as_deref().unwrap_or("unknown"),
            rate_hz = sample_rate,
            channels,
            format = ?sample_format,
            buffer = ?stream_config.buffer_size,
            "opening output"
        );

        let (link, render, signals) = transport::channel(cfg, sample_rate);
        let stats = render.stats();
        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            sample_format,
            render,
            cfg.quantum_frames as usize,
        )
        .context("build output stream")?;
        stream.play().context("start output stream")?;

        let status = PlayerStatusState::shared();
        if let Ok(mut s) = status.lock() {
            s.device = name;
            s.sample_rate = Some(sample_rate);
            s.channels = Some(channels);
            s.render_stats = Some(stats);
            s.buffer_capacity_frames = Some(cfg.max_buffered_frames(sample_rate) as u64);
            s.loop_enabled = cfg.loop_enabled;
        }

        let player = spawn_player(link, signals, cfg.clone(), sample_rate, status.clone())?;

        Ok(Self {
            stream,
            player,
            status,
            sample_rate,
            channels,
        })
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn status(&self) -> &Arc<Mutex<PlayerStatusState>> {
        &self.status
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop playback, join the player thread, then close the stream.
    pub fn shutdown(self) {
        self.player.shutdown();
        if let Err(e) = self.stream.pause() {
            tracing::debug!(error = %e, "pause stream on shutdown");
        }
    }
}
