//! Producer-side refill controller.
//!
//! Owns the playback state machine and the attached [`SampleSource`]. It never waits on
//! the render side: it reacts to [`FlowSignal`]s as they arrive and pushes chunks through
//! the [`RenderLink`].
//!
//! ```text
//! Idle ─load→ Loaded ─play→ Playing ⇄ Paused
//!                              │         │
//!                              └─stop/eof┴→ Stopped
//! ```
//!
//! ## Refill sizing
//! The render side reports how many frames it holds and how many it has taken off the
//! ring this epoch. Frames sent but not yet received are in flight, so the request is
//! `target - buffered - in_flight`, clamped to `max_request_frames`. Repeated signals
//! while a refill is travelling therefore ask for nothing extra.
//!
//! ## Epochs
//! Every clear starts a new epoch. Signals stamped with another epoch describe audio
//! that was discarded and are ignored.

use anyhow::{Result, anyhow};
use fm_player_types::{PlaybackEndReason, PlaybackState, TrackInfo};

use crate::chunk::PcmChunk;
use crate::config::PlaybackConfig;
use crate::message::{FlowSignal, RenderCommand};
use crate::source::{ResampledSource, SampleSource};
use crate::transport::RenderLink;

pub struct RefillController {
    link: RenderLink,
    cfg: PlaybackConfig,
    sample_rate: u32,
    state: PlaybackState,
    source: Option<Box<dyn SampleSource>>,
    /// Detached source kept alive until the render side acknowledges the clear.
    retiring: Option<Box<dyn SampleSource>>,
    epoch: u64,
    acked_epoch: u64,
    /// Frames pushed into the ring this epoch.
    sent_frames: u64,
    /// Chunk refused by a full ring, sent ahead of anything newer.
    unsent: Option<PcmChunk>,
    source_finished: bool,
    produced_any: bool,
    /// Track position (frames at the output rate) where the current epoch started.
    origin_frames: u64,
    /// Last render clock seen this epoch.
    clock: u64,
    /// Clock values at which a looped source restarted, this epoch.
    loop_points: Vec<u64>,
    loop_enabled: bool,
    end_reason: Option<PlaybackEndReason>,
}

impl RefillController {
    pub fn new(link: RenderLink, cfg: PlaybackConfig, sample_rate: u32) -> Self {
        let loop_enabled = cfg.loop_enabled;
        Self {
            link,
            cfg,
            sample_rate,
            state: PlaybackState::Idle,
            source: None,
            retiring: None,
            epoch: 0,
            acked_epoch: 0,
            sent_frames: 0,
            unsent: None,
            source_finished: false,
            produced_any: false,
            origin_frames: 0,
            clock: 0,
            loop_points: Vec::new(),
            loop_enabled,
            end_reason: None,
        }
    }

    /// Attach a new source, discarding whatever the render side still holds.
    ///
    /// Sources at another rate are wrapped in a [`ResampledSource`].
    pub fn load(&mut self, source: Box<dyn SampleSource>) -> Result<()> {
        let source = if source.sample_rate() != self.sample_rate {
            Box::new(ResampledSource::new(
                source,
                self.sample_rate,
                self.cfg.chunk_frames,
            )?) as Box<dyn SampleSource>
        } else {
            source
        };

        self.link.send_control(RenderCommand::SetPaused(true))?;
        self.begin_epoch(0)?;
        if let Some(old) = self.source.replace(source) {
            self.retiring = Some(old);
        }
        self.produced_any = false;
        self.end_reason = None;
        self.state = PlaybackState::Loaded;

        let info = self.track_info().unwrap_or_default();
        tracing::info!(
            epoch = self.epoch,
            track = info.display_name(),
            rate_hz = self.sample_rate,
            "track loaded"
        );
        Ok(())
    }

    /// Start or resume playback.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Loaded => {
                self.refill(self.cfg.target_buffer_frames);
                self.link.send_control(RenderCommand::SetPaused(false))?;
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Paused => {
                self.link.send_control(RenderCommand::SetPaused(false))?;
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Playing => {}
            PlaybackState::Idle | PlaybackState::Stopped => {
                return Err(anyhow!("no track loaded"));
            }
        }
        tracing::debug!(epoch = self.epoch, "playing");
        Ok(())
    }

    /// Suspend playback, keeping buffered audio for an instant resume.
    pub fn pause(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            self.link.send_control(RenderCommand::SetPaused(true))?;
            self.state = PlaybackState::Paused;
            tracing::debug!(epoch = self.epoch, "paused");
        }
        Ok(())
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused | PlaybackState::Loaded => self.play(),
            _ => Ok(()),
        }
    }

    /// Clear the render side and detach the source.
    pub fn stop(&mut self) -> Result<()> {
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Stopped) {
            return Ok(());
        }
        self.halt(PlaybackEndReason::Stopped)?;
        tracing::info!(epoch = self.epoch, "stopped");
        Ok(())
    }

    /// Reposition the source and drop audio buffered from the old position.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("no track loaded"))?;
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let seconds = match source.duration_seconds() {
            Some(d) => seconds.min(d),
            None => seconds,
        };
        source.seek(seconds)?;

        let origin = (seconds * self.sample_rate as f64).round() as u64;
        self.restart(origin)?;
        tracing::info!(epoch = self.epoch, seconds, "seek");
        Ok(())
    }

    /// Switch subsong and restart from its beginning.
    pub fn set_subsong(&mut self, index: usize) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("no track loaded"))?;
        source.set_subsong(index)?;
        self.restart(0)?;
        tracing::info!(epoch = self.epoch, subsong = index, "subsong selected");
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// React to one render-side signal.
    ///
    /// Returns the end reason when this signal ended the track.
    pub fn handle_signal(&mut self, signal: FlowSignal) -> Option<PlaybackEndReason> {
        if signal.epoch() != self.epoch {
            return None;
        }

        match signal {
            FlowSignal::Cleared { epoch } => {
                self.acked_epoch = epoch;
                if self.retiring.take().is_some() {
                    tracing::debug!(epoch, "released detached source");
                }
                None
            }
            FlowSignal::Position { clock, .. } => {
                self.clock = clock;
                None
            }
            FlowSignal::NeedSamples {
                buffered_frames,
                received_frames,
                clock,
                ..
            } => {
                self.clock = clock;
                if self.state != PlaybackState::Playing {
                    return None;
                }
                let in_flight = self.sent_frames.saturating_sub(received_frames);

                if self.source_finished
                    && self.unsent.is_none()
                    && buffered_frames == 0
                    && in_flight == 0
                {
                    return Some(self.finish());
                }

                let held = buffered_frames.saturating_add(in_flight) as usize;
                let deficit = self
                    .cfg
                    .target_buffer_frames
                    .saturating_sub(held)
                    .min(self.cfg.max_request_frames);
                if deficit > 0 {
                    self.refill(deficit);
                }
                None
            }
        }
    }

    /// Elapsed track position in output frames.
    pub fn position(&self) -> u64 {
        let (base, start) = match self.loop_points.iter().rev().find(|p| self.clock >= **p) {
            Some(&p) => (0, p),
            None => (self.origin_frames, 0),
        };
        base + (self.clock - start)
    }

    pub fn position_ms(&self) -> u64 {
        self.position().saturating_mul(1000) / self.sample_rate.max(1) as u64
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// `true` once the render side has acknowledged the latest clear.
    pub fn is_settled(&self) -> bool {
        self.acked_epoch == self.epoch
    }

    pub fn end_reason(&self) -> Option<PlaybackEndReason> {
        self.end_reason
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn track_info(&self) -> Option<TrackInfo> {
        self.source.as_ref().map(|s| s.track_info())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.source.as_ref().and_then(|s| s.duration_seconds())
    }

    /// `(current, count)` with a zero-based current index.
    pub fn subsong(&self) -> Option<(usize, usize)> {
        self.source
            .as_ref()
            .map(|s| (s.current_subsong(), s.subsong_count()))
    }

    /// Clear the render side and start a new epoch at track position `origin`.
    fn begin_epoch(&mut self, origin: u64) -> Result<()> {
        self.epoch += 1;
        self.link
            .send_control(RenderCommand::Clear { epoch: self.epoch })?;
        self.sent_frames = 0;
        self.unsent = None;
        self.source_finished = false;
        self.origin_frames = origin;
        self.clock = 0;
        self.loop_points.clear();
        Ok(())
    }

    /// New epoch at `origin`, re-priming if audio is expected soon.
    fn restart(&mut self, origin: u64) -> Result<()> {
        self.begin_epoch(origin)?;
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                self.refill(self.cfg.target_buffer_frames);
            }
            _ => {}
        }
        Ok(())
    }

    /// Natural end: queue drained with nothing in flight.
    fn finish(&mut self) -> PlaybackEndReason {
        let reason = if self.produced_any {
            PlaybackEndReason::Eof
        } else {
            PlaybackEndReason::Error
        };
        if let Err(e) = self.halt(reason) {
            tracing::warn!(error = %e, "render side did not accept stop");
        }
        tracing::info!(epoch = self.epoch, ?reason, "track ended");
        reason
    }

    fn halt(&mut self, reason: PlaybackEndReason) -> Result<()> {
        self.state = PlaybackState::Stopped;
        self.end_reason = Some(reason);
        self.retiring = self.source.take();
        self.link.send_control(RenderCommand::SetPaused(true))?;
        self.begin_epoch(0)
    }

    /// Pull up to `frames` from the source and push them in `chunk_frames` pieces.
    ///
    /// A chunk the ring refuses is held back and sent first on the next refill, so the
    /// source output reaches the render side without gaps.
    fn refill(&mut self, frames: usize) {
        let mut remaining = frames;
        if let Some(chunk) = self.unsent.take() {
            let held = chunk.frames();
            if let Err(chunk) = self.link.send_samples(chunk) {
                self.unsent = Some(chunk);
                return;
            }
            self.sent_frames += held as u64;
            remaining = remaining.saturating_sub(held);
        }

        let Some(source) = self.source.as_mut() else {
            return;
        };
        let chunk_frames = self.cfg.chunk_frames.max(1);
        let mut rewound = false;

        while remaining > 0 && !self.source_finished {
            let want = remaining.min(chunk_frames);
            let mut buf = self
                .link
                .take_buffer()
                .unwrap_or_else(|| Vec::with_capacity(chunk_frames * 2));

            let produced = match source.produce(want, &mut buf) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "source failed; treating as end of stream");
                    self.source_finished = true;
                    break;
                }
            };

            let mut stalled = false;
            if produced.frames > 0 {
                self.produced_any = true;
                rewound = false;
                match self.link.send_samples(PcmChunk::new(buf)) {
                    Ok(()) => {
                        self.sent_frames += produced.frames as u64;
                        remaining = remaining.saturating_sub(produced.frames);
                    }
                    Err(chunk) => {
                        // Ring full: the render side is behind and will ask again.
                        tracing::debug!(frames = produced.frames, "transport full, holding chunk");
                        self.unsent = Some(chunk);
                        stalled = true;
                    }
                }
            }

            if produced.finished {
                // A rewind that yields nothing means the track is empty; don't spin.
                if self.loop_enabled && self.produced_any && !rewound {
                    if let Err(e) = source.reset() {
                        tracing::warn!(error = %e, "rewind failed");
                        self.source_finished = true;
                    } else {
                        // Assumes no underrun between now and the loop point.
                        let held = self.unsent.as_ref().map_or(0, |c| c.frames() as u64);
                        self.loop_points.push(self.sent_frames + held);
                        rewound = true;
                        tracing::debug!(epoch = self.epoch, "looping");
                    }
                } else {
                    self.source_finished = true;
                }
            } else if produced.frames == 0 {
                break;
            }
            if stalled {
                break;
            }
        }
    }
}
