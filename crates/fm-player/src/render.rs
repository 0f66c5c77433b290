//! Real-time render loop.
//!
//! [`RenderLoop::process`] is called once per host quantum. Per call it:
//! - applies pending [`RenderCommand`]s (bounded by what was queued at entry)
//! - drains the [`TransferQueue`] frame by frame into the output block, writing silence
//!   on underrun
//! - advances the [`PlaybackClock`] by every frame written, silence included
//! - emits at most one `NeedSamples` (below the low-water mark) and at most one
//!   `Position` (reporting interval elapsed)
//!
//! ## Real-time constraints
//! No locks, no allocation, no blocking sends. Signals go out with `try_send`; a full
//! channel drops the signal, except `Cleared` acknowledgements which are retried on the
//! next quantum. Spent chunks are handed back to the producer for reuse; they are only
//! freed here if the return ring is full.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

use crate::chunk::PcmChunk;
use crate::clock::PlaybackClock;
use crate::message::{FlowSignal, RenderCommand};
use crate::queue::{Enqueue, TransferQueue};

/// Counters published by the render loop for status reporting.
#[derive(Debug, Default)]
pub struct RenderStats {
    /// Quanta rendered.
    pub quanta: AtomicU64,
    /// Silent frames written because the queue was empty while playing.
    pub underrun_frames: AtomicU64,
    /// Quanta containing at least one underrun frame.
    pub underrun_events: AtomicU64,
    /// Chunks dropped by the buffered-duration cap.
    pub dropped_chunks: AtomicU64,
    /// Frames buffered after the last quantum.
    pub buffered_frames: AtomicU64,
}

/// Thresholds used by the render side.
#[derive(Clone, Copy, Debug)]
pub struct RenderThresholds {
    pub low_water_frames: usize,
    pub position_interval_frames: u64,
}

/// Render-side endpoint of the pipeline. Owned by the audio callback.
pub struct RenderLoop {
    queue: TransferQueue,
    clock: PlaybackClock,
    commands: rtrb::Consumer<RenderCommand>,
    signals: Sender<FlowSignal>,
    retired: rtrb::Producer<PcmChunk>,
    thresholds: RenderThresholds,
    stats: Arc<RenderStats>,
    epoch: u64,
    paused: bool,
    received_frames: u64,
    pending_ack: Option<u64>,
}

impl RenderLoop {
    /// Build a render loop around its transport endpoints. Starts paused.
    pub fn new(
        queue: TransferQueue,
        clock: PlaybackClock,
        commands: rtrb::Consumer<RenderCommand>,
        signals: Sender<FlowSignal>,
        retired: rtrb::Producer<PcmChunk>,
        thresholds: RenderThresholds,
    ) -> Self {
        Self {
            queue,
            clock,
            commands,
            signals,
            retired,
            thresholds,
            stats: Arc::new(RenderStats::default()),
            epoch: 0,
            paused: true,
            received_frames: 0,
            pending_ack: None,
        }
    }

    /// Shared counters for status snapshots.
    pub fn stats(&self) -> Arc<RenderStats> {
        self.stats.clone()
    }

    /// Render one quantum into `out`, an interleaved block with `channels` channels.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        self.stats.quanta.fetch_add(1, Ordering::Relaxed);

        self.apply_commands();
        self.flush_ack();

        if self.paused {
            out.fill(0.0);
            return;
        }

        let frames = out.len() / channels;
        let mut silent = 0u64;
        let retired = &mut self.retired;
        for frame in out.chunks_exact_mut(channels) {
            let (l, r) = match self.queue.dequeue_frame_with(|c| retire(retired, c)) {
                Some(f) => f,
                None => {
                    silent += 1;
                    (0.0, 0.0)
                }
            };
            write_mapped(frame, l, r);
        }
        out[frames * channels..].fill(0.0);

        if silent > 0 {
            self.stats.underrun_frames.fetch_add(silent, Ordering::Relaxed);
            self.stats.underrun_events.fetch_add(1, Ordering::Relaxed);
        }

        self.clock.advance(frames as u64);

        let buffered = self.queue.buffered_frames();
        self.stats
            .buffered_frames
            .store(buffered as u64, Ordering::Relaxed);

        if buffered < self.thresholds.low_water_frames {
            let _ = self.signals.try_send(FlowSignal::NeedSamples {
                epoch: self.epoch,
                buffered_frames: buffered as u64,
                received_frames: self.received_frames,
                clock: self.clock.absolute(),
            });
        }

        if self.clock.take_report(self.thresholds.position_interval_frames) {
            let _ = self.signals.try_send(FlowSignal::Position {
                epoch: self.epoch,
                clock: self.clock.absolute(),
            });
        }
    }

    /// Apply the commands queued before this call.
    fn apply_commands(&mut self) {
        let pending = self.commands.slots();
        for _ in 0..pending {
            let Ok(cmd) = self.commands.pop() else {
                break;
            };
            match cmd {
                RenderCommand::Samples(chunk) => {
                    self.received_frames += chunk.frames() as u64;
                    if let Enqueue::Dropped(chunk) = self.queue.enqueue(chunk) {
                        self.stats.dropped_chunks.fetch_add(1, Ordering::Relaxed);
                        retire(&mut self.retired, chunk);
                    }
                }
                RenderCommand::Clear { epoch } => {
                    let retired = &mut self.retired;
                    self.queue.reset_with(|c| retire(retired, c));
                    self.clock.reset();
                    self.epoch = epoch;
                    self.received_frames = 0;
                    self.pending_ack = Some(epoch);
                    self.stats.buffered_frames.store(0, Ordering::Relaxed);
                }
                RenderCommand::SetPaused(paused) => {
                    self.paused = paused;
                }
            }
        }
    }

    fn flush_ack(&mut self) {
        if let Some(epoch) = self.pending_ack {
            if self.signals.try_send(FlowSignal::Cleared { epoch }).is_ok() {
                self.pending_ack = None;
            }
        }
    }

    pub fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

/// Hand a spent chunk back to the producer; dropped here only if the ring is full.
fn retire(ring: &mut rtrb::Producer<PcmChunk>, chunk: PcmChunk) {
    let _ = ring.push(chunk);
}

/// Map one stereo frame onto an output frame of any width.
///
/// - mono: average L/R
/// - stereo: pass-through
/// - wider layouts: L, R, then silence
#[inline]
fn write_mapped(frame: &mut [f32], l: f32, r: f32) {
    match frame.len() {
        1 => frame[0] = 0.5 * (l + r),
        _ => {
            frame[0] = l;
            frame[1] = r;
            frame[2..].fill(0.0);
        }
    }
}
