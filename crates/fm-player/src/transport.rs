//! Producer↔render transport.
//!
//! Three channels connect the two contexts:
//! - `rtrb` ring of [`RenderCommand`]s, producer → render
//! - `rtrb` ring of spent [`PcmChunk`]s, render → producer (buffer reuse)
//! - bounded `crossbeam-channel` of [`FlowSignal`]s, render → producer
//!
//! None of them block on the render side.

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use rtrb::PushError;

use crate::chunk::PcmChunk;
use crate::clock::PlaybackClock;
use crate::config::PlaybackConfig;
use crate::message::{FlowSignal, RenderCommand};
use crate::queue::TransferQueue;
use crate::render::{RenderLoop, RenderThresholds};

/// Ring slots kept free of sample traffic so control messages always fit.
const CONTROL_RESERVE: usize = 4;

/// Producer-side endpoint: sends commands, collects recycled buffers.
pub struct RenderLink {
    commands: rtrb::Producer<RenderCommand>,
    recycled: rtrb::Consumer<PcmChunk>,
}

impl RenderLink {
    /// Send a chunk. A ring without room for samples hands the chunk back so the caller
    /// can retry it later without losing audio.
    pub fn send_samples(&mut self, chunk: PcmChunk) -> std::result::Result<(), PcmChunk> {
        if self.commands.slots() <= CONTROL_RESERVE {
            return Err(chunk);
        }
        // Single producer: the slot check above guarantees room.
        let _ = self.commands.push(RenderCommand::Samples(chunk));
        Ok(())
    }

    /// Send a control message. Fails only when the render side has stopped draining.
    pub fn send_control(&mut self, cmd: RenderCommand) -> Result<()> {
        match self.commands.push(cmd) {
            Ok(()) => Ok(()),
            Err(PushError::Full(cmd)) => Err(anyhow!("render ring full, dropped {cmd:?}")),
        }
    }

    /// Take an emptied buffer handed back by the render side.
    pub fn take_buffer(&mut self) -> Option<Vec<f32>> {
        self.recycled.pop().ok().map(PcmChunk::into_buffer)
    }

    /// Whether the render side has gone away.
    pub fn is_abandoned(&self) -> bool {
        self.commands.is_abandoned()
    }
}

/// Build both ends of the pipeline for output at `sample_rate`.
pub fn channel(
    cfg: &PlaybackConfig,
    sample_rate: u32,
) -> (RenderLink, RenderLoop, Receiver<FlowSignal>) {
    let (cmd_tx, cmd_rx) = rtrb::RingBuffer::new(cfg.command_capacity.max(1) + CONTROL_RESERVE);
    // Every chunk the queue can hold, plus a ring's worth of drops, can come back.
    let (recycle_tx, recycle_rx) =
        rtrb::RingBuffer::new(cfg.max_chunks.max(1) + cfg.command_capacity.max(1));
    let (signal_tx, signal_rx) = crossbeam_channel::bounded(cfg.signal_capacity.max(1));

    let queue = TransferQueue::new(cfg.max_buffered_frames(sample_rate), cfg.max_chunks);
    let clock = PlaybackClock::new(cfg.clock_rebase_frames);
    let render = RenderLoop::new(
        queue,
        clock,
        cmd_rx,
        signal_tx,
        recycle_tx,
        RenderThresholds {
            low_water_frames: cfg.low_water_frames,
            position_interval_frames: cfg.position_interval_frames,
        },
    );

    let link = RenderLink {
        commands: cmd_tx,
        recycled: recycle_rx,
    };
    (link, render, signal_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_fits_when_samples_are_refused() {
        let cfg = PlaybackConfig {
            command_capacity: 2,
            ..Default::default()
        };
        let (mut link, _render, _signals) = channel(&cfg, 48_000);

        let mut accepted = 0;
        while link.send_samples(PcmChunk::new(vec![0.0; 2])).is_ok() {
            accepted += 1;
        }
        assert_eq!(accepted, 2);
        let refused = link.send_samples(PcmChunk::new(vec![0.5; 4]));
        assert_eq!(refused, Err(PcmChunk::new(vec![0.5; 4])));
        link.send_control(RenderCommand::Clear { epoch: 1 }).unwrap();
        link.send_control(RenderCommand::SetPaused(false)).unwrap();
    }

    #[test]
    fn frames_cross_threads_in_order() {
        use std::sync::{Arc, Barrier};

        const CHUNKS: usize = 200;
        const FRAMES: usize = 16;

        let (mut link, mut render, _signals) = channel(&PlaybackConfig::default(), 48_000);
        link.send_control(RenderCommand::SetPaused(false)).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let start = barrier.clone();
        let producer = std::thread::spawn(move || {
            start.wait();
            for c in 0..CHUNKS {
                let mut buf = link.take_buffer().unwrap_or_default();
                for f in 0..FRAMES {
                    let v = (c * FRAMES + f + 1) as f32;
                    buf.push(v);
                    buf.push(-v);
                }
                let mut chunk = PcmChunk::new(buf);
                while let Err(back) = link.send_samples(chunk) {
                    chunk = back;
                    std::thread::yield_now();
                }
            }
        });

        barrier.wait();
        let mut out = vec![0.0f32; 64 * 2];
        let mut next = 1.0f32;
        for _ in 0..1_000_000 {
            render.process(&mut out, 2);
            for frame in out.chunks_exact(2).filter(|f| f[0] != 0.0) {
                assert_eq!(frame, [next, -next]);
                next += 1.0;
            }
            if next as usize > CHUNKS * FRAMES {
                break;
            }
            std::thread::yield_now();
        }
        producer.join().unwrap();
        assert_eq!(next as usize, CHUNKS * FRAMES + 1);
        assert_eq!(render.stats().dropped_chunks.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn dropping_render_side_is_visible() {
        let (link, render, _signals) = channel(&PlaybackConfig::default(), 48_000);
        assert!(!link.is_abandoned());
        drop(render);
        assert!(link.is_abandoned());
    }
}
