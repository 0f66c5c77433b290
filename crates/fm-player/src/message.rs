//! Typed messages crossing between the producer and render contexts.

use crate::chunk::PcmChunk;

/// Producer → render.
#[derive(Debug)]
pub enum RenderCommand {
    /// Append a chunk to the render-side queue.
    Samples(PcmChunk),
    /// Drop all buffered audio, zero the clock and enter `epoch`.
    ///
    /// Acknowledged with [`FlowSignal::Cleared`].
    Clear { epoch: u64 },
    /// Suspend or resume draining. While paused the render side emits silence without
    /// consuming buffered audio or advancing the clock.
    SetPaused(bool),
}

/// Render → producer.
///
/// Every signal carries the epoch it was emitted in; signals from an epoch older than the
/// controller's current one describe audio that has already been discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowSignal {
    /// Buffered audio fell below the low-water mark.
    NeedSamples {
        epoch: u64,
        /// Frames buffered after this quantum was drained.
        buffered_frames: u64,
        /// Frames taken off the transport ring this epoch (accepted or dropped).
        received_frames: u64,
        /// Absolute clock value at emission.
        clock: u64,
    },
    /// Periodic playback position.
    Position { epoch: u64, clock: u64 },
    /// A `Clear` for `epoch` has taken effect.
    Cleared { epoch: u64 },
}

impl FlowSignal {
    pub fn epoch(&self) -> u64 {
        match *self {
            FlowSignal::NeedSamples { epoch, .. }
            | FlowSignal::Position { epoch, .. }
            | FlowSignal::Cleared { epoch } => epoch,
        }
    }

    /// Clock value carried by the signal, if any.
    pub fn clock(&self) -> Option<u64> {
        match *self {
            FlowSignal::NeedSamples { clock, .. } | FlowSignal::Position { clock, .. } => {
                Some(clock)
            }
            FlowSignal::Cleared { .. } => None,
        }
    }
}
