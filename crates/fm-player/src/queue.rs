//! Render-side FIFO of PCM chunks.
//!
//! [`TransferQueue`] is owned exclusively by the render loop: chunks arrive through the
//! transport ring and are appended here, then drained one frame at a time from the
//! audio callback. Nothing in this module blocks or allocates after construction.
//!
//! ## Accounting
//! `buffered_frames` is kept incrementally and always equals the sum of the chunk frame
//! counts minus the read offset into the head chunk.
//!
//! ## Overflow
//! A chunk that would push the buffered total above `max_buffered_frames` (or exceed the
//! pre-allocated chunk slots) is dropped whole. The producer is not told; it throttles
//! through the refill signals instead.

use std::collections::VecDeque;

use crate::chunk::PcmChunk;

/// Result of offering a chunk to the queue.
#[derive(Debug, PartialEq)]
pub enum Enqueue {
    /// The chunk was appended.
    Accepted,
    /// The chunk would have exceeded the cap; it is handed back untouched.
    Dropped(PcmChunk),
}

/// Bounded FIFO of PCM chunks with O(1) frame accounting.
pub struct TransferQueue {
    chunks: VecDeque<PcmChunk>,
    /// Frames already read from `chunks.front()`.
    offset: usize,
    buffered_frames: usize,
    max_buffered_frames: usize,
    max_chunks: usize,
}

impl TransferQueue {
    /// Create a queue capped at `max_buffered_frames`, with room for `max_chunks` chunks.
    pub fn new(max_buffered_frames: usize, max_chunks: usize) -> Self {
        let max_chunks = max_chunks.max(1);
        Self {
            chunks: VecDeque::with_capacity(max_chunks),
            offset: 0,
            buffered_frames: 0,
            max_buffered_frames,
            max_chunks,
        }
    }

    /// Append `chunk`, or drop it if it does not fit.
    ///
    /// Empty chunks are accepted without being stored.
    pub fn enqueue(&mut self, chunk: PcmChunk) -> Enqueue {
        let frames = chunk.frames();
        if frames == 0 {
            return Enqueue::Accepted;
        }
        if self.buffered_frames + frames > self.max_buffered_frames
            || self.chunks.len() >= self.max_chunks
        {
            return Enqueue::Dropped(chunk);
        }
        self.chunks.push_back(chunk);
        self.buffered_frames += frames;
        Enqueue::Accepted
    }

    /// Pop one stereo frame, or `None` when the queue is empty.
    pub fn dequeue_frame(&mut self) -> Option<(f32, f32)> {
        self.dequeue_frame_with(drop)
    }

    /// Pop one stereo frame, handing an exhausted head chunk to `retire`.
    pub fn dequeue_frame_with(&mut self, retire: impl FnOnce(PcmChunk)) -> Option<(f32, f32)> {
        let head = self.chunks.front()?;
        let frame = head.frame(self.offset);
        self.offset += 1;
        self.buffered_frames -= 1;

        if self.offset >= head.frames() {
            self.offset = 0;
            if let Some(spent) = self.chunks.pop_front() {
                retire(spent);
            }
        }
        Some(frame)
    }

    /// Frames still waiting to be played.
    pub fn buffered_frames(&self) -> usize {
        self.buffered_frames
    }

    /// Buffered-frame cap.
    pub fn max_buffered_frames(&self) -> usize {
        self.max_buffered_frames
    }

    /// Chunks currently held, including a partially consumed head.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_frames == 0
    }

    /// Discard everything, including the unread tail of the head chunk.
    pub fn reset(&mut self) {
        self.reset_with(drop);
    }

    /// Discard everything, handing each chunk to `retire`.
    pub fn reset_with(&mut self, mut retire: impl FnMut(PcmChunk)) {
        while let Some(chunk) = self.chunks.pop_front() {
            retire(chunk);
        }
        self.offset = 0;
        self.buffered_frames = 0;
    }

    /// Recount remaining frames from scratch (invariant checks).
    pub fn recount_frames(&self) -> usize {
        let total: usize = self.chunks.iter().map(PcmChunk::frames).sum();
        total - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(frames: usize, start: f32) -> PcmChunk {
        let pairs: Vec<(f32, f32)> = (0..frames)
            .map(|i| {
                let v = start + i as f32;
                (v, -v)
            })
            .collect();
        PcmChunk::from_frames(&pairs)
    }

    #[test]
    fn drains_in_order_and_tracks_remaining() {
        let mut q = TransferQueue::new(100, 8);
        let c = PcmChunk::from_frames(&[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6), (0.7, 0.8)]);
        assert_eq!(q.enqueue(c), Enqueue::Accepted);

        assert_eq!(q.dequeue_frame(), Some((0.1, 0.2)));
        assert_eq!(q.dequeue_frame(), Some((0.3, 0.4)));
        assert_eq!(q.buffered_frames(), 2);
        assert_eq!(q.recount_frames(), 2);
    }

    #[test]
    fn overflow_drops_whole_chunk() {
        let mut q = TransferQueue::new(100, 8);
        assert_eq!(q.enqueue(chunk(80, 0.0)), Enqueue::Accepted);

        let dropped = q.enqueue(chunk(30, 100.0));
        assert!(matches!(dropped, Enqueue::Dropped(c) if c.frames() == 30));
        assert_eq!(q.buffered_frames(), 80);
        assert_eq!(q.chunk_count(), 1);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let mut q = TransferQueue::new(100, 8);
        assert_eq!(q.enqueue(chunk(60, 0.0)), Enqueue::Accepted);
        assert_eq!(q.enqueue(chunk(40, 0.0)), Enqueue::Accepted);
        assert_eq!(q.buffered_frames(), 100);
    }

    #[test]
    fn chunk_slots_are_a_second_cap() {
        let mut q = TransferQueue::new(1_000, 2);
        assert_eq!(q.enqueue(chunk(1, 0.0)), Enqueue::Accepted);
        assert_eq!(q.enqueue(chunk(1, 0.0)), Enqueue::Accepted);
        assert!(matches!(q.enqueue(chunk(1, 0.0)), Enqueue::Dropped(_)));
        assert_eq!(q.buffered_frames(), 2);
    }

    #[test]
    fn empty_queue_returns_none() {
        let mut q = TransferQueue::new(100, 8);
        assert_eq!(q.dequeue_frame(), None);
        assert_eq!(q.buffered_frames(), 0);
    }

    #[test]
    fn head_advances_across_chunks_and_retires_spent() {
        let mut q = TransferQueue::new(100, 8);
        q.enqueue(chunk(2, 0.0));
        q.enqueue(chunk(1, 10.0));

        let mut retired = Vec::new();
        let mut out = Vec::new();
        while let Some(f) = q.dequeue_frame_with(|c| retired.push(c.frames())) {
            out.push(f.0);
        }
        assert_eq!(out, vec![0.0, 1.0, 10.0]);
        assert_eq!(retired, vec![2, 1]);
        assert_eq!(q.chunk_count(), 0);
    }

    #[test]
    fn reset_mid_chunk_discards_remainder() {
        let mut q = TransferQueue::new(100, 8);
        q.enqueue(chunk(4, 0.0));
        q.dequeue_frame();

        let mut retired = 0;
        q.reset_with(|_| retired += 1);
        assert_eq!(retired, 1);
        assert_eq!(q.buffered_frames(), 0);
        assert_eq!(q.dequeue_frame(), None);

        q.enqueue(chunk(1, 7.0));
        assert_eq!(q.dequeue_frame(), Some((7.0, -7.0)));
    }

    #[test]
    fn accounting_matches_recount_under_interleaving() {
        let mut q = TransferQueue::new(500, 64);
        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let mut expected = std::collections::VecDeque::new();
        let mut value = 0.0f32;
        for _ in 0..5_000 {
            if next() % 3 == 0 {
                let frames = (next() % 40) as usize;
                let c = chunk(frames, value);
                let pairs: Vec<f32> = (0..frames).map(|i| value + i as f32).collect();
                if q.enqueue(c) == Enqueue::Accepted {
                    expected.extend(pairs);
                }
                value += frames as f32;
            } else {
                let got = q.dequeue_frame().map(|f| f.0);
                assert_eq!(got, expected.pop_front());
            }
            assert_eq!(q.buffered_frames(), q.recount_frames());
            assert_eq!(q.buffered_frames(), expected.len());
        }
    }
}
