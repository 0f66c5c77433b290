/// An immutable block of interleaved stereo `f32` samples (`L, R, L, R, ...`).
///
/// Chunks are built once by the producer and only read after that. An odd trailing
/// sample is discarded on construction so the frame count is always exact.
#[derive(Debug, Default, PartialEq)]
pub struct PcmChunk {
    samples: Vec<f32>,
}

impl PcmChunk {
    /// Wrap interleaved stereo samples.
    pub fn new(mut samples: Vec<f32>) -> Self {
        if samples.len() % 2 != 0 {
            samples.pop();
        }
        Self { samples }
    }

    /// Build a chunk from `(left, right)` pairs.
    pub fn from_frames(frames: &[(f32, f32)]) -> Self {
        let mut samples = Vec::with_capacity(frames.len() * 2);
        for &(l, r) in frames {
            samples.push(l);
            samples.push(r);
        }
        Self { samples }
    }

    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read frame `idx`. The caller guarantees `idx < frames()`.
    #[inline]
    pub(crate) fn frame(&self, idx: usize) -> (f32, f32) {
        let base = idx * 2;
        (self.samples[base], self.samples[base + 1])
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Give the buffer back for reuse (emptied, capacity kept).
    pub fn into_buffer(self) -> Vec<f32> {
        let mut samples = self.samples;
        samples.clear();
        samples
    }
}
