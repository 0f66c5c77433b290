//! Sample format helpers shared by the adapters.

/// Decode one little-endian signed 16-bit sample to `[-1.0, 1.0)`.
#[inline]
pub fn s16le_to_f32(bytes: [u8; 2]) -> f32 {
    i16::from_le_bytes(bytes) as f32 / 32_768.0
}

/// Append interleaved `channels`-wide audio to `out` as stereo.
///
/// Mono is duplicated to both sides; wider layouts keep their first two channels.
/// Returns the number of frames appended.
pub fn append_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) -> usize {
    if channels == 0 {
        return 0;
    }
    let frames = interleaved.len() / channels;
    out.reserve(frames * 2);
    match channels {
        1 => {
            for &s in &interleaved[..frames] {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(&interleaved[..frames * 2]),
        _ => {
            for frame in interleaved.chunks_exact(channels) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
    frames
}
