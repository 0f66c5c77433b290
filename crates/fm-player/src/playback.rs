//! Output stage (CPAL output stream).
//!
//! Moves the [`RenderLoop`] into the CPAL callback. The callback:
//! - renders into a pre-allocated `f32` scratch block, one quantum at a time
//! - converts the block to the device sample format
//!
//! Host blocks larger than the quantum are rendered in several passes; each pass is a
//! full render-loop quantum (commands, signals, clock).

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::render::RenderLoop;

/// Build a CPAL output stream driven by `render`.
///
/// `quantum_frames` bounds the scratch block; it is allocated here, never in the
/// callback.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    render: RenderLoop,
    quantum_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, render, quantum_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, render, quantum_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, render, quantum_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, render, quantum_frames),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderLoop,
    quantum_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let mut scratch = vec![0.0f32; quantum_frames.max(1) * channels];

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            render_block(&mut render, &mut scratch, data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Fill `data` from `render` through `scratch`, quantum by quantum.
fn render_block<T>(render: &mut RenderLoop, scratch: &mut [f32], data: &mut [T], channels: usize)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    for block in data.chunks_mut(scratch.len()) {
        let pass = &mut scratch[..block.len()];
        render.process(pass, channels);
        for (dst, src) in block.iter_mut().zip(pass.iter()) {
            *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
        }
    }
}
