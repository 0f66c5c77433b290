//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config and a fixed quantum-sized buffer

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                device_name(d)
                    .map(|n| matches_device_name(&n, needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Human-readable device name.
pub fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

/// Choose the output config for a preferred rate.
///
/// Ranking, most important first:
/// - a rate equal to `target_rate` (any rate when `None`)
/// - at least two channels, then fewer extra channels
/// - `f32` over integer formats
/// - the higher rate
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();

    ranges
        .into_iter()
        .map(|range| {
            let rate = pick_rate_for_range(
                range.min_sample_rate(),
                range.max_sample_rate(),
                target_rate,
            );
            let key = ConfigRank {
                exact: target_rate.is_none_or(|t| t == rate),
                stereo: range.channels() >= 2,
                fewer_channels: u16::MAX - range.channels(),
                format: u8::MAX - sample_format_rank(range.sample_format()),
                rate,
            };
            (key, range.with_sample_rate(rate))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Fixed callback size of `quantum_frames`, clamped to what the device allows.
///
/// Returns `None` when the device does not report a range, leaving CPAL's default.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    quantum_frames: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            quantum_frames.clamp(*min, (*max).max(*min)),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Output device metadata for the `devices` listing.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
    pub is_default: bool,
}

/// Enumerate output devices of `host`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host.default_output_device().and_then(|d| device_name(&d));
    let devices = host.output_devices().context("No output devices")?;

    let mut out = Vec::new();
    for d in devices {
        let Some(name) = device_name(&d) else {
            continue;
        };
        let (mut min_rate, mut max_rate, mut max_channels) = (u32::MAX, 0u32, 0u16);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
                max_channels = max_channels.max(r.channels());
            }
        }
        if max_rate == 0 {
            tracing::debug!(device = %name, "skipping device without output configs");
            continue;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
            max_channels,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ConfigRank {
    exact: bool,
    stereo: bool,
    fewer_channels: u16,
    format: u8,
    rate: u32,
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) => target.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", " "));
    }

    #[test]
    fn rate_is_clamped_into_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn rank_prefers_exact_rate_then_stereo_then_f32() {
        let base = ConfigRank {
            exact: true,
            stereo: true,
            fewer_channels: u16::MAX - 2,
            format: u8::MAX - sample_format_rank(cpal::SampleFormat::I16),
            rate: 48_000,
        };
        let inexact = ConfigRank {
            exact: false,
            rate: 96_000,
            ..base
        };
        let mono = ConfigRank {
            stereo: false,
            fewer_channels: u16::MAX - 1,
            ..base
        };
        let surround = ConfigRank {
            fewer_channels: u16::MAX - 8,
            ..base
        };
        let float = ConfigRank {
            format: u8::MAX,
            ..base
        };
        assert!(base > inexact);
        assert!(base > mono);
        assert!(base > surround);
        assert!(float > base);
    }
}
