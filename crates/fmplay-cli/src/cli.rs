use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fmplay", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// TOML file with playback tuning
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Preferred output sample rate (Hz)
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Cap on buffered audio in seconds
    #[arg(long, global = true)]
    pub buffer_seconds: Option<f32>,

    /// Rewind and keep playing at end of track
    #[arg(long = "loop", global = true)]
    pub loop_enabled: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices and exit
    Devices,

    /// Play an audio file (WAV, FLAC, MP3, ...)
    Play {
        path: PathBuf,
    },

    /// Play raw signed 16-bit little-endian stereo PCM
    Raw {
        path: PathBuf,
        /// Rate the PCM was rendered at (49716 for OPL dumps)
        #[arg(long, default_value_t = 49_716)]
        rate: u32,
    },

    /// Play a generated FM tone
    Tone {
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[arg(long, default_value_t = 440.0)]
        freq: f64,
    },
}

/// One line of interactive input.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    PauseToggle,
    Seek(f64),
    /// One-based, as shown in status output.
    Subsong(usize),
    LoopToggle,
    Status,
    Quit,
}

impl Control {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(None);
        };
        let arg = parts.next();
        let control = match cmd {
            "p" => Control::PauseToggle,
            "l" => Control::LoopToggle,
            "i" => Control::Status,
            "q" => Control::Quit,
            "s" => {
                let secs: f64 = arg
                    .ok_or_else(|| anyhow!("usage: s <seconds>"))?
                    .parse()
                    .map_err(|_| anyhow!("seek target must be a number of seconds"))?;
                Control::Seek(secs)
            }
            "n" => {
                let idx: usize = arg
                    .ok_or_else(|| anyhow!("usage: n <subsong>"))?
                    .parse()
                    .map_err(|_| anyhow!("subsong must be a positive integer"))?;
                if idx == 0 {
                    return Err(anyhow!("subsongs are numbered from 1"));
                }
                Control::Subsong(idx)
            }
            other => return Err(anyhow!("unknown command {other:?} (p, s, n, l, i, q)")),
        };
        Ok(Some(control))
    }
}
