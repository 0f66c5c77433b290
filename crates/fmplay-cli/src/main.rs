//! fmplay: play FM-engine output, audio files or a test tone through the real-time
//! pipeline, with line-based transport control on stdin.

mod cli;

use std::io::BufRead;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use fm_player::config::PlaybackConfig;
use fm_player::device;
use fm_player::pipeline::AudioSession;
use fm_player::player::{PlayerCommand, PlayerEvent};
use fm_player::source::{FileSource, RawPcmSource, SampleSource, ToneSource};
use fm_player_types::PlaybackState;
use tracing_subscriber::EnvFilter;

use cli::{Args, Command, Control};

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fm_player=info")),
        )
        .init();

    if let Command::Devices = args.cmd {
        let host = cpal::default_host();
        for (i, d) in device::list_devices(&host)?.iter().enumerate() {
            println!(
                "#{i}: {}{} ({}-{} Hz, up to {} ch)",
                d.name,
                if d.is_default { " [default]" } else { "" },
                d.min_rate,
                d.max_rate,
                d.max_channels
            );
        }
        return Ok(());
    }

    let cfg = load_config(&args)?;
    let session = AudioSession::start(args.device.as_deref(), &cfg)?;
    let source = open_source(&args.cmd, session.sample_rate())?;

    let player = session.player();
    player.send(PlayerCommand::Load(source))?;
    player.send(PlayerCommand::Play)?;

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("install ctrl-c handler")?;

    let controls = spawn_stdin_reader();
    run(&session, &controls, &quit_rx, cfg.loop_enabled)?;

    session.shutdown();
    Ok(())
}

/// Config file (if any), then command-line overrides.
fn load_config(args: &Args) -> Result<PlaybackConfig> {
    let mut cfg = match &args.config {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::default(),
    };
    if args.sample_rate.is_some() {
        cfg.sample_rate = args.sample_rate;
    }
    if let Some(secs) = args.buffer_seconds {
        cfg.max_buffer_seconds = secs;
    }
    if args.loop_enabled {
        cfg.loop_enabled = true;
    }
    Ok(cfg)
}

fn open_source(cmd: &Command, output_rate: u32) -> Result<Box<dyn SampleSource>> {
    let source: Box<dyn SampleSource> = match cmd {
        Command::Play { path } => Box::new(FileSource::open(path)?),
        Command::Raw { path, rate } => Box::new(RawPcmSource::open(path, *rate)?),
        Command::Tone { seconds, freq } => Box::new(ToneSource::new(output_rate, *freq, *seconds)),
        Command::Devices => return Err(anyhow!("`devices` does not play audio")),
    };
    Ok(source)
}

/// Forward stdin lines on a channel so the main loop can select over them.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive the session until the track ends, `q` is entered, or ctrl-c.
fn run(
    session: &AudioSession,
    controls: &Receiver<String>,
    quit: &Receiver<()>,
    mut loop_enabled: bool,
) -> Result<()> {
    let player = session.player();
    let events = player.events();
    let mut controls = controls.clone();
    let mut last_second = None;

    loop {
        select! {
            recv(quit) -> _ => {
                tracing::info!("interrupted");
                player.send(PlayerCommand::Stop)?;
                return Ok(());
            }
            recv(controls) -> line => {
                let Ok(line) = line else {
                    // stdin closed: keep playing until the track ends.
                    controls = crossbeam_channel::never();
                    continue;
                };
                let control = match Control::parse(&line) {
                    Ok(Some(c)) => c,
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };
                match control {
                    Control::PauseToggle => player.send(PlayerCommand::PauseToggle)?,
                    Control::Seek(seconds) => player.send(PlayerCommand::Seek { seconds })?,
                    Control::Subsong(n) => player.send(PlayerCommand::SetSubsong { index: n - 1 })?,
                    Control::LoopToggle => {
                        loop_enabled = !loop_enabled;
                        player.send(PlayerCommand::SetLoop { enabled: loop_enabled })?;
                        tracing::info!(loop_enabled, "loop toggled");
                    }
                    Control::Status => print_status(session)?,
                    Control::Quit => {
                        player.send(PlayerCommand::Stop)?;
                        return Ok(());
                    }
                }
            }
            recv(events) -> ev => {
                let Ok(ev) = ev else {
                    return Ok(());
                };
                match ev {
                    PlayerEvent::TrackLoaded(info) => {
                        tracing::info!(
                            title = info.display_name(),
                            author = info.author.as_deref().unwrap_or("-"),
                            format = info.format.as_deref().unwrap_or("-"),
                            "now playing"
                        );
                    }
                    PlayerEvent::StateChanged(state) => {
                        tracing::info!(?state, "state");
                        if state == PlaybackState::Stopped {
                            return Ok(());
                        }
                    }
                    PlayerEvent::Position { elapsed_ms } => {
                        let second = elapsed_ms / 1000;
                        if last_second != Some(second) {
                            last_second = Some(second);
                            eprint!("\r{:02}:{:02} ", second / 60, second % 60);
                        }
                    }
                    PlayerEvent::Ended(reason) => {
                        eprintln!();
                        tracing::info!(?reason, "playback ended");
                    }
                }
            }
        }
    }
}

fn print_status(session: &AudioSession) -> Result<()> {
    let snapshot = match session.status().lock() {
        Ok(s) => s.snapshot(),
        Err(_) => return Ok(()),
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
