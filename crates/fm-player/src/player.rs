//! Player worker thread.
//!
//! Runs the [`RefillController`] on its own thread, waiting on both control commands
//! and render-side flow signals. Nothing here sleeps or polls; the thread wakes only
//! when one of the two channels has a message.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use fm_player_types::{PlaybackEndReason, PlaybackState, TrackInfo};

use crate::config::PlaybackConfig;
use crate::controller::RefillController;
use crate::message::FlowSignal;
use crate::source::SampleSource;
use crate::status::PlayerStatusState;
use crate::transport::RenderLink;

/// Events buffered for a slow reader; newer events are dropped once this fills.
pub const EVENT_CAPACITY: usize = 256;

/// Commands accepted by the player thread.
pub enum PlayerCommand {
    Load(Box<dyn SampleSource>),
    Play,
    Pause,
    PauseToggle,
    Stop,
    Seek { seconds: f64 },
    SetSubsong { index: usize },
    SetLoop { enabled: bool },
    Shutdown,
}

/// Notifications published by the player thread.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    TrackLoaded(TrackInfo),
    Position { elapsed_ms: u64 },
    Ended(PlaybackEndReason),
}

/// Handle for sending commands to the player thread.
pub struct PlayerHandle {
    cmd_tx: Sender<PlayerCommand>,
    events: Receiver<PlayerEvent>,
    join: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    pub fn send(&self, cmd: PlayerCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("player thread has exited"))
    }

    /// Event stream. Up to [`EVENT_CAPACITY`] events are buffered; a reader that falls
    /// further behind misses the newest ones.
    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events
    }

    /// Stop playback and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(PlayerCommand::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("player thread panicked");
            }
        }
    }
}

/// Spawn the player thread around the producer end of a transport.
pub fn spawn_player(
    link: RenderLink,
    signals: Receiver<FlowSignal>,
    cfg: PlaybackConfig,
    sample_rate: u32,
    status: Arc<Mutex<PlayerStatusState>>,
) -> Result<PlayerHandle> {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
    let ctrl = RefillController::new(link, cfg, sample_rate);

    let join = std::thread::Builder::new()
        .name("fm-player".to_string())
        .spawn(move || player_thread_main(ctrl, cmd_rx, signals, event_tx, status))
        .context("spawn player thread")?;

    Ok(PlayerHandle {
        cmd_tx,
        events: event_rx,
        join: Some(join),
    })
}

/// Main loop for the player thread.
fn player_thread_main(
    mut ctrl: RefillController,
    cmd_rx: Receiver<PlayerCommand>,
    signals: Receiver<FlowSignal>,
    events: Sender<PlayerEvent>,
    status: Arc<Mutex<PlayerStatusState>>,
) {
    let mut last_state = ctrl.state();
    sync_status(&status, &ctrl);

    loop {
        select! {
            recv(cmd_rx) -> msg => {
                let cmd = match msg {
                    Ok(PlayerCommand::Shutdown) | Err(_) => {
                        if let Err(e) = ctrl.stop() {
                            tracing::warn!(error = %e, "stop on shutdown failed");
                        }
                        break;
                    }
                    Ok(cmd) => cmd,
                };
                if let Err(e) = apply_command(&mut ctrl, cmd, &events) {
                    tracing::warn!(error = %e, "player command failed");
                }
            }
            recv(signals) -> msg => {
                let Ok(signal) = msg else {
                    tracing::warn!("render side closed; player exiting");
                    break;
                };
                let current = signal.epoch() == ctrl.epoch();
                if let Some(reason) = ctrl.handle_signal(signal) {
                    emit(&events, PlayerEvent::Ended(reason));
                }
                if current && matches!(signal, FlowSignal::Position { .. }) {
                    emit(&events, PlayerEvent::Position {
                        elapsed_ms: ctrl.position_ms(),
                    });
                }
            }
        }

        let state = ctrl.state();
        if state != last_state {
            last_state = state;
            emit(&events, PlayerEvent::StateChanged(state));
        }
        sync_status(&status, &ctrl);
    }

    sync_status(&status, &ctrl);
    tracing::debug!("player thread exited");
}

fn apply_command(
    ctrl: &mut RefillController,
    cmd: PlayerCommand,
    events: &Sender<PlayerEvent>,
) -> Result<()> {
    match cmd {
        PlayerCommand::Load(source) => {
            ctrl.load(source)?;
            if let Some(info) = ctrl.track_info() {
                emit(events, PlayerEvent::TrackLoaded(info));
            }
        }
        PlayerCommand::Play => ctrl.play()?,
        PlayerCommand::Pause => ctrl.pause()?,
        PlayerCommand::PauseToggle => ctrl.toggle_pause()?,
        PlayerCommand::Stop => ctrl.stop()?,
        PlayerCommand::Seek { seconds } => {
            ctrl.seek(seconds)?;
            emit(events, PlayerEvent::Position {
                elapsed_ms: ctrl.position_ms(),
            });
        }
        PlayerCommand::SetSubsong { index } => {
            ctrl.set_subsong(index)?;
            if let Some(info) = ctrl.track_info() {
                emit(events, PlayerEvent::TrackLoaded(info));
            }
        }
        PlayerCommand::SetLoop { enabled } => ctrl.set_loop(enabled),
        PlayerCommand::Shutdown => {}
    }
    Ok(())
}

/// Publish without blocking the worker on a slow reader.
fn emit(events: &Sender<PlayerEvent>, event: PlayerEvent) {
    if let Err(TrySendError::Full(event)) = events.try_send(event) {
        tracing::trace!(?event, "event channel full, dropping");
    }
}

/// Mirror controller state into the shared status store.
fn sync_status(status: &Arc<Mutex<PlayerStatusState>>, ctrl: &RefillController) {
    let Ok(mut s) = status.lock() else {
        return;
    };
    s.state = ctrl.state();
    s.loop_enabled = ctrl.loop_enabled();
    s.end_reason = ctrl.end_reason();
    match ctrl.state() {
        PlaybackState::Idle | PlaybackState::Stopped => s.clear_playback(),
        _ => {
            s.track = ctrl.track_info();
            s.elapsed_frames = Some(ctrl.position());
            s.duration_ms = ctrl.duration_seconds().map(|d| (d * 1000.0).round() as u64);
            s.subsong = ctrl.subsong();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ToneSource;
    use crate::transport;
    use std::time::{Duration, Instant};

    const RATE: u32 = 1_000;

    fn test_config() -> PlaybackConfig {
        PlaybackConfig {
            chunk_frames: 64,
            low_water_frames: 128,
            target_buffer_frames: 256,
            max_request_frames: 256,
            max_buffer_seconds: 1.0,
            position_interval_frames: 50,
            ..Default::default()
        }
    }

    /// Wait for an event matching `pred`, rendering quanta on this thread meanwhile.
    fn render_until(
        render: &mut crate::render::RenderLoop,
        handle: &PlayerHandle,
        mut pred: impl FnMut(&PlayerEvent) -> bool,
    ) -> PlayerEvent {
        let mut out = vec![0.0f32; 64];
        for _ in 0..2_000 {
            render.process(&mut out, 2);
            if let Ok(ev) = handle.events().recv_timeout(Duration::from_millis(5)) {
                if pred(&ev) {
                    return ev;
                }
            }
        }
        panic!("expected event never arrived");
    }

    #[test]
    fn worker_plays_track_to_end_and_reports() {
        let cfg = test_config();
        let (link, mut render, signals) = transport::channel(&cfg, RATE);
        let status = PlayerStatusState::shared();
        let handle = spawn_player(link, signals, cfg, RATE, status.clone()).unwrap();

        handle
            .send(PlayerCommand::Load(Box::new(ToneSource::new(RATE, 220.0, 0.5))))
            .unwrap();
        handle.send(PlayerCommand::Play).unwrap();

        let ev = render_until(&mut render, &handle, |e| {
            matches!(e, PlayerEvent::TrackLoaded(_))
        });
        assert_eq!(
            ev,
            PlayerEvent::TrackLoaded(ToneSource::new(RATE, 220.0, 0.5).track_info())
        );

        render_until(&mut render, &handle, |e| {
            matches!(e, PlayerEvent::Position { elapsed_ms } if *elapsed_ms > 0)
        });
        let ev = render_until(&mut render, &handle, |e| matches!(e, PlayerEvent::Ended(_)));
        assert_eq!(ev, PlayerEvent::Ended(PlaybackEndReason::Eof));

        handle.shutdown();
        let snap = status.lock().unwrap().snapshot();
        assert_eq!(snap.state, PlaybackState::Stopped);
        assert_eq!(snap.end_reason, Some(PlaybackEndReason::Eof));
        assert!(snap.track.is_none());
    }

    #[test]
    fn unread_events_stay_bounded() {
        let cfg = test_config();
        let (link, mut render, signals) = transport::channel(&cfg, RATE);
        let status = PlayerStatusState::shared();
        let handle = spawn_player(link, signals, cfg, RATE, status).unwrap();

        handle
            .send(PlayerCommand::Load(Box::new(ToneSource::new(RATE, 220.0, 600.0))))
            .unwrap();
        handle.send(PlayerCommand::Play).unwrap();

        let mut out = vec![0.0f32; 64];
        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.events().len() < EVENT_CAPACITY {
            assert!(Instant::now() < deadline, "event channel never filled");
            render.process(&mut out, 2);
            std::thread::sleep(Duration::from_micros(200));
        }
        for _ in 0..500 {
            render.process(&mut out, 2);
            std::thread::sleep(Duration::from_micros(200));
        }
        assert_eq!(handle.events().len(), EVENT_CAPACITY);

        // Still responsive once the reader catches up.
        while handle.events().try_recv().is_ok() {}
        handle.send(PlayerCommand::Pause).unwrap();
        render_until(&mut render, &handle, |e| {
            *e == PlayerEvent::StateChanged(PlaybackState::Paused)
        });
        handle.shutdown();
    }

    #[test]
    fn failed_command_keeps_worker_alive() {
        let cfg = test_config();
        let (link, mut render, signals) = transport::channel(&cfg, RATE);
        let status = PlayerStatusState::shared();
        let handle = spawn_player(link, signals, cfg, RATE, status.clone()).unwrap();

        // Nothing loaded: both fail and are logged.
        handle.send(PlayerCommand::Play).unwrap();
        handle.send(PlayerCommand::Seek { seconds: 1.0 }).unwrap();
        handle
            .send(PlayerCommand::Load(Box::new(ToneSource::new(RATE, 220.0, 2.0))))
            .unwrap();
        handle.send(PlayerCommand::Play).unwrap();

        render_until(&mut render, &handle, |e| {
            *e == PlayerEvent::StateChanged(PlaybackState::Playing)
        });
        handle.send(PlayerCommand::Stop).unwrap();
        render_until(&mut render, &handle, |e| {
            *e == PlayerEvent::StateChanged(PlaybackState::Stopped)
        });
        handle.shutdown();
        assert_eq!(
            status.lock().unwrap().end_reason,
            Some(PlaybackEndReason::Stopped)
        );
    }
}
