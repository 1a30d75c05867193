//! Audio player
//!
//! Drives one `PcmStream` at a time into an `AudioSink` from a pump task.
//!
//! State machine: `Idle --play--> Playing <--pause/resume--> Paused`, and any
//! state returns to `Idle` when a playback ends. Every playback ends with exactly
//! one `PlayerEvent::Idle`: the pump reports natural ends (finished, errored),
//! `stop` reports `Stopped`. Whoever removes the playback from `active` first
//! is the one that reports, so the two can't both emit.

use super::events::{IdleCause, PlaybackId, PlayerEvent};
use crate::audio::AudioSink;
use crate::pipeline::PcmStream;
use cadence_common::events::PlaybackState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ActivePlayback {
    id: PlaybackId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// How the pump loop ended
enum PumpOutcome {
    Finished,
    Errored(String),
    Cancelled,
}

pub struct AudioPlayer {
    sink: Arc<dyn AudioSink>,
    state_tx: Arc<watch::Sender<PlaybackState>>,
    active: Arc<Mutex<Option<ActivePlayback>>>,
    next_id: AtomicU64,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    frames_written: Arc<AtomicU64>,
}

impl AudioPlayer {
    /// Create a player and the receiver for its events
    pub fn new(sink: Arc<dyn AudioSink>) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let player = Self {
            sink,
            state_tx: Arc::new(state_tx),
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            event_tx,
            frames_written: Arc::new(AtomicU64::new(0)),
        };
        (player, event_rx)
    }

    pub fn state(&self) -> PlaybackState {
        *self.state_tx.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == PlaybackState::Idle
    }

    /// Id of the most recent `play` call (0 before the first)
    pub fn latest_playback_id(&self) -> PlaybackId {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// Frames delivered to the sink since the player was created
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Start playing `stream`, stopping whatever was playing
    pub async fn play(&self, stream: PcmStream) -> PlaybackId {
        self.stop().await;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        // Hold `active` until the new playback is registered, so a pump that
        // ends immediately still finds itself there
        let mut active = self.active.lock().await;
        if let Some(stale) = active.take() {
            // A concurrent play() won the race between our stop and this lock
            stale.cancel.cancel();
            self.emit(PlayerEvent::Idle {
                playback_id: stale.id,
                cause: IdleCause::Stopped,
            });
        }

        set_state(&self.state_tx, &self.event_tx, PlaybackState::Playing);
        debug!("Playback {} started ({})", id, stream.strategy());

        let task = tokio::spawn(pump(
            id,
            stream,
            Arc::clone(&self.sink),
            cancel.clone(),
            Arc::clone(&self.state_tx),
            Arc::clone(&self.active),
            self.event_tx.clone(),
            Arc::clone(&self.frames_written),
        ));
        *active = Some(ActivePlayback { id, cancel, task });
        id
    }

    /// Stop the active playback and wait for its stream to close
    ///
    /// Returns false when nothing was playing. Emits `Idle { cause: Stopped }`.
    pub async fn stop(&self) -> bool {
        let Some(playback) = self.active.lock().await.take() else {
            return false;
        };

        playback.cancel.cancel();
        if let Err(e) = playback.task.await {
            warn!("Playback {} task failed: {}", playback.id, e);
        }
        set_state(&self.state_tx, &self.event_tx, PlaybackState::Idle);
        self.emit(PlayerEvent::Idle {
            playback_id: playback.id,
            cause: IdleCause::Stopped,
        });
        debug!("Playback {} stopped", playback.id);
        true
    }

    /// Playing → Paused; false in any other state
    pub fn pause(&self) -> bool {
        self.transition(PlaybackState::Playing, PlaybackState::Paused)
    }

    /// Paused → Playing; false in any other state
    pub fn resume(&self) -> bool {
        self.transition(PlaybackState::Paused, PlaybackState::Playing)
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            self.emit(PlayerEvent::StateChanged {
                old_state: from,
                new_state: to,
            });
        }
        changed
    }

    fn emit(&self, event: PlayerEvent) {
        // Receiver gone means the session is shutting down
        let _ = self.event_tx.send(event);
    }
}

fn set_state(
    state_tx: &watch::Sender<PlaybackState>,
    event_tx: &mpsc::UnboundedSender<PlayerEvent>,
    new_state: PlaybackState,
) {
    let old_state = state_tx.send_replace(new_state);
    if old_state != new_state {
        let _ = event_tx.send(PlayerEvent::StateChanged {
            old_state,
            new_state,
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump(
    id: PlaybackId,
    mut stream: PcmStream,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<PlaybackState>>,
    active: Arc<Mutex<Option<ActivePlayback>>>,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    frames_written: Arc<AtomicU64>,
) {
    let mut state_rx = state_tx.subscribe();
    let outcome = pump_frames(&mut stream, sink.as_ref(), &cancel, &mut state_rx, &frames_written).await;
    let played = stream.position();

    stream.close().await;
    if let Err(e) = sink.flush().await {
        debug!("Playback {}: sink flush failed: {}", id, e);
    }

    let cause = match outcome {
        PumpOutcome::Cancelled => return,
        PumpOutcome::Finished => IdleCause::Finished,
        PumpOutcome::Errored(reason) => IdleCause::Errored(reason),
    };

    let mut guard = active.lock().await;
    if guard.as_ref().map(|a| a.id) != Some(id) {
        // stop() already took this playback and reports it
        return;
    }
    guard.take();

    match &cause {
        IdleCause::Errored(reason) => {
            warn!("Playback {} ended with error after {:?}: {}", id, played, reason)
        }
        _ => info!("Playback {} finished after {:?}", id, played),
    }
    // Still under the lock: a play() racing in must see Idle before it sets Playing
    set_state(&state_tx, &event_tx, PlaybackState::Idle);
    let _ = event_tx.send(PlayerEvent::Idle {
        playback_id: id,
        cause,
    });
    drop(guard);
}

async fn pump_frames(
    stream: &mut PcmStream,
    sink: &dyn AudioSink,
    cancel: &CancellationToken,
    state_rx: &mut watch::Receiver<PlaybackState>,
    frames_written: &AtomicU64,
) -> PumpOutcome {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return PumpOutcome::Cancelled,
            frame = stream.next_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                // A frame read while paused is held until resume
                if !wait_while_paused(cancel, state_rx).await {
                    return PumpOutcome::Cancelled;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return PumpOutcome::Cancelled,
                    written = sink.write_frame(&frame) => {
                        if let Err(e) = written {
                            return PumpOutcome::Errored(format!("sink write failed: {}", e));
                        }
                    }
                }
                frames_written.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => return PumpOutcome::Finished,
            Err(e) => return PumpOutcome::Errored(format!("stream read failed: {}", e)),
        }
    }
}

/// Returns false if cancelled while paused
async fn wait_while_paused(
    cancel: &CancellationToken,
    state_rx: &mut watch::Receiver<PlaybackState>,
) -> bool {
    if *state_rx.borrow_and_update() != PlaybackState::Paused {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        resumed = async { state_rx.wait_for(|s| *s != PlaybackState::Paused).await.is_ok() } => resumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmFormat;
    use crate::pipeline::VolumeHandle;
    use async_trait::async_trait;
    use std::io;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct CountingSink {
        frames: AtomicU64,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn write_frame(&self, _frame: &[u8]) -> io::Result<()> {
            self.frames.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn format() -> PcmFormat {
        // 80-byte frames
        PcmFormat::new(1000, 2)
    }

    async fn next_idle(rx: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> (PlaybackId, IdleCause) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for player event")
                .expect("player dropped");
            if let PlayerEvent::Idle { playback_id, cause } = event {
                return (playback_id, cause);
            }
        }
    }

    #[tokio::test]
    async fn test_stream_plays_to_end() {
        let sink = Arc::new(CountingSink::default());
        let (player, mut rx) = AudioPlayer::new(sink.clone());

        let stream = PcmStream::from_reader(
            io::Cursor::new(vec![0u8; 800]),
            VolumeHandle::default(),
            format(),
        );
        let id = player.play(stream).await;

        assert_eq!(next_idle(&mut rx).await, (id, IdleCause::Finished));
        assert_eq!(sink.frames.load(Ordering::Relaxed), 10);
        assert!(player.is_idle());
    }

    #[tokio::test]
    async fn test_stop_reports_stopped_once() {
        let (player, mut rx) = AudioPlayer::new(Arc::new(CountingSink::default()));
        let (writer, reader) = tokio::io::duplex(1024);

        let id = player
            .play(PcmStream::from_reader(reader, VolumeHandle::default(), format()))
            .await;
        assert_eq!(player.state(), PlaybackState::Playing);

        assert!(player.stop().await);
        assert_eq!(next_idle(&mut rx).await, (id, IdleCause::Stopped));
        assert!(!player.stop().await);

        // Closing the source after stop must not produce a second Idle
        drop(writer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, PlayerEvent::Idle { .. }), "unexpected {:?}", event);
        }
    }

    #[tokio::test]
    async fn test_pause_holds_frames() {
        let sink = Arc::new(CountingSink::default());
        let (player, mut rx) = AudioPlayer::new(sink.clone());
        let (mut writer, reader) = tokio::io::duplex(4096);

        player
            .play(PcmStream::from_reader(reader, VolumeHandle::default(), format()))
            .await;
        assert!(player.pause());
        assert!(!player.pause());
        assert_eq!(player.state(), PlaybackState::Paused);

        writer.write_all(&[0u8; 160]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.frames.load(Ordering::Relaxed), 0);

        assert!(player.resume());
        drop(writer);
        let (_, cause) = next_idle(&mut rx).await;
        assert_eq!(cause, IdleCause::Finished);
        assert_eq!(sink.frames.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_play_replaces_active_playback() {
        let (player, mut rx) = AudioPlayer::new(Arc::new(CountingSink::default()));
        let (_writer, reader) = tokio::io::duplex(64);

        let first = player
            .play(PcmStream::from_reader(reader, VolumeHandle::default(), format()))
            .await;
        let second = player
            .play(PcmStream::from_reader(
                io::Cursor::new(vec![0u8; 80]),
                VolumeHandle::default(),
                format(),
            ))
            .await;

        assert_eq!(next_idle(&mut rx).await, (first, IdleCause::Stopped));
        assert_eq!(next_idle(&mut rx).await, (second, IdleCause::Finished));
    }

    #[tokio::test]
    async fn test_pause_when_idle_is_rejected() {
        let (player, _rx) = AudioPlayer::new(Arc::new(CountingSink::default()));
        assert!(!player.pause());
        assert!(!player.resume());
        assert!(player.is_idle());
    }
}
