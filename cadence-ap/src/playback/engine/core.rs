//! Core playback engine - lifecycle and orchestration
//!
//! **Responsibilities:**
//! - PlaybackEngine struct definition and initialization
//! - Lifecycle control (start, shutdown)
//! - Queue advancement (`process_queue`): select, resolve, open, play, prefetch
//! - Transition locking shared by every command that replaces the playback

use crate::audio::AudioSink;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::pipeline::{StreamPipeline, StreamRequest};
use crate::playback::events::PlayerEvent;
use crate::playback::player::AudioPlayer;
use crate::playback::queue_manager::{AdvanceKind, QueueManager};
use crate::prefetch::{PrefetchCache, PrefetchKey};
use crate::resolver::{DirectStreamLookup, TrackResolver};
use crate::state::SharedState;
use cadence_common::events::{QueueChangeTrigger, SessionEvent};
use cadence_common::{Requester, Track};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators of a session
#[derive(Clone)]
pub struct EngineServices {
    pub pipeline: Arc<dyn StreamPipeline>,
    pub resolver: Arc<dyn TrackResolver>,
    pub lookup: Arc<dyn DirectStreamLookup>,
}

/// Playback engine - orchestrates one voice session
///
/// Owns the queue, the player and the prefetch cache. Every transition that
/// replaces the playback (advance, skip, stop, previous, jump, seek, filter
/// rebuild, teardown) runs under the transition lock.
pub struct PlaybackEngine {
    /// Shared state (settings, volume, clock, event bus)
    pub(super) state: Arc<SharedState>,

    /// Queue manager (current / upcoming / history)
    pub(super) queue: Arc<RwLock<QueueManager>>,

    /// Audio player driving the transport's sink
    pub(super) player: Arc<AudioPlayer>,

    pub(super) services: EngineServices,

    pub(super) prefetch: Arc<PrefetchCache>,

    /// Held for exactly one transition
    pub(super) transition: Arc<Mutex<()>>,

    /// Set when an advance was requested while the transition lock was held
    pub(super) advance_pending: Arc<AtomicBool>,

    /// Player event receiver, taken by the player event handler on start
    pub(super) player_event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<PlayerEvent>>>>,

    /// False once the session has been torn down
    pub(super) running: Arc<AtomicBool>,

    /// Cancels background tasks on shutdown
    pub(super) shutdown_token: CancellationToken,

    pub(super) config: Arc<EngineConfig>,
}

impl PlaybackEngine {
    /// Create a session engine writing to `sink`
    pub fn new(config: EngineConfig, sink: Arc<dyn AudioSink>, services: EngineServices) -> Self {
        let state = Arc::new(SharedState::new(
            config.session.default_volume,
            config.session.autoplay,
            config.session.event_capacity,
        ));
        let (player, player_event_rx) = AudioPlayer::new(sink);
        let prefetch = PrefetchCache::new(
            Arc::clone(&services.resolver),
            Arc::clone(&services.lookup),
            &config.prefetch,
        );

        info!("Session {} created", state.session_id);

        Self {
            state,
            queue: Arc::new(RwLock::new(QueueManager::new(config.session.history_capacity))),
            player: Arc::new(player),
            services,
            prefetch: Arc::new(prefetch),
            transition: Arc::new(Mutex::new(())),
            advance_pending: Arc::new(AtomicBool::new(false)),
            player_event_rx: Arc::new(Mutex::new(Some(player_event_rx))),
            running: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            config: Arc::new(config),
        }
    }

    /// Start background tasks (player event handler)
    pub async fn start(&self) -> Result<()> {
        let rx = self
            .player_event_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Internal("Engine already started".to_string()))?;

        let self_clone = self.clone_handles();
        tokio::spawn(async move {
            self_clone.player_event_handler(rx).await;
        });

        info!("Session {} started", self.state.session_id);
        Ok(())
    }

    /// Tear the session down: stop playback, flush queue, history and prefetch cache
    ///
    /// Idempotent; commands issued afterwards are rejected.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Session {} shutting down", self.state.session_id);

        let _guard = self.transition.lock().await;
        self.queue.write().await.reset();
        self.player.stop().await;
        self.prefetch.clear();
        self.state.clock.write().await.reset();

        self.broadcast_queue_changed(QueueChangeTrigger::Teardown).await;
        self.shutdown_token.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been shut down
    pub async fn closed(&self) {
        self.shutdown_token.cancelled().await
    }

    pub(super) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::invalid("Session has ended"))
        }
    }

    /// Advance the queue if the player is idle
    ///
    /// Single-flight: if another transition holds the lock, the request is
    /// recorded and replayed by the holder when it releases, so concurrent
    /// Idle signals yield exactly one advance.
    pub async fn process_queue(&self) -> Result<()> {
        loop {
            let guard = match self.transition.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    self.advance_pending.store(true, Ordering::SeqCst);
                    // The holder may have released between the attempt and the store
                    match self.transition.try_lock() {
                        Ok(guard) => guard,
                        Err(_) => {
                            debug!("Transition in progress, advance deferred");
                            return Ok(());
                        }
                    }
                }
            };
            self.advance_pending.store(false, Ordering::SeqCst);

            let result = self.process_queue_locked().await;
            drop(guard);

            if !self.advance_pending.swap(false, Ordering::SeqCst) {
                return result;
            }
        }
    }

    async fn process_queue_locked(&self) -> Result<()> {
        if !self.is_running() || !self.player.is_idle() {
            return Ok(());
        }
        if self.queue.read().await.is_empty() {
            return Ok(());
        }
        self.advance_locked(AdvanceKind::Natural, QueueChangeTrigger::TrackCompletion)
            .await
    }

    /// Release the transition lock and replay any advance deferred meanwhile
    pub(super) async fn finish_transition(&self, guard: MutexGuard<'_, ()>) {
        drop(guard);
        if self.advance_pending.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.process_queue().await {
                warn!("Deferred advance failed: {}", e);
            }
        }
    }

    /// Select the next track and start it; caller holds the transition lock
    ///
    /// A track that fails to resolve or open is discarded (never reselected by
    /// repeat) and selection runs again, so one broken track can't stall the session.
    pub(super) async fn advance_locked(
        &self,
        kind: AdvanceKind,
        trigger: QueueChangeTrigger,
    ) -> Result<()> {
        let (repeat, autoplay) = {
            let settings = self.state.settings.read().await;
            (settings.repeat_mode, settings.autoplay)
        };

        let mut kind = kind;
        let mut trigger = trigger;
        let mut seed: Option<Track> = None;
        let mut autoplay_tried = false;

        loop {
            let (finished, next) = {
                let mut queue = self.queue.write().await;
                let finished = queue.current().cloned();
                let next = queue.select_next(repeat, kind).cloned();
                (finished, next)
            };
            if seed.is_none() {
                seed = finished;
            }

            let Some(next) = next else {
                if autoplay && !autoplay_tried {
                    autoplay_tried = true;
                    if let Some(finished) = &seed {
                        if self.autoplay_from(finished).await {
                            trigger = QueueChangeTrigger::Autoplay;
                            continue;
                        }
                    }
                }
                self.go_idle().await;
                return Ok(());
            };

            self.broadcast_queue_changed(trigger).await;
            match self.start_track(next).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Skipping unplayable track: {}", e);
                    self.queue.write().await.discard_current();
                    kind = AdvanceKind::Natural;
                    trigger = QueueChangeTrigger::ResolutionFailure;
                }
            }
        }
    }

    /// Start `track` as current, or discard it and advance if it can't be started
    ///
    /// Used by previous/jump, where the track was selected by the command.
    pub(super) async fn start_or_advance(
        &self,
        track: Track,
        trigger: QueueChangeTrigger,
    ) -> Result<()> {
        self.broadcast_queue_changed(trigger).await;
        match self.start_track(track).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Skipping unplayable track: {}", e);
                self.queue.write().await.discard_current();
                self.advance_locked(AdvanceKind::Natural, QueueChangeTrigger::ResolutionFailure)
                    .await
            }
        }
    }

    /// Resolve, open and play the already-selected current track
    async fn start_track(&self, mut track: Track) -> Result<()> {
        let prefetched = self.prefetch.take(&PrefetchKey::for_track(&track));

        if track.needs_metadata() {
            let metadata = match prefetched.as_ref().and_then(|p| p.metadata.clone()) {
                Some(metadata) => metadata,
                None => self.resolve_placeholder(&track).await?,
            };
            debug!("Resolved placeholder '{}' to {}", track, metadata.locator);
            track.resolve_with(metadata);
        }
        if let Some(prefetched) = prefetched {
            track.direct = Some(prefetched.direct);
        }

        // The resolved form replaces the placeholder as current
        {
            let mut queue = self.queue.write().await;
            if let Some(current) = queue.current_mut() {
                if current.id == track.id {
                    *current = track.clone();
                }
            }
        }

        let locator = track
            .locator()
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("'{}' has no locator", track)))?;
        let filters = self.state.settings.read().await.filters.clone();
        let request = StreamRequest::new(locator, self.state.volume.clone())
            .with_direct(track.direct.clone())
            .with_filters(filters);

        let stream = self.services.pipeline.open(request).await?;
        let playback_id = self.player.play(stream).await;
        self.state.clock.write().await.start(Duration::ZERO);

        info!("Now playing: {} (playback {})", track, playback_id);
        self.state.broadcast_event(SessionEvent::TrackStarted {
            session_id: self.state.session_id,
            track,
            timestamp: chrono::Utc::now(),
        });

        self.prefetch_head().await;
        Ok(())
    }

    /// Search for a placeholder's metadata
    async fn resolve_placeholder(&self, track: &Track) -> Result<cadence_common::TrackMetadata> {
        let query = track
            .search_text()
            .map(str::to_string)
            .unwrap_or_else(|| track.autoplay_query());
        let found = self
            .services
            .resolver
            .resolve(&query, &track.requester)
            .await?;
        found
            .into_iter()
            .find_map(|t| t.metadata().cloned())
            .ok_or_else(|| Error::Resolution(format!("No results for '{}'", query)))
    }

    /// Queue one related track after `finished`; false if nothing suitable came back
    async fn autoplay_from(&self, finished: &Track) -> bool {
        let query = finished.autoplay_query();
        debug!("Autoplay searching for '{}'", query);

        let results = match self
            .services
            .resolver
            .resolve(&query, &Requester::autoplay())
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Autoplay search failed: {}", e);
                return false;
            }
        };

        let finished_locator = finished.locator();
        let Some(pick) = results
            .into_iter()
            .find(|t| t.locator() != finished_locator)
        else {
            info!("Autoplay found nothing new after {}", finished);
            return false;
        };

        let mut pick = pick;
        pick.requester = Requester::autoplay();
        info!("Autoplay queued {}", pick);

        let position = self.queue.write().await.enqueue(pick.clone());
        self.state.broadcast_event(SessionEvent::TrackAdded {
            session_id: self.state.session_id,
            track: pick,
            position,
            timestamp: chrono::Utc::now(),
        });
        true
    }

    /// Nothing left: clear the clock and announce the end of the session's queue
    async fn go_idle(&self) {
        self.state.clock.write().await.reset();
        info!("Queue finished");
        self.broadcast_queue_changed(QueueChangeTrigger::TrackCompletion)
            .await;
        self.state.broadcast_event(SessionEvent::SessionFinished {
            session_id: self.state.session_id,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Fire-and-forget prefetch of the queue head
    pub(super) async fn prefetch_head(&self) {
        let head = self.queue.read().await.peek_next().cloned();
        if let Some(head) = head {
            self.prefetch.prefetch(&head);
        }
    }

    pub(super) async fn broadcast_queue_changed(&self, trigger: QueueChangeTrigger) {
        let queue = self.queue.read().await.snapshot();
        self.state.broadcast_event(SessionEvent::QueueChanged {
            session_id: self.state.session_id,
            queue,
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Clone the engine's handles for sharing across tasks
    pub(super) fn clone_handles(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            player: Arc::clone(&self.player),
            services: self.services.clone(),
            prefetch: Arc::clone(&self.prefetch),
            transition: Arc::clone(&self.transition),
            advance_pending: Arc::clone(&self.advance_pending),
            player_event_rx: Arc::clone(&self.player_event_rx),
            running: Arc::clone(&self.running),
            shutdown_token: self.shutdown_token.clone(),
            config: Arc::clone(&self.config),
        }
    }
}
