//! Test helper modules for Cadence player integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestSession: an engine wired to in-memory collaborators
//! - Mocks: resolver, direct lookup, gated pipeline, capture sink
//! - MockTransport: scriptable connection state
//! - Event waiting helpers

#![allow(dead_code)]

pub mod mocks;
pub mod transport;

pub use mocks::{CaptureSink, MockLookup, MockPipeline, MockResolver, OpenedStream};
pub use transport::{MockTransport, ReconnectOutcome};

use cadence_ap::config::EngineConfig;
use cadence_ap::playback::{EngineServices, PlaybackEngine};
use cadence_common::config::TransportConfig;
use cadence_common::events::SessionEvent;
use cadence_common::{Locator, PlaceholderTrack, Requester, Track, TrackMetadata};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long any single expected event may take
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Locator used for the track titled `name`
pub fn locator_of(name: &str) -> String {
    format!("https://media.test/{}", name)
}

pub fn requester() -> Requester {
    Requester::new("u1", "tester")
}

/// Resolved track titled `name`, 180 s long
pub fn track(name: &str) -> Track {
    Track::resolved(
        TrackMetadata {
            title: name.to_string(),
            artist: "Artist".to_string(),
            duration_secs: Some(180),
            url: locator_of(name),
            thumbnail: None,
            locator: Locator::new(locator_of(name)),
        },
        requester(),
    )
}

/// Placeholder that resolves through the search phrase `search`
pub fn placeholder(title: &str, search: &str) -> Track {
    Track::placeholder(
        PlaceholderTrack {
            title: title.to_string(),
            artist: "Artist".to_string(),
            duration_secs: None,
            search_text: search.to_string(),
        },
        requester(),
    )
}

pub fn titles(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.title().to_string()).collect()
}

/// Transport settings with millisecond backoff
pub fn fast_transport_config() -> TransportConfig {
    TransportConfig {
        max_reconnect_attempts: 3,
        reconnect_base_delay_ms: 5,
        ready_timeout_ms: 100,
    }
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.transport = fast_transport_config();
    config
}

/// Engine plus handles on every mock it talks to
pub struct TestSession {
    pub engine: Arc<PlaybackEngine>,
    pub resolver: Arc<MockResolver>,
    pub lookup: Arc<MockLookup>,
    pub pipeline: Arc<MockPipeline>,
    pub sink: Arc<CaptureSink>,
    pub events: broadcast::Receiver<SessionEvent>,
}

pub struct Mocks {
    pub resolver: Arc<MockResolver>,
    pub lookup: Arc<MockLookup>,
    pub pipeline: Arc<MockPipeline>,
    pub sink: Arc<CaptureSink>,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(MockResolver::new()),
            lookup: Arc::new(MockLookup::new()),
            pipeline: Arc::new(MockPipeline::new()),
            sink: Arc::new(CaptureSink::new()),
        }
    }

    pub fn services(&self) -> EngineServices {
        EngineServices {
            pipeline: self.pipeline.clone(),
            resolver: self.resolver.clone(),
            lookup: self.lookup.clone(),
        }
    }
}

impl TestSession {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let mocks = Mocks::new();
        let engine = Arc::new(PlaybackEngine::new(
            config,
            mocks.sink.clone(),
            mocks.services(),
        ));
        let events = engine.subscribe();
        engine.start().await.expect("engine starts");

        Self {
            engine,
            resolver: mocks.resolver,
            lookup: mocks.lookup,
            pipeline: mocks.pipeline,
            sink: mocks.sink,
            events,
        }
    }

    /// End the playing stream of `name` (a natural end of the track)
    pub async fn finish(&self, name: &str) {
        assert!(
            self.pipeline.finish(&locator_of(name)).await,
            "no open stream for {}",
            name
        );
    }

    pub async fn now_playing_title(&self) -> Option<String> {
        self.engine.now_playing().await.map(|t| t.title().to_string())
    }

    pub async fn queue_titles(&self) -> Vec<String> {
        titles(&self.engine.queue_snapshot().await)
    }

    pub async fn history_titles(&self) -> Vec<String> {
        titles(&self.engine.history_snapshot().await)
    }

    /// Wait for the next event matching `pred`, skipping others
    pub async fn expect_event<F>(&mut self, pred: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        wait_for_event(&mut self.events, pred).await
    }

    pub async fn expect_started(&mut self, name: &str) {
        self.expect_event(|e| is_started(e, name)).await;
    }
}

pub fn is_started(event: &SessionEvent, name: &str) -> bool {
    matches!(event, SessionEvent::TrackStarted { track, .. } if track.title() == name)
}

/// Wait for the next event matching `pred`; panics after `EVENT_TIMEOUT`
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let found = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for event")
}

/// Drain everything already published
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `check` until it holds; panics after `EVENT_TIMEOUT`
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
