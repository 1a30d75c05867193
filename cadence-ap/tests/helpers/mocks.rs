//! In-memory stand-ins for the engine's external collaborators
//!
//! - MockResolver: canned query results, optional hang
//! - MockLookup: `direct:<locator>` addresses, per-locator failures
//! - MockPipeline: one duplex pipe per opened stream; the test feeds or ends it
//! - CaptureSink: records delivered frames

use async_trait::async_trait;
use cadence_ap::audio::{AudioSink, PcmFormat};
use cadence_ap::pipeline::{PcmStream, StreamPipeline, StreamRequest};
use cadence_ap::resolver::{DirectStreamLookup, TrackResolver};
use cadence_ap::{Error, Result};
use cadence_common::{DirectStream, Locator, Requester, Track};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};

// ========================================
// Resolver
// ========================================

#[derive(Default)]
pub struct MockResolver {
    results: Mutex<HashMap<String, Vec<Track>>>,
    queries: Mutex<Vec<String>>,
    hang: AtomicBool,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results returned for `query` (anything unknown returns no results)
    pub fn respond(&self, query: &str, tracks: Vec<Track>) {
        self.results.lock().unwrap().insert(query.to_string(), tracks);
    }

    /// Never answer (resolution runs until its caller gives up)
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl TrackResolver for MockResolver {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Vec<Track>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let found = self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        Ok(found
            .into_iter()
            .map(|mut t| {
                t.id = uuid::Uuid::new_v4();
                t.requester = requester.clone();
                t
            })
            .collect())
    }
}

// ========================================
// Direct stream lookup
// ========================================

#[derive(Default)]
pub struct MockLookup {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, locator: &str) {
        self.failing.lock().unwrap().insert(locator.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn address_for(locator: &str) -> String {
        format!("direct:{}", locator)
    }
}

#[async_trait]
impl DirectStreamLookup for MockLookup {
    async fn lookup(&self, locator: &Locator) -> Result<Option<DirectStream>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(locator.as_str()) {
            return Err(Error::Resolution(format!("lookup failed for {}", locator)));
        }
        Ok(Some(
            DirectStream::new(Self::address_for(locator.as_str())).with_header("User-Agent", "test"),
        ))
    }
}

// ========================================
// Pipeline
// ========================================

/// What the engine asked the pipeline for
#[derive(Debug, Clone)]
pub struct OpenedStream {
    pub locator: String,
    pub direct: Option<String>,
    pub start: Duration,
    pub filters: Vec<String>,
}

/// Pipeline whose streams play until the test ends them
///
/// Each open creates a pipe; its write half stays here. Dropping it (`finish`)
/// is a natural end of the track.
#[derive(Default)]
pub struct MockPipeline {
    feeds: tokio::sync::Mutex<HashMap<String, DuplexStream>>,
    opened: Mutex<Vec<OpenedStream>>,
    failing: Mutex<HashSet<String>>,
    open_delay: Mutex<Duration>,
}

impl MockPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening `locator` fails as if no strategy produced audio
    pub fn fail_for(&self, locator: &str) {
        self.failing.lock().unwrap().insert(locator.to_string());
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    /// End the stream most recently opened for `locator`
    pub async fn finish(&self, locator: &str) -> bool {
        self.feeds.lock().await.remove(locator).is_some()
    }

    /// Write raw PCM into the stream open for `locator`
    pub async fn feed(&self, locator: &str, bytes: &[u8]) -> io::Result<()> {
        let mut feeds = self.feeds.lock().await;
        let writer = feeds
            .get_mut(locator)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, locator.to_string()))?;
        writer.write_all(bytes).await
    }

    pub fn opened(&self) -> Vec<OpenedStream> {
        self.opened.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened_locators(&self) -> Vec<String> {
        self.opened().into_iter().map(|o| o.locator).collect()
    }
}

#[async_trait]
impl StreamPipeline for MockPipeline {
    async fn open(&self, request: StreamRequest) -> Result<PcmStream> {
        let delay = *self.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let locator = request.locator.as_str().to_string();
        self.opened.lock().unwrap().push(OpenedStream {
            locator: locator.clone(),
            direct: request.direct.as_ref().map(|d| d.address.clone()),
            start: request.start,
            filters: request.filters.names(),
        });

        if self.failing.lock().unwrap().contains(&locator) {
            return Err(Error::Resolution(format!("no audio from {}", locator)));
        }

        let (writer, reader) = tokio::io::duplex(64 * 1024);
        self.feeds.lock().await.insert(locator, writer);
        Ok(PcmStream::from_reader(
            reader,
            request.volume.clone(),
            PcmFormat::default(),
        ))
    }
}

// ========================================
// Sink
// ========================================

#[derive(Default)]
pub struct CaptureSink {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for CaptureSink {
    async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}
