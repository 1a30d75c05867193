//! Prefetch cache
//!
//! Resolves the direct address (and, for placeholders, the metadata) of the next
//! queued track while the current one plays, so the advance can start the fast
//! path without waiting on the resolver.
//!
//! - At most one resolution per key is in flight; repeat requests are dropped.
//! - A completed entry is consumed by `take`; it never expires on its own.
//! - An in-flight resolution is abandoned after `resolve_timeout`.
//! - `clear` drops every entry; resolutions started before it can't repopulate.

use crate::resolver::{DirectStreamLookup, TrackResolver};
use cadence_common::config::PrefetchConfig;
use cadence_common::{DirectStream, Locator, Track, TrackMetadata};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Cache key: the locator, or the search phrase for placeholders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrefetchKey {
    Locator(Locator),
    Search(String),
}

impl PrefetchKey {
    pub fn for_track(track: &Track) -> Self {
        match (track.locator(), track.search_text()) {
            (Some(locator), _) => PrefetchKey::Locator(locator.clone()),
            (None, Some(text)) => PrefetchKey::Search(text.to_string()),
            (None, None) => PrefetchKey::Search(track.autoplay_query()),
        }
    }
}

impl fmt::Display for PrefetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefetchKey::Locator(locator) => write!(f, "{}", locator),
            PrefetchKey::Search(text) => write!(f, "search:{}", text),
        }
    }
}

/// Result of a completed prefetch
#[derive(Debug, Clone)]
pub struct PrefetchedStream {
    /// Resolved metadata when the track was a placeholder
    pub metadata: Option<TrackMetadata>,
    pub direct: DirectStream,
}

type Entries = Arc<Mutex<HashMap<PrefetchKey, PrefetchedStream>>>;
type InFlight = Arc<Mutex<HashSet<PrefetchKey>>>;

/// Removes its key from the in-flight set however the resolution ends
struct InFlightGuard {
    key: PrefetchKey,
    in_flight: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct PrefetchCache {
    resolver: Arc<dyn TrackResolver>,
    lookup: Arc<dyn DirectStreamLookup>,
    entries: Entries,
    in_flight: InFlight,
    /// Bumped by `clear`; resolutions from an older generation are discarded
    generation: Arc<AtomicU64>,
    enabled: bool,
    resolve_timeout: Duration,
}

impl PrefetchCache {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        lookup: Arc<dyn DirectStreamLookup>,
        config: &PrefetchConfig,
    ) -> Self {
        Self {
            resolver,
            lookup,
            entries: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            generation: Arc::new(AtomicU64::new(0)),
            enabled: config.enabled,
            resolve_timeout: config.resolve_timeout(),
        }
    }

    /// Start resolving `track` in the background
    ///
    /// Returns false when prefetch is disabled, the key is cached, or a
    /// resolution for it is already running.
    pub fn prefetch(&self, track: &Track) -> bool {
        if !self.enabled {
            return false;
        }
        let key = PrefetchKey::for_track(track);

        if self.contains(&key) {
            return false;
        }
        {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                return false;
            };
            if !in_flight.insert(key.clone()) {
                debug!("Prefetch already in flight: {}", key);
                return false;
            }
        }

        let guard = InFlightGuard {
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        let resolver = Arc::clone(&self.resolver);
        let lookup = Arc::clone(&self.lookup);
        let entries = Arc::clone(&self.entries);
        let generation = Arc::clone(&self.generation);
        let started_generation = generation.load(Ordering::SeqCst);
        let timeout = self.resolve_timeout;
        let track = track.clone();

        debug!("Prefetching {}", key);
        tokio::spawn(async move {
            let _guard = guard;
            let resolved = tokio::time::timeout(
                timeout,
                resolve_track(resolver.as_ref(), lookup.as_ref(), &track),
            )
            .await;

            match resolved {
                Ok(Some(prefetched)) => {
                    if generation.load(Ordering::SeqCst) != started_generation {
                        debug!("Discarding prefetch of {} (cache cleared)", key);
                        return;
                    }
                    if let Ok(mut entries) = entries.lock() {
                        entries.insert(key.clone(), prefetched);
                    }
                    debug!("Prefetched {}", key);
                }
                Ok(None) => debug!("Nothing to prefetch for {}", key),
                Err(_) => warn!("Prefetch of {} timed out after {:?}", key, timeout),
            }
        });
        true
    }

    /// Consume the entry for `key`
    pub fn take(&self, key: &PrefetchKey) -> Option<PrefetchedStream> {
        self.entries.lock().ok()?.remove(key)
    }

    pub fn contains(&self, key: &PrefetchKey) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Drop every entry and orphan running resolutions
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Metadata (placeholders only) then direct address; any failure yields None
async fn resolve_track(
    resolver: &dyn TrackResolver,
    lookup: &dyn DirectStreamLookup,
    track: &Track,
) -> Option<PrefetchedStream> {
    let (metadata, locator) = match (track.locator(), track.search_text()) {
        (Some(locator), _) => (None, locator.clone()),
        (None, Some(text)) => {
            let found = match resolver.resolve(text, &track.requester).await {
                Ok(found) => found,
                Err(e) => {
                    debug!("Prefetch search failed for '{}': {}", text, e);
                    return None;
                }
            };
            let meta = found.into_iter().find_map(|t| t.metadata().cloned())?;
            let locator = meta.locator.clone();
            (Some(meta), locator)
        }
        (None, None) => return None,
    };

    match lookup.lookup(&locator).await {
        Ok(Some(direct)) => Some(PrefetchedStream { metadata, direct }),
        Ok(None) => None,
        Err(e) => {
            debug!("Prefetch lookup failed for {}: {}", locator, e);
            None
        }
    }
}
