//! Track resolution seams
//!
//! `TrackResolver` turns a user query (URL or free text) into tracks;
//! `DirectStreamLookup` turns a locator into a short-lived direct address.
//! Both may be slow and may fail; callers treat failures as track-local.

pub mod ytdlp;

pub use ytdlp::YtDlpResolver;

use crate::error::Result;
use async_trait::async_trait;
use cadence_common::{DirectStream, Locator, Requester, Track};

/// Resolves queries into playable tracks
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Tracks matching `query`, best match first; empty when nothing matched
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Vec<Track>>;
}

/// Resolves a locator into a direct media address
#[async_trait]
pub trait DirectStreamLookup: Send + Sync {
    /// `Ok(None)` when the origin has no direct address for this locator
    async fn lookup(&self, locator: &Locator) -> Result<Option<DirectStream>>;
}
