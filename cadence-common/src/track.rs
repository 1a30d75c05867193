//! Track data model
//!
//! A track is either fully resolved (metadata plus a locator the stream pipeline can
//! play) or a placeholder imported in bulk that only carries display fields and a
//! search phrase. The placeholder state is a variant, not a set of nullable fields,
//! so code that needs a locator has to handle the unresolved case explicitly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Abstract identifier the resolver turns into a playable stream
/// (a catalog reference, a page URL, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the locator is a literal http(s) URL
    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of whoever asked for a track (or triggered an operation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub name: String,
}

const AUTOPLAY_REQUESTER_ID: &str = "autoplay";

impl Requester {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Requester attached to tracks the engine picks on its own
    pub fn autoplay() -> Self {
        Self::new(AUTOPLAY_REQUESTER_ID, "Autoplay")
    }

    pub fn is_autoplay(&self) -> bool {
        self.id == AUTOPLAY_REQUESTER_ID
    }
}

/// Short-lived literal media address plus the headers the origin expects
///
/// Addresses expire; never persist one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectStream {
    pub address: String,
    pub headers: Vec<(String, String)>,
}

impl DirectStream {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Headers rendered as one CRLF-terminated block (`Name: value\r\n` per header)
    pub fn header_block(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}\r\n", name, value))
            .collect()
    }
}

/// Full metadata of a resolved track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    /// Duration in seconds (None for live streams)
    pub duration_secs: Option<u64>,
    /// Display URL
    pub url: String,
    pub thumbnail: Option<String>,
    pub locator: Locator,
}

/// Bulk-imported entry still waiting for metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderTrack {
    pub title: String,
    pub artist: String,
    pub duration_secs: Option<u64>,
    /// Phrase handed to the resolver at play time
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TrackSource {
    Resolved(TrackMetadata),
    Placeholder(PlaceholderTrack),
}

/// A queued or playing media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub requester: Requester,
    pub source: TrackSource,
    /// Direct address from the last successful lookup, reused by seek
    #[serde(skip)]
    pub direct: Option<DirectStream>,
}

impl Track {
    pub fn resolved(metadata: TrackMetadata, requester: Requester) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester,
            source: TrackSource::Resolved(metadata),
            direct: None,
        }
    }

    pub fn placeholder(placeholder: PlaceholderTrack, requester: Requester) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester,
            source: TrackSource::Placeholder(placeholder),
            direct: None,
        }
    }

    pub fn title(&self) -> &str {
        match &self.source {
            TrackSource::Resolved(meta) => &meta.title,
            TrackSource::Placeholder(p) => &p.title,
        }
    }

    pub fn artist(&self) -> &str {
        match &self.source {
            TrackSource::Resolved(meta) => &meta.artist,
            TrackSource::Placeholder(p) => &p.artist,
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match &self.source {
            TrackSource::Resolved(meta) => meta.duration_secs,
            TrackSource::Placeholder(p) => p.duration_secs,
        }
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        match &self.source {
            TrackSource::Resolved(meta) => Some(meta),
            TrackSource::Placeholder(_) => None,
        }
    }

    /// Locator, only available once the track is resolved
    pub fn locator(&self) -> Option<&Locator> {
        self.metadata().map(|meta| &meta.locator)
    }

    pub fn search_text(&self) -> Option<&str> {
        match &self.source {
            TrackSource::Resolved(_) => None,
            TrackSource::Placeholder(p) => Some(&p.search_text),
        }
    }

    pub fn needs_metadata(&self) -> bool {
        matches!(self.source, TrackSource::Placeholder(_))
    }

    /// Replace placeholder data with resolved metadata in place
    ///
    /// Keeps the track id and requester. Any cached direct address belonged to the
    /// old source and is dropped.
    pub fn resolve_with(&mut self, metadata: TrackMetadata) {
        self.source = TrackSource::Resolved(metadata);
        self.direct = None;
    }

    /// Search phrase used by autoplay to find something related to this track
    pub fn autoplay_query(&self) -> String {
        let artist = self.artist().trim();
        if artist.is_empty() {
            self.title().trim().to_string()
        } else {
            format!("{} {}", artist, self.title().trim())
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.artist().is_empty() {
            write!(f, "{}", self.title())
        } else {
            write!(f, "{} - {}", self.artist(), self.title())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: title.to_string(),
            artist: "Artist".to_string(),
            duration_secs: Some(200),
            url: format!("https://example.com/{}", title),
            thumbnail: None,
            locator: Locator::new(format!("https://example.com/{}", title)),
        }
    }

    #[test]
    fn test_placeholder_has_no_locator() {
        let track = Track::placeholder(
            PlaceholderTrack {
                title: "Song".to_string(),
                artist: "Band".to_string(),
                duration_secs: None,
                search_text: "Band - Song".to_string(),
            },
            Requester::new("1", "alice"),
        );

        assert!(track.needs_metadata());
        assert!(track.locator().is_none());
        assert_eq!(track.search_text(), Some("Band - Song"));
        assert_eq!(track.to_string(), "Band - Song");
    }

    #[test]
    fn test_resolve_with_keeps_identity() {
        let mut track = Track::placeholder(
            PlaceholderTrack {
                title: "Song".to_string(),
                artist: "Band".to_string(),
                duration_secs: None,
                search_text: "Band - Song".to_string(),
            },
            Requester::new("1", "alice"),
        );
        let id = track.id;
        track.direct = Some(DirectStream::new("https://cdn.example.com/stale"));

        track.resolve_with(metadata("Song"));

        assert_eq!(track.id, id);
        assert!(!track.needs_metadata());
        assert!(track.direct.is_none());
        assert_eq!(track.locator().unwrap().as_str(), "https://example.com/Song");
        assert_eq!(track.requester.name, "alice");
    }

    #[test]
    fn test_header_block() {
        let direct = DirectStream::new("https://cdn.example.com/a")
            .with_header("User-Agent", "cadence")
            .with_header("Referer", "https://example.com");
        assert_eq!(
            direct.header_block(),
            "User-Agent: cadence\r\nReferer: https://example.com\r\n"
        );
    }

    #[test]
    fn test_serialization_skips_direct_address() {
        let mut track = Track::resolved(metadata("Song"), Requester::new("1", "alice"));
        track.direct = Some(DirectStream::new("https://cdn.example.com/secret"));

        let json = serde_json::to_string(&track).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"state\":\"resolved\""));

        let back: Track = serde_json::from_str(&json).unwrap();
        assert!(back.direct.is_none());
        assert_eq!(back.title(), "Song");
    }

    #[test]
    fn test_autoplay_query() {
        let track = Track::resolved(metadata("Song"), Requester::autoplay());
        assert_eq!(track.autoplay_query(), "Artist Song");
        assert!(track.requester.is_autoplay());
    }
}
