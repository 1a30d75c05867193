//! yt-dlp backed resolver and direct-stream lookup
//!
//! Queries run `yt-dlp --dump-json`; free text becomes a `ytsearch<N>:` query.
//! Playlist URLs are listed flat. A flat entry that names its video URL becomes
//! a resolved track for that URL; one without a usable URL becomes a placeholder
//! searched again at play time.

use super::{DirectStreamLookup, TrackResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cadence_common::{
    DirectStream, Locator, PlaceholderTrack, Requester, Track, TrackMetadata,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Search results requested for free-text queries
const SEARCH_RESULTS: usize = 5;

/// Subset of yt-dlp's info JSON
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
    /// "url" for flat playlist entries
    #[serde(rename = "_type", default)]
    kind: Option<String>,
}

impl InfoJson {
    fn artist(&self) -> String {
        self.artist
            .clone()
            .or_else(|| self.uploader.clone())
            .or_else(|| self.channel.clone())
            .unwrap_or_else(|| "Unknown artist".to_string())
    }

    fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Unknown title".to_string())
    }

    fn duration_secs(&self) -> Option<u64> {
        self.duration.filter(|d| *d > 0.0).map(|d| d.round() as u64)
    }

    fn into_track(self, requester: &Requester) -> Option<Track> {
        let flat = self.kind.as_deref() == Some("url");
        let page = if flat {
            // Flat entries may carry a bare id instead of a URL
            self.webpage_url
                .clone()
                .or_else(|| self.url.clone())
                .filter(|u| Locator::new(u.as_str()).is_url())
        } else {
            self.webpage_url.clone().or_else(|| self.url.clone())
        };

        let Some(page) = page else {
            if !flat {
                return None;
            }
            let placeholder = PlaceholderTrack {
                search_text: format!("{} {}", self.artist(), self.title()),
                title: self.title(),
                artist: self.artist(),
                duration_secs: self.duration_secs(),
            };
            return Some(Track::placeholder(placeholder, requester.clone()));
        };

        let metadata = TrackMetadata {
            title: self.title(),
            artist: self.artist(),
            duration_secs: self.duration_secs(),
            url: page.clone(),
            thumbnail: self.thumbnail.clone(),
            locator: Locator::new(page),
        };
        Some(Track::resolved(metadata, requester.clone()))
    }
}

/// Resolver and lookup backed by the yt-dlp executable
pub struct YtDlpResolver {
    program: PathBuf,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn query_target(query: &str) -> String {
        let trimmed = query.trim();
        if Locator::new(trimmed).is_url() {
            trimmed.to_string()
        } else {
            format!("ytsearch{}:{}", SEARCH_RESULTS, trimmed)
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.program.display(), args);
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Resolution(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolution(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// One info JSON object per line; unparseable lines are skipped
fn parse_info_lines(stdout: &str, requester: &Requester) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<InfoJson>(line) {
            Ok(info) => info.into_track(requester),
            Err(e) => {
                debug!("Skipping unparseable resolver line: {}", e);
                None
            }
        })
        .collect()
}

fn parse_direct(stdout: &str) -> Result<Option<DirectStream>> {
    let Some(line) = stdout.lines().find(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };
    let info: InfoJson = serde_json::from_str(line)
        .map_err(|e| Error::Resolution(format!("invalid lookup output: {}", e)))?;

    Ok(info.url.map(|address| {
        let mut headers: Vec<(String, String)> = info.http_headers.into_iter().collect();
        headers.sort();
        DirectStream { address, headers }
    }))
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Vec<Track>> {
        let target = Self::query_target(query);
        let stdout = self
            .run(&["--dump-json", "--flat-playlist", "--no-warnings", &target])
            .await?;
        Ok(parse_info_lines(&stdout, requester))
    }
}

#[async_trait]
impl DirectStreamLookup for YtDlpResolver {
    async fn lookup(&self, locator: &Locator) -> Result<Option<DirectStream>> {
        let stdout = self
            .run(&[
                "-j",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                locator.as_str(),
            ])
            .await?;
        parse_direct(&stdout)
    }
}
