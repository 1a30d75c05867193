//! Stream pipeline
//!
//! Turns a track locator into a stream of decoded PCM frames. The engine only
//! sees the `StreamPipeline` trait and the `PcmStream` it returns; the production
//! implementation (`ProcessPipeline`) drives external fetch/decode processes.
//!
//! # Strategies
//!
//! - **Direct**: a pre-resolved `DirectStream` is handed straight to the decoder,
//!   which connects to the origin itself (fast start, supports input seeking).
//! - **FetchDecode**: the fetcher tool downloads from the locator and pipes bytes
//!   into the decoder (slow but works for any locator the fetcher understands).
//!
//! Direct is validated by waiting for first audio; a silent or failing direct
//! stream falls back to FetchDecode rather than playing nothing.

pub mod filters;
pub mod gain;
pub mod process;
pub mod process_chain;

pub use filters::{AudioFilter, FilterChain};
pub use gain::{apply_gain, clamp_volume, VolumeHandle, MAX_VOLUME};
pub use process::ProcessPipeline;
pub use process_chain::{ProcessChain, StageSpec};

use crate::audio::PcmFormat;
use crate::error::Result;
use async_trait::async_trait;
use cadence_common::{DirectStream, Locator};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Everything needed to open one stream
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub locator: Locator,
    /// Pre-resolved address (from prefetch or an earlier lookup)
    pub direct: Option<DirectStream>,
    /// Start offset; zero for a fresh start
    pub start: Duration,
    pub filters: FilterChain,
    pub volume: VolumeHandle,
}

impl StreamRequest {
    pub fn new(locator: Locator, volume: VolumeHandle) -> Self {
        Self {
            locator,
            direct: None,
            start: Duration::ZERO,
            filters: FilterChain::default(),
            volume,
        }
    }

    pub fn with_direct(mut self, direct: Option<DirectStream>) -> Self {
        self.direct = direct;
        self
    }

    pub fn starting_at(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }
}

/// How a stream was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStrategy {
    Direct,
    FetchDecode,
    /// In-process reader, no external processes
    Memory,
}

impl fmt::Display for StreamStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStrategy::Direct => write!(f, "direct"),
            StreamStrategy::FetchDecode => write!(f, "fetch-decode"),
            StreamStrategy::Memory => write!(f, "memory"),
        }
    }
}

/// Decoded PCM source consumed by the player
///
/// Owns the process chain producing it; `close` (or drop) tears the chain down.
pub struct PcmStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    chain: Option<ProcessChain>,
    strategy: StreamStrategy,
    volume: VolumeHandle,
    format: PcmFormat,
    bytes_read: u64,
}

impl PcmStream {
    pub fn new(
        reader: Pin<Box<dyn AsyncRead + Send>>,
        chain: Option<ProcessChain>,
        strategy: StreamStrategy,
        volume: VolumeHandle,
        format: PcmFormat,
    ) -> Self {
        Self {
            reader,
            chain,
            strategy,
            volume,
            format,
            bytes_read: 0,
        }
    }

    /// Stream over an in-process reader of raw s16le PCM
    pub fn from_reader<R>(reader: R, volume: VolumeHandle, format: PcmFormat) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(Box::pin(reader), None, StreamStrategy::Memory, volume, format)
    }

    pub fn strategy(&self) -> StreamStrategy {
        self.strategy
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Audio produced so far
    pub fn position(&self) -> Duration {
        self.format.duration_of(self.bytes_read)
    }

    /// Read the next frame with the current volume applied
    ///
    /// Returns `None` at end of stream. A trailing partial frame is zero-padded.
    pub async fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let frame_bytes = self.format.frame_bytes();
        let mut frame = vec![0u8; frame_bytes];
        let mut filled = 0;

        while filled < frame_bytes {
            let n = self.reader.read(&mut frame[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        self.bytes_read += filled as u64;
        apply_gain(&mut frame[..filled], self.volume.get());
        Ok(Some(frame))
    }

    /// Tear down the producing processes
    pub async fn close(mut self) {
        if let Some(chain) = self.chain.take() {
            chain.terminate().await;
        }
    }
}

impl fmt::Debug for PcmStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmStream")
            .field("strategy", &self.strategy)
            .field("format", &self.format)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

/// Opens decoded audio streams for tracks
#[async_trait]
pub trait StreamPipeline: Send + Sync {
    /// Open a stream; fails with `Error::Resolution` when no strategy produced audio
    async fn open(&self, request: StreamRequest) -> Result<PcmStream>;
}
