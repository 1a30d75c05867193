//! Audio output seam
//!
//! The low-level playback primitive the player drives. A voice transport supplies
//! one (it encodes and paces frames onto the network); the local binary writes raw
//! PCM to a byte stream and lets the downstream consumer apply backpressure.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Destination for decoded PCM frames
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver one frame; may block until the sink can accept more audio
    async fn write_frame(&self, frame: &[u8]) -> io::Result<()>;

    /// Flush buffered audio (called when a playback ends)
    async fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing frames to any async byte writer
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<tokio::io::Stdout> {
    /// Raw PCM on stdout, for piping into a player
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> AudioSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        self.writer.lock().await.write_all(frame).await
    }

    async fn flush(&self) -> io::Result<()> {
        self.writer.lock().await.flush().await
    }
}
