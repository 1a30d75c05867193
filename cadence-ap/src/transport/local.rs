//! Local transport
//!
//! Plays into a local byte stream (stdout by default). Always connected; it only
//! leaves Ready when destroyed.

use super::{ConnectionState, VoiceTransport};
use crate::audio::{AudioSink, WriterSink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub struct LocalTransport {
    state: watch::Sender<ConnectionState>,
    sink: Arc<dyn AudioSink>,
}

impl LocalTransport {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Ready);
        Self { state, sink }
    }

    /// Raw s16le PCM on stdout
    pub fn stdout() -> Self {
        Self::new(Arc::new(WriterSink::stdout()))
    }
}

#[async_trait]
impl VoiceTransport for LocalTransport {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        if *self.state.borrow() == ConnectionState::Destroyed {
            return Err(Error::Transport("transport destroyed".to_string()));
        }
        self.state.send_replace(ConnectionState::Ready);
        Ok(())
    }

    async fn destroy(&self) {
        debug!("Local transport destroyed");
        self.state.send_replace(ConnectionState::Destroyed);
    }

    fn audio_sink(&self) -> Arc<dyn AudioSink> {
        Arc::clone(&self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_transport_lifecycle() {
        let transport = LocalTransport::new(Arc::new(WriterSink::new(tokio::io::sink())));
        let rx = transport.subscribe();
        assert_eq!(transport.state(), ConnectionState::Ready);

        transport.destroy().await;
        assert_eq!(*rx.borrow(), ConnectionState::Destroyed);
        assert!(transport.reconnect().await.is_err());
    }
}
