//! Voice transport seam
//!
//! A transport is the network link a session plays into. It reports its
//! connectivity through a `watch` channel and supplies the `AudioSink` the
//! session's player writes to. A session lives exactly as long as its transport.

pub mod local;
pub mod supervisor;

pub use local::LocalTransport;
pub use supervisor::supervise_transport;

use crate::audio::AudioSink;
use crate::error::{Error, Result};
use async_trait::async_trait;
use cadence_common::events::ConnectionStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Whether a disconnect is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Network blip, server move; reconnecting may succeed
    Recoverable,
    /// Kicked, channel deleted, credentials revoked
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Disconnected(DisconnectKind),
    Destroyed,
}

impl ConnectionState {
    /// Observer-facing status
    pub fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Connecting => ConnectionStatus::Connecting,
            ConnectionState::Ready => ConnectionStatus::Ready,
            ConnectionState::Disconnected(_) => ConnectionStatus::Disconnected,
            ConnectionState::Destroyed => ConnectionStatus::Destroyed,
        }
    }

    /// States from which the connection will never recover
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Destroyed | ConnectionState::Disconnected(DisconnectKind::Permanent)
        )
    }
}

/// Network connection a session plays into
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn subscribe(&self) -> watch::Receiver<ConnectionState>;

    /// Start a reconnect; completion is reported through `subscribe`
    async fn reconnect(&self) -> Result<()>;

    /// Close the connection for good
    async fn destroy(&self);

    fn audio_sink(&self) -> Arc<dyn AudioSink>;
}

/// Wait until the connection is Ready
///
/// Fails early when the connection reaches a terminal state, and after `timeout`.
pub async fn wait_for_ready(
    rx: &mut watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<()> {
    let reached = tokio::time::timeout(timeout, async {
        rx.wait_for(|s| *s == ConnectionState::Ready || s.is_terminal())
            .await
            .map(|s| *s)
    })
    .await;

    match reached {
        Ok(Ok(ConnectionState::Ready)) => Ok(()),
        Ok(Ok(state)) => Err(Error::Transport(format!("connection ended ({:?})", state))),
        Ok(Err(_)) => Err(Error::Transport("transport dropped".to_string())),
        Err(_) => Err(Error::Transport(format!(
            "not ready within {:?}",
            timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ConnectionState::Ready.status(), ConnectionStatus::Ready);
        assert_eq!(
            ConnectionState::Disconnected(DisconnectKind::Recoverable).status(),
            ConnectionStatus::Disconnected
        );
        assert!(ConnectionState::Destroyed.is_terminal());
        assert!(!ConnectionState::Disconnected(DisconnectKind::Recoverable).is_terminal());
    }

    #[tokio::test]
    async fn test_wait_for_ready() {
        let (tx, mut rx) = watch::channel(ConnectionState::Connecting);
        let waiter = tokio::spawn(async move { wait_for_ready(&mut rx, Duration::from_secs(5)).await });

        tx.send_replace(ConnectionState::Ready);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_ready_fails_on_terminal_state() {
        let (tx, mut rx) = watch::channel(ConnectionState::Connecting);
        tx.send_replace(ConnectionState::Disconnected(DisconnectKind::Permanent));
        let err = wait_for_ready(&mut rx, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ready_times_out() {
        let (_tx, mut rx) = watch::channel(ConnectionState::Connecting);
        let err = wait_for_ready(&mut rx, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }
}
