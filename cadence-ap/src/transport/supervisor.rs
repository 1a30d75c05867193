//! Transport supervision
//!
//! Watches a session's transport for its whole life:
//! - Recoverable disconnect: reconnect with exponential backoff
//!   (`base * 2^attempt`), waiting up to `ready_timeout` for Ready each time.
//! - Permanent disconnect or exhausted attempts: shut the session down and
//!   destroy the transport.
//! - Destroyed: shut the session down.

use super::{wait_for_ready, ConnectionState, DisconnectKind, VoiceTransport};
use crate::playback::PlaybackEngine;
use cadence_common::config::TransportConfig;
use cadence_common::events::{ConnectionStatus, SessionEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Supervise `transport` until the session ends
pub async fn supervise_transport(
    transport: Arc<dyn VoiceTransport>,
    engine: Arc<PlaybackEngine>,
    config: TransportConfig,
) {
    let mut rx = transport.subscribe();
    info!("Supervising transport for session {}", engine.session_id());

    loop {
        let state = *rx.borrow_and_update();
        emit_status(&engine, state.status(), 0);

        match state {
            ConnectionState::Connecting | ConnectionState::Ready => {}
            ConnectionState::Disconnected(DisconnectKind::Recoverable) => {
                if !reconnect_with_backoff(transport.as_ref(), &engine, &mut rx, &config).await {
                    teardown(transport.as_ref(), &engine).await;
                    return;
                }
                continue;
            }
            ConnectionState::Disconnected(DisconnectKind::Permanent) => {
                warn!("Transport disconnected permanently");
                teardown(transport.as_ref(), &engine).await;
                return;
            }
            ConnectionState::Destroyed => {
                info!("Transport destroyed");
                engine.shutdown().await;
                return;
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Transport state channel closed");
                    engine.shutdown().await;
                    return;
                }
            }
            _ = engine.closed() => {
                debug!("Session ended, supervisor exiting");
                return;
            }
        }
    }
}

/// Returns true once the transport is Ready again
///
/// The caller's loop reports the recovered state.
async fn reconnect_with_backoff(
    transport: &dyn VoiceTransport,
    engine: &PlaybackEngine,
    rx: &mut watch::Receiver<ConnectionState>,
    config: &TransportConfig,
) -> bool {
    for attempt in 0..config.max_reconnect_attempts {
        let delay = config.backoff_delay(attempt);
        emit_status(engine, ConnectionStatus::Reconnecting, attempt + 1);
        info!(
            "Reconnect attempt {}/{} in {:?}",
            attempt + 1,
            config.max_reconnect_attempts,
            delay
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = engine.closed() => return false,
        }

        match transport.state() {
            ConnectionState::Ready => {
                info!("Transport recovered on its own");
                return true;
            }
            state if state.is_terminal() => {
                warn!("Transport became {:?} while reconnecting", state);
                return false;
            }
            _ => {}
        }

        if let Err(e) = transport.reconnect().await {
            warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
            continue;
        }

        match wait_for_ready(rx, config.ready_timeout()).await {
            Ok(()) => {
                info!("Transport reconnected after {} attempt(s)", attempt + 1);
                return true;
            }
            Err(e) => {
                warn!("Reconnect attempt {} did not become ready: {}", attempt + 1, e);
                if transport.state().is_terminal() {
                    return false;
                }
            }
        }
    }

    error!(
        "Transport not recovered after {} attempts",
        config.max_reconnect_attempts
    );
    false
}

async fn teardown(transport: &dyn VoiceTransport, engine: &PlaybackEngine) {
    engine.shutdown().await;
    transport.destroy().await;
    emit_status(engine, ConnectionStatus::Destroyed, 0);
}

fn emit_status(engine: &PlaybackEngine, status: ConnectionStatus, attempt: u32) {
    engine.broadcast(SessionEvent::ConnectionStateChanged {
        session_id: engine.session_id(),
        status,
        attempt,
        timestamp: chrono::Utc::now(),
    });
}
