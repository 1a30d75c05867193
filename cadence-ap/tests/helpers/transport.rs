//! Scriptable voice transport

use async_trait::async_trait;
use cadence_ap::audio::AudioSink;
use cadence_ap::transport::{ConnectionState, VoiceTransport};
use cadence_ap::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// How `reconnect` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Connection comes back Ready
    Succeed,
    /// `reconnect` returns an error
    Fail,
    /// Accepted but never becomes Ready
    Stall,
}

pub struct MockTransport {
    state: watch::Sender<ConnectionState>,
    sink: Arc<dyn AudioSink>,
    outcome: Mutex<ReconnectOutcome>,
    reconnects: AtomicUsize,
    destroys: AtomicUsize,
}

impl MockTransport {
    pub fn new(initial: ConnectionState, sink: Arc<dyn AudioSink>) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            sink,
            outcome: Mutex::new(ReconnectOutcome::Succeed),
            reconnects: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        }
    }

    pub fn ready(sink: Arc<dyn AudioSink>) -> Self {
        Self::new(ConnectionState::Ready, sink)
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn on_reconnect(&self, outcome: ReconnectOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            ReconnectOutcome::Succeed => {
                self.state.send_replace(ConnectionState::Ready);
                Ok(())
            }
            ReconnectOutcome::Fail => Err(Error::Transport("gateway refused".to_string())),
            ReconnectOutcome::Stall => {
                self.state.send_replace(ConnectionState::Connecting);
                Ok(())
            }
        }
    }

    async fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Destroyed);
    }

    fn audio_sink(&self) -> Arc<dyn AudioSink> {
        Arc::clone(&self.sink)
    }
}
