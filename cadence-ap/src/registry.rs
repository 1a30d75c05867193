//! Session registry
//!
//! One engine per guild, owned 1:1 by its transport connection. A session is
//! registered once its transport is Ready and removed when the supervisor tears
//! it down.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::playback::{EngineServices, PlaybackEngine};
use crate::transport::{supervise_transport, wait_for_ready, VoiceTransport};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Guild (server) identifier sessions are keyed by
pub type GuildId = u64;

struct Session {
    engine: Arc<PlaybackEngine>,
    transport: Arc<dyn VoiceTransport>,
}

/// Guilds with a `connect` in progress
type PendingGuilds = Arc<Mutex<HashSet<GuildId>>>;

/// Claim on a guild while its transport is being waited on; released on drop
struct Reservation {
    pending: PendingGuilds,
    guild_id: GuildId,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.guild_id);
        }
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<GuildId, Session>>>,
    pending: PendingGuilds,
    config: EngineConfig,
    services: EngineServices,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig, services: EngineServices) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashSet::new())),
            config,
            services,
        }
    }

    /// Create the session for `guild_id` once `transport` is Ready
    ///
    /// Rejects a guild that already has a live session or a connect in progress.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
    ) -> Result<Arc<PlaybackEngine>> {
        let reservation = self.reserve(guild_id).await?;

        let mut rx = transport.subscribe();
        if let Err(e) = wait_for_ready(&mut rx, self.config.transport.ready_timeout()).await {
            warn!("Guild {}: transport never became ready: {}", guild_id, e);
            transport.destroy().await;
            return Err(e);
        }

        let engine = Arc::new(PlaybackEngine::new(
            self.config.clone(),
            transport.audio_sink(),
            self.services.clone(),
        ));
        engine.start().await?;

        self.sessions.write().await.insert(
            guild_id,
            Session {
                engine: Arc::clone(&engine),
                transport: Arc::clone(&transport),
            },
        );
        drop(reservation);

        let sessions = Arc::clone(&self.sessions);
        let supervised = Arc::clone(&engine);
        let transport_config = self.config.transport.clone();
        tokio::spawn(async move {
            supervise_transport(transport, Arc::clone(&supervised), transport_config).await;

            // Only remove our own session; the guild may have reconnected since
            let mut sessions = sessions.write().await;
            if sessions
                .get(&guild_id)
                .is_some_and(|s| Arc::ptr_eq(&s.engine, &supervised))
            {
                sessions.remove(&guild_id);
                info!("Guild {}: session removed", guild_id);
            }
        });

        info!("Guild {}: session {} connected", guild_id, engine.session_id());
        Ok(engine)
    }

    /// Claim `guild_id` for one connect; the check and the claim share the map's write lock
    async fn reserve(&self, guild_id: GuildId) -> Result<Reservation> {
        let sessions = self.sessions.write().await;
        if sessions.get(&guild_id).is_some_and(|s| s.engine.is_running()) {
            return Err(Error::invalid(format!(
                "Guild {} already has a session",
                guild_id
            )));
        }

        let mut pending = self
            .pending
            .lock()
            .map_err(|_| Error::Internal("pending guild set poisoned".to_string()))?;
        if !pending.insert(guild_id) {
            return Err(Error::invalid(format!(
                "Guild {} is already connecting",
                guild_id
            )));
        }
        drop(pending);
        drop(sessions);

        Ok(Reservation {
            pending: Arc::clone(&self.pending),
            guild_id,
        })
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackEngine>> {
        self.sessions
            .read()
            .await
            .get(&guild_id)
            .map(|s| Arc::clone(&s.engine))
    }

    /// Tear down the guild's session and close its transport
    pub async fn destroy(&self, guild_id: GuildId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&guild_id)
            .ok_or_else(|| Error::invalid(format!("Guild {} has no session", guild_id)))?;

        session.engine.shutdown().await;
        session.transport.destroy().await;
        info!("Guild {}: session destroyed", guild_id);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
