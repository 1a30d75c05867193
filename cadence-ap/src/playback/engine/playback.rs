//! Playback control - pause, resume, seek, volume, filters, repeat, autoplay

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::pipeline::{FilterChain, StreamRequest};
use crate::playback::queue_manager::AdvanceKind;
use cadence_common::events::{PlaybackState, QueueChangeTrigger, RepeatMode};
use std::time::Duration;
use tracing::{debug, info, warn};

impl PlaybackEngine {
    pub async fn pause(&self) -> Result<()> {
        self.ensure_running()?;
        if !self.player.pause() {
            return Err(Error::invalid("Nothing is playing"));
        }
        self.state.clock.write().await.pause();
        info!("Playback paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.ensure_running()?;
        if !self.player.resume() {
            return Err(Error::invalid("Playback is not paused"));
        }
        self.state.clock.write().await.resume();
        info!("Playback resumed");
        Ok(())
    }

    /// Restart the current track at `position`
    ///
    /// Rejected without a current track or past a known duration. If the
    /// rebuilt stream fails to open, the track is dropped and the queue advances.
    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.ensure_running()?;
        let guard = self.transition.lock().await;
        let result = self.seek_locked(position).await;
        self.finish_transition(guard).await;
        result
    }

    async fn seek_locked(&self, position: Duration) -> Result<()> {
        let current = self.queue.read().await.current().cloned();
        let Some(track) = current else {
            return Err(Error::invalid("Nothing is playing"));
        };
        if let Some(duration) = track.duration_secs() {
            if position > Duration::from_secs(duration) {
                return Err(Error::invalid(format!(
                    "Cannot seek to {}s, track is {}s long",
                    position.as_secs(),
                    duration
                )));
            }
        }

        info!("Seeking {} to {:?}", track, position);
        self.restart_current(position).await
    }

    /// Set volume (clamped to 0..=200); returns the applied value
    ///
    /// Takes effect on the next frame of the playing stream.
    pub async fn set_volume(&self, requested: i64) -> Result<u16> {
        self.ensure_running()?;
        let applied = self.state.volume.set(requested);
        if applied as i64 != requested {
            debug!("Volume {} clamped to {}", requested, applied);
        }
        info!("Volume set to {}%", applied);
        self.state.broadcast_settings().await;
        Ok(applied)
    }

    /// Replace the active filter set; an empty list clears it
    ///
    /// Rebuilds the playing stream at the current position so the new graph
    /// is heard immediately. If that rebuild fails the track is dropped and the
    /// queue advances, but the new filters are still the active set.
    pub async fn set_filters<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        self.ensure_running()?;
        let filters = FilterChain::parse(names)?;

        let guard = self.transition.lock().await;
        let result = self.set_filters_locked(filters).await;
        self.finish_transition(guard).await;
        result
    }

    async fn set_filters_locked(&self, filters: FilterChain) -> Result<Vec<String>> {
        let names = filters.names();
        {
            let mut settings = self.state.settings.write().await;
            if settings.filters == filters {
                return Ok(names);
            }
            settings.filters = filters;
        }
        info!("Filters set to [{}]", names.join(", "));
        self.state.broadcast_settings().await;

        let has_current = self.queue.read().await.current().is_some();
        if has_current && !self.player.is_idle() {
            let position = self.state.clock.read().await.elapsed();
            // The filters stay applied; a failed rebuild only moves playback on
            if let Err(e) = self.restart_current(position).await {
                warn!("Filters applied but the current track could not be rebuilt: {}", e);
            }
        }
        Ok(names)
    }

    /// Rebuild the current track's stream at `position`; caller holds the transition lock
    ///
    /// Keeps the paused state across the rebuild.
    async fn restart_current(&self, position: Duration) -> Result<()> {
        let Some(mut track) = self.queue.read().await.current().cloned() else {
            return Err(Error::invalid("Nothing is playing"));
        };
        let Some(locator) = track.locator().cloned() else {
            return Err(Error::invalid("Current track is not resolved yet"));
        };
        let was_paused = self.player.state() == PlaybackState::Paused;

        if track.direct.is_none() {
            match self.services.lookup.lookup(&locator).await {
                Ok(direct) => track.direct = direct,
                Err(e) => debug!("Direct lookup for {} failed: {}", locator, e),
            }
        }

        self.player.stop().await;

        let filters = self.state.settings.read().await.filters.clone();
        let request = StreamRequest::new(locator, self.state.volume.clone())
            .with_direct(track.direct.clone())
            .starting_at(position)
            .with_filters(filters);

        match self.services.pipeline.open(request).await {
            Ok(stream) => {
                self.player.play(stream).await;
                {
                    let mut clock = self.state.clock.write().await;
                    clock.start(position);
                    if was_paused {
                        self.player.pause();
                        clock.pause();
                    }
                }
                let mut queue = self.queue.write().await;
                if let Some(current) = queue.current_mut() {
                    if current.id == track.id {
                        current.direct = track.direct;
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!("Could not restart {}: {}", track, e);
                self.queue.write().await.discard_current();
                if let Err(advance_err) = self
                    .advance_locked(AdvanceKind::Natural, QueueChangeTrigger::ResolutionFailure)
                    .await
                {
                    warn!("Advance after failed restart failed: {}", advance_err);
                }
                Err(e)
            }
        }
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.ensure_running()?;
        self.state.settings.write().await.repeat_mode = mode;
        info!("Repeat mode set to {:?}", mode);
        self.state.broadcast_settings().await;
        Ok(())
    }

    pub async fn set_autoplay(&self, enabled: bool) -> Result<()> {
        self.ensure_running()?;
        self.state.settings.write().await.autoplay = enabled;
        info!("Autoplay {}", if enabled { "enabled" } else { "disabled" });
        self.state.broadcast_settings().await;
        Ok(())
    }

    /// Flip autoplay; returns the new setting
    pub async fn toggle_autoplay(&self) -> Result<bool> {
        self.ensure_running()?;
        let enabled = {
            let mut settings = self.state.settings.write().await;
            settings.autoplay = !settings.autoplay;
            settings.autoplay
        };
        info!("Autoplay {}", if enabled { "enabled" } else { "disabled" });
        self.state.broadcast_settings().await;
        Ok(enabled)
    }
}
