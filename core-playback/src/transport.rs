//! # Transport Controller
//!
//! User-facing controls over the bound asset: play/pause, seek, restart,
//! volume, mute and download. Every control is guarded by the session
//! status; a guard violation is returned as
//! [`PlaybackError::InvalidOperation`] and the caller ignores it.
//!
//! Play and pause only ask the engine. The status follows from the engine's
//! own `play`/`pause` events.

use bridge_traits::PlayOrigin;
use std::path::PathBuf;
use tracing::debug;

use crate::download::DownloadExporter;
use crate::engine::EngineAdapter;
use crate::error::{PlaybackError, Result};
use crate::resource::PlayableHandle;
use crate::session::PlaybackSession;
use crate::state::PlaybackStatus;

pub struct TransportController {
    adapter: EngineAdapter,
    exporter: DownloadExporter,
}

impl TransportController {
    pub fn new(adapter: EngineAdapter, exporter: DownloadExporter) -> Self {
        Self { adapter, exporter }
    }

    pub fn adapter(&self) -> &EngineAdapter {
        &self.adapter
    }

    /// Bind a freshly installed reference, applying the session's volume
    /// and mute state.
    pub async fn bind(&mut self, handle: &PlayableHandle, session: &PlaybackSession) -> Result<()> {
        let state = session.state();
        self.adapter.bind(handle, state.volume, state.muted).await
    }

    pub async fn unbind(&mut self) {
        self.adapter.unbind().await;
    }

    /// Play when stopped, pause when playing. From `ended` playback starts
    /// over from the beginning.
    pub async fn toggle_play(&self, session: &mut PlaybackSession) -> Result<()> {
        self.require_controls(session, "toggle_play")?;

        match session.status() {
            PlaybackStatus::Playing => self.adapter.pause().await,
            PlaybackStatus::Ended => self.start_over(session).await,
            _ => self.adapter.play(PlayOrigin::UserGesture).await,
        }
    }

    /// Seek to `fraction` of the duration. Returns the new position.
    pub async fn seek_to_fraction(
        &self,
        session: &mut PlaybackSession,
        fraction: f64,
    ) -> Result<f64> {
        self.require_controls(session, "seek")?;

        if !fraction.is_finite() {
            return Err(PlaybackError::InvalidOperation(format!(
                "seek to non-finite fraction {}",
                fraction
            )));
        }

        let duration = session
            .state()
            .duration
            .filter(|d| *d > 0.0)
            .ok_or_else(|| PlaybackError::InvalidOperation("seek with unknown duration".into()))?;

        let target = fraction.clamp(0.0, 1.0) * duration;
        self.adapter.seek(target).await?;
        session.set_current_time(target);

        debug!(fraction, target, duration, "Seeked");
        Ok(target)
    }

    /// Jump to the start and play.
    pub async fn restart(&self, session: &mut PlaybackSession) -> Result<()> {
        self.require_controls(session, "restart")?;
        self.start_over(session).await
    }

    /// Accepted with or without an asset; an unbound volume is applied at
    /// the next bind.
    pub async fn set_volume(&self, session: &mut PlaybackSession, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(PlaybackError::InvalidOperation(format!(
                "non-finite volume {}",
                volume
            )));
        }

        session.set_volume(volume);
        let state = session.state();
        self.adapter.set_volume(state.volume).await?;
        self.adapter.set_muted(state.muted).await
    }

    pub async fn toggle_mute(&self, session: &mut PlaybackSession) -> Result<()> {
        let muted = !session.state().muted;
        session.set_muted(muted);
        self.adapter.set_muted(muted).await
    }

    /// Export the current payload.
    pub async fn download(&self, session: &PlaybackSession) -> Result<PathBuf> {
        let (asset, request) = match (session.asset(), session.request()) {
            (Some(asset), Some(request)) => (asset, request),
            _ => {
                return Err(PlaybackError::InvalidOperation(
                    "download with no payload".to_string(),
                ))
            }
        };

        self.exporter.export(asset, &request.key.language).await
    }

    async fn start_over(&self, session: &mut PlaybackSession) -> Result<()> {
        self.adapter.seek(0.0).await?;
        session.set_current_time(0.0);
        self.adapter.play(PlayOrigin::UserGesture).await
    }

    fn require_controls(&self, session: &PlaybackSession, op: &str) -> Result<()> {
        if session.status().has_asset() && self.adapter.is_bound() {
            Ok(())
        } else {
            Err(PlaybackError::InvalidOperation(format!(
                "{} while {}",
                op,
                session.status()
            )))
        }
    }
}
