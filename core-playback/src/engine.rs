//! # Playback Engine Adapter
//!
//! Binds a [`PlayableHandle`] to the platform [`MediaEngine`] and tags every
//! native event with the bound resource, so that callbacks from a previous
//! asset can be recognised and dropped.

use bridge_traits::{
    EngineEventSender, MediaEngine, PlayOrigin, ResourceId, TaggedEngineEvent, TimeRanges,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{PlaybackError, Result};
use crate::resource::PlayableHandle;

pub struct EngineAdapter {
    engine: Arc<dyn MediaEngine>,
    events: EngineEventSender,
    bound: Option<ResourceId>,
}

impl EngineAdapter {
    /// `events` is the sending half of the channel the driver listens on.
    pub fn new(engine: Arc<dyn MediaEngine>, events: EngineEventSender) -> Self {
        Self {
            engine,
            events,
            bound: None,
        }
    }

    /// Load the handle's reference into the engine.
    pub async fn bind(&mut self, handle: &PlayableHandle, volume: f32, muted: bool) -> Result<()> {
        if self.bound.is_some() {
            self.unbind().await;
        }

        let id = handle.id();
        self.engine
            .load(handle.locator(), self.events.for_resource(id))
            .await
            .map_err(PlaybackError::from_engine)?;
        self.bound = Some(id);

        // The engine may have been reset by load; push our preferences.
        self.engine
            .set_volume(volume)
            .await
            .map_err(PlaybackError::from_engine)?;
        self.engine
            .set_muted(muted)
            .await
            .map_err(PlaybackError::from_engine)?;

        debug!(resource = %id, "Bound resource to engine");
        Ok(())
    }

    /// Detach whatever is loaded. Failures are logged; the binding is
    /// forgotten either way.
    pub async fn unbind(&mut self) {
        if let Some(id) = self.bound.take() {
            if let Err(e) = self.engine.unload().await {
                warn!(resource = %id, error = %e, "Engine unload failed");
            }
            trace!(resource = %id, "Unbound resource from engine");
        }
    }

    pub fn bound(&self) -> Option<ResourceId> {
        self.bound
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Whether `event` originates from the currently bound resource.
    pub fn is_current(&self, event: &TaggedEngineEvent) -> bool {
        self.bound == Some(event.resource)
    }

    pub async fn play(&self, origin: PlayOrigin) -> Result<()> {
        self.require_bound("play")?;
        self.engine
            .play(origin)
            .await
            .map_err(PlaybackError::from_engine)
    }

    pub async fn pause(&self) -> Result<()> {
        self.require_bound("pause")?;
        self.engine.pause().await.map_err(PlaybackError::from_engine)
    }

    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.require_bound("seek")?;
        self.engine
            .set_current_time(seconds.max(0.0))
            .await
            .map_err(PlaybackError::from_engine)
    }

    /// Volume and mute apply to the engine only while something is bound;
    /// otherwise they take effect at the next [`bind`](Self::bind).
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.engine
            .set_volume(volume.clamp(0.0, 1.0))
            .await
            .map_err(PlaybackError::from_engine)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.engine
            .set_muted(muted)
            .await
            .map_err(PlaybackError::from_engine)
    }

    pub async fn current_time(&self) -> Result<f64> {
        self.require_bound("current_time")?;
        self.engine
            .current_time()
            .await
            .map_err(PlaybackError::from_engine)
    }

    pub async fn duration(&self) -> Result<Option<f64>> {
        self.require_bound("duration")?;
        self.engine.duration().await.map_err(PlaybackError::from_engine)
    }

    pub async fn buffered(&self) -> Result<TimeRanges> {
        self.require_bound("buffered")?;
        self.engine.buffered().await.map_err(PlaybackError::from_engine)
    }

    fn require_bound(&self, op: &str) -> Result<()> {
        if self.is_bound() {
            Ok(())
        } else {
            Err(PlaybackError::InvalidOperation(format!(
                "{} with no resource bound",
                op
            )))
        }
    }
}
