//! # Playback Session
//!
//! The session owns everything tied to the current request: the
//! [`PlaybackState`], the [`AudioAsset`] and the progress reconciler. It is a
//! plain synchronous state machine; the driver feeds it fetch outcomes and
//! engine events and publishes whatever changed.
//!
//! ```text
//! idle --valid key--> loading --success--> ready --play--> playing <--> paused
//!                        |                                    |
//!                        +--failure--> error      ended <-----+
//! any --key change--> loading (after releasing the asset)
//! ```

use bridge_traits::{EngineEvent, ResourceId};
use tracing::debug;

use crate::progress::ProgressReconciler;
use crate::resource::{AudioAsset, PlayableHandle};
use crate::state::{PlaybackSnapshot, PlaybackState, PlaybackStatus, RequestKey};

/// Status transition caused by an engine event, if any.
pub fn next_status(current: PlaybackStatus, event: &EngineEvent) -> Option<PlaybackStatus> {
    use PlaybackStatus::*;

    match (current, event) {
        (Ready | Paused | Ended, EngineEvent::Play) => Some(Playing),
        (Playing, EngineEvent::Pause) => Some(Paused),
        (Ready | Playing | Paused, EngineEvent::Ended) => Some(Ended),
        (status, EngineEvent::Error { .. }) if status.has_asset() => Some(Error),
        _ => None,
    }
}

/// What applying an engine event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEffect {
    /// Nothing observable changed.
    Unchanged,
    /// State changed.
    Updated,
    /// The engine reported an error. Nothing was changed yet: the caller
    /// unbinds the engine and then calls [`PlaybackSession::fail`].
    Failed,
}

/// The request the session is currently serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRequest {
    pub generation: u64,
    pub key: RequestKey,
}

#[derive(Debug)]
pub struct PlaybackSession {
    state: PlaybackState,
    request: Option<ActiveRequest>,
    asset: Option<AudioAsset>,
    progress: ProgressReconciler,
}

impl PlaybackSession {
    pub fn new(volume: f32) -> Self {
        let state = PlaybackState {
            volume: volume.clamp(0.0, 1.0),
            muted: volume <= 0.0,
            ..PlaybackState::default()
        };
        Self {
            state,
            request: None,
            asset: None,
            progress: ProgressReconciler::new(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    pub fn request(&self) -> Option<&ActiveRequest> {
        self.request.as_ref()
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request.as_ref().map(|r| r.generation)
    }

    pub fn asset(&self) -> Option<&AudioAsset> {
        self.asset.as_ref()
    }

    /// The live playable reference, if one is bound.
    pub fn reference(&self) -> Option<&PlayableHandle> {
        self.asset.as_ref().and_then(AudioAsset::reference)
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.asset.as_ref().and_then(AudioAsset::resource_id)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot::from_state(&self.state, self.request_id(), self.asset.is_some())
    }

    /// Drop the current asset (releasing its reference) and go idle.
    pub fn clear(&mut self) {
        self.drop_asset();
        self.request = None;
        self.state.reset_media(PlaybackStatus::Idle);
    }

    /// Enter `loading` for a new request. The previous asset is released
    /// first.
    pub fn begin_loading(&mut self, generation: u64, key: RequestKey) {
        self.drop_asset();
        self.request = Some(ActiveRequest { generation, key });
        self.state.reset_media(PlaybackStatus::Loading);
    }

    /// Install the asset produced by the current request and enter `ready`.
    pub fn install_asset(&mut self, asset: AudioAsset) {
        self.drop_asset();
        debug!(
            request_id = ?self.request_id(),
            resource = ?asset.resource_id(),
            size = asset.size(),
            media_type = asset.media_type(),
            "Audio asset installed"
        );
        self.asset = Some(asset);
        self.transition(PlaybackStatus::Ready);
    }

    /// Enter `error` with a presentable message. A live reference is
    /// released; the payload stays available for download.
    pub fn fail(&mut self, message: impl Into<String>) {
        if let Some(asset) = self.asset.as_mut() {
            asset.release_reference();
        }
        self.state.error_message = Some(message.into());
        self.transition(PlaybackStatus::Error);
    }

    /// Apply one engine event from the bound resource.
    pub fn apply_engine_event(&mut self, event: &EngineEvent) -> EngineEffect {
        if !self.state.status.has_asset() {
            debug!(event = event.name(), status = %self.state.status, "Engine event ignored");
            return EngineEffect::Unchanged;
        }

        let mut changed = false;

        match event {
            EngineEvent::TimeUpdate { current_time } => {
                changed |= self.set_current_time(*current_time);
            }
            EngineEvent::LoadedMetadata { duration } => {
                let duration = Some(*duration).filter(|d| d.is_finite() && *d > 0.0);
                if duration != self.state.duration {
                    self.state.duration = duration;
                    self.state.buffered_fraction = self.progress.on_duration(duration);
                    changed = true;
                }
            }
            EngineEvent::Progress { buffered } => {
                let fraction = self.progress.on_buffered(buffered, self.state.duration);
                if fraction != self.state.buffered_fraction {
                    self.state.buffered_fraction = fraction;
                    changed = true;
                }
            }
            EngineEvent::Ended => {
                if let Some(duration) = self.state.duration {
                    changed |= self.set_current_time(duration);
                }
            }
            EngineEvent::Error { message } => {
                debug!(error = %message, status = %self.state.status, "Engine reported an error");
                return EngineEffect::Failed;
            }
            EngineEvent::Play | EngineEvent::Pause => {}
        }

        if let Some(next) = next_status(self.state.status, event) {
            changed |= self.transition(next);
        }

        if changed {
            EngineEffect::Updated
        } else {
            EngineEffect::Unchanged
        }
    }

    /// Returns `true` if the position changed.
    pub fn set_current_time(&mut self, seconds: f64) -> bool {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if seconds == self.state.current_time {
            return false;
        }
        self.state.current_time = seconds;
        true
    }

    /// Store a new volume. Zero also mutes; a positive volume never unmutes.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.state.volume = volume;
        if volume == 0.0 {
            self.state.muted = true;
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
    }

    /// Release everything. The session is idle afterwards.
    pub fn teardown(&mut self) {
        self.clear();
    }

    fn transition(&mut self, next: PlaybackStatus) -> bool {
        let current = self.state.status;
        if current == next {
            return false;
        }
        debug!(
            request_id = ?self.request_id(),
            from = %current,
            to = %next,
            "Playback status transition"
        );
        if next != PlaybackStatus::Error {
            self.state.error_message = None;
        }
        self.state.status = next;
        true
    }

    fn drop_asset(&mut self) {
        if let Some(mut asset) = self.asset.take() {
            asset.release_reference();
        }
        self.progress.reset();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.drop_asset();
    }
}
