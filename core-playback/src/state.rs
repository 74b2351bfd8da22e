//! Request identity and observable playback state.

use core_runtime::config::SynthesisEngine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::progress;

/// Identifies one playback request.
///
/// Equality is by value: any field change invalidates the current asset.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub text: String,
    pub language: String,
    pub credential: String,
    pub engine: Option<SynthesisEngine>,
}

impl RequestKey {
    pub fn new(
        text: impl Into<String>,
        language: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            credential: credential.into(),
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: SynthesisEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// A key can be fetched only with non-blank text and credential.
    pub fn is_fetchable(&self) -> bool {
        !self.text.trim().is_empty() && !self.credential.trim().is_empty()
    }
}

// Credential must never end up in logs.
impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestKey")
            .field("text_chars", &self.text.chars().count())
            .field("language", &self.language)
            .field("credential", &"[REDACTED]")
            .field("engine", &self.engine)
            .finish()
    }
}

/// Player lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Ready => "ready",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Ended => "ended",
            PlaybackStatus::Error => "error",
        }
    }

    /// Statuses in which an asset is bound to the engine.
    pub fn has_asset(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Ready
                | PlaybackStatus::Playing
                | PlaybackStatus::Paused
                | PlaybackStatus::Ended
        )
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable playback state owned by the session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    /// Seconds, never negative.
    pub current_time: f64,
    /// Seconds; `None` until the engine reports it.
    pub duration: Option<f64>,
    /// 0.0 - 1.0, non-decreasing for one asset.
    pub buffered_fraction: f64,
    /// 0.0 - 1.0, independent of `muted`.
    pub volume: f32,
    pub muted: bool,
    pub error_message: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_time: 0.0,
            duration: None,
            buffered_fraction: 0.0,
            volume: 1.0,
            muted: false,
            error_message: None,
        }
    }
}

impl PlaybackState {
    /// Clear everything tied to the previous asset. Volume and mute survive.
    pub fn reset_media(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.current_time = 0.0;
        self.duration = None;
        self.buffered_fraction = 0.0;
        self.error_message = None;
    }

    pub fn playback_fraction(&self) -> f64 {
        progress::fraction_of(self.current_time, self.duration)
    }
}

/// Read-only view of the player published to UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Generation of the request the state belongs to.
    pub request_id: Option<u64>,
    pub status: PlaybackStatus,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub buffered_percent: u8,
    pub playback_percent: u8,
    pub volume: f32,
    pub muted: bool,
    pub error_message: Option<String>,
    /// Whether transport controls should accept input.
    pub controls_enabled: bool,
    /// Whether a payload is available for download.
    pub can_download: bool,
}

impl PlaybackSnapshot {
    pub fn from_state(state: &PlaybackState, request_id: Option<u64>, can_download: bool) -> Self {
        Self {
            request_id,
            status: state.status,
            current_time: state.current_time,
            duration: state.duration,
            buffered_percent: progress::to_percent(state.buffered_fraction),
            playback_percent: progress::to_percent(state.playback_fraction()),
            volume: state.volume,
            muted: state.muted,
            error_message: state.error_message.clone(),
            controls_enabled: state.status.has_asset(),
            can_download,
        }
    }
}
