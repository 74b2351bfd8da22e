//! Media engine bridge traits and supporting types.
//!
//! These abstractions allow the core playback module to drive a platform media
//! engine (a browser `HTMLAudioElement`, a native mobile audio session, a
//! headless decode buffer) through one async API. Engines report what happens
//! to the loaded media through an [`EngineEventSender`], which stamps every
//! event with the [`ResourceId`] it was loaded for so that the core can drop
//! callbacks belonging to a superseded resource.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    error::Result,
    platform::PlatformSendSync,
    resource::{ResourceId, ResourceLocator},
};

/// Who asked for playback to start.
///
/// Platforms commonly allow unattended playback only under restrictions;
/// engines use the origin to decide whether a policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOrigin {
    /// Started by the controller without direct user interaction.
    Automatic,
    /// Started in response to a user gesture.
    UserGesture,
}

/// Buffered time ranges, in seconds, ordered by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<(f64, f64)>,
}

impl TimeRanges {
    /// Build from `(start, end)` pairs. Invalid or negative pairs are dropped
    /// and the remainder sorted by start.
    pub fn new(ranges: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut ranges: Vec<(f64, f64)> = ranges
            .into_iter()
            .filter(|(start, end)| start.is_finite() && end.is_finite() && *start >= 0.0 && end >= start)
            .collect();
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { ranges }
    }

    /// Single range covering `[0, end]`.
    pub fn from_end(end: f64) -> Self {
        Self::new([(0.0, end)])
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.ranges.iter()
    }

    /// End time of the last buffered range, if any.
    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|(_, end)| *end)
    }
}

/// Native media events, mirroring the HTML media element event set.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// `timeupdate`: playback position changed.
    TimeUpdate { current_time: f64 },
    /// `loadedmetadata`: duration became known.
    LoadedMetadata { duration: f64 },
    /// `progress`: more of the media has been buffered.
    Progress { buffered: TimeRanges },
    /// `play`: the engine started (or resumed) playback.
    Play,
    /// `pause`: the engine paused playback.
    Pause,
    /// `ended`: playback reached the end of the media.
    Ended,
    /// `error`: the engine failed to decode or play the media.
    Error { message: String },
}

impl EngineEvent {
    /// Short event name, matching the HTML media event names.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TimeUpdate { .. } => "timeupdate",
            EngineEvent::LoadedMetadata { .. } => "loadedmetadata",
            EngineEvent::Progress { .. } => "progress",
            EngineEvent::Play => "play",
            EngineEvent::Pause => "pause",
            EngineEvent::Ended => "ended",
            EngineEvent::Error { .. } => "error",
        }
    }
}

/// An [`EngineEvent`] stamped with the resource it originated from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEngineEvent {
    pub resource: ResourceId,
    pub event: EngineEvent,
}

/// Receiving half of an engine event channel.
pub type EngineEventReceiver = UnboundedReceiver<TaggedEngineEvent>;

/// Sending half handed to an engine on `load`.
///
/// The sender is bound to one resource; every emitted event carries that
/// resource's identity.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    resource: ResourceId,
    tx: UnboundedSender<TaggedEngineEvent>,
}

impl EngineEventSender {
    /// Rebind a sender to another resource, sharing the same channel.
    pub fn for_resource(&self, resource: ResourceId) -> Self {
        Self {
            resource,
            tx: self.tx.clone(),
        }
    }

    /// Resource this sender stamps events with.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Emit an event. Returns `false` if the receiving side is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .unbounded_send(TaggedEngineEvent {
                resource: self.resource,
                event,
            })
            .is_ok()
    }
}

/// Create an engine event channel. The returned sender is bound to a fresh,
/// unused resource id; call [`EngineEventSender::for_resource`] per load.
pub fn engine_event_channel() -> (EngineEventSender, EngineEventReceiver) {
    let (tx, rx) = mpsc::unbounded();
    (
        EngineEventSender {
            resource: ResourceId::new(),
            tx,
        },
        rx,
    )
}

/// Platform media engine capability set.
///
/// One engine plays one resource at a time; `load` replaces whatever was loaded
/// before. Volume is normalized to `0.0..=1.0`; times are in seconds.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait MediaEngine: PlatformSendSync {
    /// Open the resource and start reporting events through `events`.
    async fn load(&self, source: &ResourceLocator, events: EngineEventSender) -> Result<()>;

    /// Begin or resume playback. A policy refusal is reported as
    /// [`BridgeError::PolicyRejected`](crate::error::BridgeError::PolicyRejected).
    async fn play(&self, origin: PlayOrigin) -> Result<()>;

    /// Pause playback.
    async fn pause(&self) -> Result<()>;

    /// Current playback position.
    async fn current_time(&self) -> Result<f64>;

    /// Move the playback position.
    async fn set_current_time(&self, seconds: f64) -> Result<()>;

    /// Media duration, `None` until known.
    async fn duration(&self) -> Result<Option<f64>>;

    /// Set output volume.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Set the engine's mute flag.
    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// Buffered ranges of the loaded media.
    async fn buffered(&self) -> Result<TimeRanges>;

    /// Detach the loaded resource and stop emitting events for it.
    async fn unload(&self) -> Result<()>;
}
