//! # Headless Engine
//!
//! Media engine and resource provider for hosts without a native audio
//! element: payloads live in memory under `mem://` locators, duration is
//! probed from the container and playback advances a simulated clock on a
//! tokio interval.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    EngineEvent, EngineEventSender, MediaEngine, PlayOrigin, ResourceId, ResourceLocator,
    ResourceProvider, TimeRanges,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::format::probe_duration;

const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// Whether unattended playback is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    #[default]
    Allow,
    /// Automatic playback is refused until the first user gesture.
    RequireUserGesture,
}

struct StoredPayload {
    payload: Bytes,
    media_type: String,
}

/// In-memory [`ResourceProvider`].
#[derive(Default)]
pub struct HeadlessResourceStore {
    entries: Mutex<HashMap<String, StoredPayload>>,
}

impl HeadlessResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of references created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn payload(&self, locator: &ResourceLocator) -> Option<(Bytes, String)> {
        self.entries
            .lock()
            .get(&locator.uri)
            .map(|entry| (entry.payload.clone(), entry.media_type.clone()))
    }
}

impl ResourceProvider for HeadlessResourceStore {
    fn create(&self, payload: Bytes, media_type: &str) -> Result<ResourceLocator> {
        let id = ResourceId::new();
        let uri = format!("mem://{}", id);
        self.entries.lock().insert(
            uri.clone(),
            StoredPayload {
                payload,
                media_type: media_type.to_string(),
            },
        );
        Ok(ResourceLocator::new(id, uri, media_type))
    }

    fn revoke(&self, locator: &ResourceLocator) {
        if self.entries.lock().remove(&locator.uri).is_none() {
            debug!(uri = %locator.uri, "Revoking unknown resource");
        }
    }
}

struct Loaded {
    resource: ResourceId,
    events: EngineEventSender,
    duration: Option<f64>,
    position: f64,
    ticker: Option<CancellationToken>,
}

impl Loaded {
    fn stop_ticker(&mut self) -> bool {
        match self.ticker.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct EngineState {
    loaded: Option<Loaded>,
    volume: f32,
    muted: bool,
    user_activated: bool,
}

/// Simulated-clock [`MediaEngine`] reading from a [`HeadlessResourceStore`].
pub struct HeadlessEngine {
    store: Arc<HeadlessResourceStore>,
    policy: AutoplayPolicy,
    tick: Duration,
    rate: f64,
    state: Arc<Mutex<EngineState>>,
}

impl HeadlessEngine {
    pub fn new(store: Arc<HeadlessResourceStore>) -> Self {
        Self {
            store,
            policy: AutoplayPolicy::default(),
            tick: DEFAULT_TICK,
            rate: 1.0,
            state: Arc::new(Mutex::new(EngineState {
                volume: 1.0,
                ..EngineState::default()
            })),
        }
    }

    pub fn with_policy(mut self, policy: AutoplayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Interval between `timeupdate` events.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Media seconds advanced per wall-clock second.
    pub fn with_rate(mut self, rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
        self
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn is_playing(&self) -> bool {
        self.state
            .lock()
            .loaded
            .as_ref()
            .is_some_and(|l| l.ticker.is_some())
    }

    pub fn loaded_resource(&self) -> Option<ResourceId> {
        self.state.lock().loaded.as_ref().map(|l| l.resource)
    }

    fn with_loaded<T>(&self, f: impl FnOnce(&mut Loaded) -> T) -> Result<T> {
        let mut state = self.state.lock();
        match state.loaded.as_mut() {
            Some(loaded) => Ok(f(loaded)),
            None => Err(BridgeError::NotAvailable("no media loaded".to_string())),
        }
    }

    fn spawn_ticker(&self, resource: ResourceId, token: CancellationToken) {
        let state = Arc::clone(&self.state);
        let tick = self.tick;
        let step = tick.as_secs_f64() * self.rate;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if !advance(&state, resource, &token, step) {
                    break;
                }
            }
            trace!(resource = %resource, "Playback ticker stopped");
        });
    }
}

/// Move the simulated clock forward one step. Returns `false` when the ticker
/// should stop.
fn advance(
    state: &Mutex<EngineState>,
    resource: ResourceId,
    token: &CancellationToken,
    step: f64,
) -> bool {
    let mut state = state.lock();
    let Some(loaded) = state.loaded.as_mut() else {
        return false;
    };
    if loaded.resource != resource || token.is_cancelled() {
        return false;
    }

    loaded.position += step;
    match loaded.duration {
        Some(duration) if loaded.position >= duration => {
            loaded.position = duration;
            loaded.ticker = None;
            loaded.events.emit(EngineEvent::TimeUpdate {
                current_time: duration,
            });
            loaded.events.emit(EngineEvent::Ended);
            false
        }
        _ => {
            loaded.events.emit(EngineEvent::TimeUpdate {
                current_time: loaded.position,
            });
            true
        }
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        if let Some(loaded) = self.state.lock().loaded.as_mut() {
            loaded.stop_ticker();
        }
    }
}

#[async_trait]
impl MediaEngine for HeadlessEngine {
    async fn load(&self, source: &ResourceLocator, events: EngineEventSender) -> Result<()> {
        let (payload, media_type) = self
            .store
            .payload(source)
            .ok_or_else(|| BridgeError::ResourceRevoked(source.uri.clone()))?;

        let duration = if payload.is_empty() {
            None
        } else {
            probe_duration(payload.clone(), &media_type)
        };

        let mut state = self.state.lock();
        if let Some(previous) = state.loaded.as_mut() {
            previous.stop_ticker();
        }

        debug!(resource = %source.id, duration = ?duration, "Headless engine loaded media");

        if payload.is_empty() {
            events.emit(EngineEvent::Error {
                message: "empty media payload".to_string(),
            });
        } else if let Some(duration) = duration {
            events.emit(EngineEvent::LoadedMetadata { duration });
            events.emit(EngineEvent::Progress {
                buffered: TimeRanges::from_end(duration),
            });
        }

        state.loaded = Some(Loaded {
            resource: source.id,
            events,
            duration,
            position: 0.0,
            ticker: None,
        });
        Ok(())
    }

    async fn play(&self, origin: PlayOrigin) -> Result<()> {
        let resource = {
            let mut state = self.state.lock();
            match origin {
                PlayOrigin::UserGesture => state.user_activated = true,
                PlayOrigin::Automatic => {
                    if self.policy == AutoplayPolicy::RequireUserGesture && !state.user_activated {
                        return Err(BridgeError::PolicyRejected(
                            "playback requires a user gesture".to_string(),
                        ));
                    }
                }
            }

            let loaded = state
                .loaded
                .as_mut()
                .ok_or_else(|| BridgeError::NotAvailable("no media loaded".to_string()))?;
            if loaded.ticker.is_some() {
                return Ok(());
            }
            if loaded.duration.is_some_and(|d| loaded.position >= d) {
                loaded.position = 0.0;
            }

            loaded.ticker = Some(CancellationToken::new());
            loaded.events.emit(EngineEvent::Play);
            loaded.resource
        };

        let token = self.with_loaded(|l| l.ticker.clone())?;
        if let Some(token) = token {
            self.spawn_ticker(resource, token);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.with_loaded(|loaded| {
            if loaded.stop_ticker() {
                loaded.events.emit(EngineEvent::Pause);
            }
        })
    }

    async fn current_time(&self) -> Result<f64> {
        self.with_loaded(|loaded| loaded.position)
    }

    async fn set_current_time(&self, seconds: f64) -> Result<()> {
        self.with_loaded(|loaded| {
            let upper = loaded.duration.unwrap_or(f64::MAX);
            loaded.position = if seconds.is_finite() {
                seconds.clamp(0.0, upper)
            } else {
                0.0
            };
            loaded.events.emit(EngineEvent::TimeUpdate {
                current_time: loaded.position,
            });
        })
    }

    async fn duration(&self) -> Result<Option<f64>> {
        self.with_loaded(|loaded| loaded.duration)
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.state.lock().muted = muted;
        Ok(())
    }

    async fn buffered(&self) -> Result<TimeRanges> {
        self.with_loaded(|loaded| {
            loaded
                .duration
                .map(TimeRanges::from_end)
                .unwrap_or_default()
        })
    }

    async fn unload(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(mut loaded) = state.loaded.take() {
            loaded.stop_ticker();
            debug!(resource = %loaded.resource, "Headless engine unloaded media");
        }
        Ok(())
    }
}
