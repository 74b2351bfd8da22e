//! Shared fixtures for the player integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::Result as BridgeResult, EngineEvent, EngineEventSender, FixedClock, HttpClient,
    HttpRequest, HttpResponse, MediaEngine, PlayOrigin, ResourceId, ResourceLocator,
    ResourceProvider, TimeRanges,
};
use bytes::Bytes;
use core_playback::{
    PlaybackError, PlaybackSnapshot, PlayerHandle, RequestKey, SynthesisClient, SynthesizedAudio,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventStream, PlaybackEvent};
use mockall::mock;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

pub const ENDPOINT: &str = "https://speech.example.com/api/speak";
pub const TOKEN: &str = "test-token";
pub const WAIT: Duration = Duration::from_secs(5);

mock! {
    pub HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

/// 16-bit mono PCM WAV of `seconds` length at 8 kHz.
pub fn wav_payload(seconds: u32) -> Bytes {
    let sample_rate = 8_000u32;
    let data_len = sample_rate * seconds * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    Bytes::from(out)
}

pub fn audio_response(status: u16, content_type: &str, body: Bytes) -> HttpResponse {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    HttpResponse {
        status,
        headers,
        body,
    }
}

pub fn key(text: &str) -> RequestKey {
    RequestKey::new(text, "en", TOKEN)
}

pub fn config(http: Arc<dyn HttpClient>, download_dir: &Path, auto_play: bool) -> PlayerConfig {
    PlayerConfig::builder()
        .endpoint(ENDPOINT)
        .auto_play(auto_play)
        .http_client(http)
        .file_system(Arc::new(TokioFileSystem::with_download_directory(
            download_dir.to_path_buf(),
        )))
        .clock(Arc::new(FixedClock::from_millis(1_700_000_000_000)))
        .build()
        .unwrap()
}

/// Config for suites that inject their own [`SynthesisClient`].
pub fn offline_config(download_dir: &Path, auto_play: bool) -> PlayerConfig {
    config(Arc::new(MockHttpClient::new()), download_dir, auto_play)
}

/// Synthesis client whose responses can be held back per text.
#[derive(Default)]
pub struct GatedSynthesis {
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    seconds: Mutex<HashMap<String, u32>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl GatedSynthesis {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold the response for `text` until the returned sender fires.
    pub fn gate(&self, text: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(text.to_string(), rx);
        tx
    }

    pub fn audio_seconds(&self, text: &str, seconds: u32) {
        self.seconds.lock().insert(text.to_string(), seconds);
    }

    pub fn fail(&self, text: &str) {
        self.failing.lock().insert(text.to_string());
    }

    pub fn recover(&self, text: &str) {
        self.failing.lock().remove(text);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SynthesisClient for GatedSynthesis {
    async fn synthesize(&self, key: &RequestKey) -> core_playback::Result<SynthesizedAudio> {
        self.calls.lock().push(key.text.clone());

        let gate = self.gates.lock().remove(&key.text);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.failing.lock().contains(&key.text) {
            return Err(PlaybackError::HttpStatus {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        let seconds = self.seconds.lock().get(&key.text).copied().unwrap_or(1);
        Ok(SynthesizedAudio {
            payload: wav_payload(seconds),
            media_type: "audio/wav".to_string(),
        })
    }
}

/// Provider that counts creations and revocations.
#[derive(Default)]
pub struct CountingProvider {
    live: Mutex<HashSet<ResourceId>>,
    created: Mutex<usize>,
    revoked: Mutex<Vec<ResourceId>>,
    observer: Mutex<Option<Arc<ScriptedEngine>>>,
}

impl CountingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        *self.created.lock()
    }

    pub fn revoked(&self) -> Vec<ResourceId> {
        self.revoked.lock().clone()
    }

    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    /// Log every revoke into `engine`'s call list, interleaved with its own
    /// calls.
    pub fn report_to(&self, engine: Arc<ScriptedEngine>) {
        *self.observer.lock() = Some(engine);
    }
}

impl ResourceProvider for CountingProvider {
    fn create(&self, _payload: Bytes, media_type: &str) -> BridgeResult<ResourceLocator> {
        let id = ResourceId::new();
        *self.created.lock() += 1;
        self.live.lock().insert(id);
        Ok(ResourceLocator::new(id, format!("test://{}", id), media_type))
    }

    fn revoke(&self, locator: &ResourceLocator) {
        assert!(
            self.live.lock().remove(&locator.id),
            "resource {} revoked twice or never created",
            locator.id
        );
        self.revoked.lock().push(locator.id);
        if let Some(engine) = self.observer.lock().as_ref() {
            engine.record("revoke");
        }
    }
}

/// Engine driven by the test: it answers play/pause with the matching
/// events and hands out the sender of every load.
#[derive(Default)]
pub struct ScriptedEngine {
    senders: Mutex<Vec<EngineEventSender>>,
    duration: Mutex<Option<f64>>,
    position: Mutex<f64>,
    calls: Mutex<Vec<String>>,
    reject_automatic: Mutex<bool>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_duration(self: Arc<Self>, duration: f64) -> Arc<Self> {
        *self.duration.lock() = Some(duration);
        self
    }

    pub fn reject_automatic(&self, reject: bool) {
        *self.reject_automatic.lock() = reject;
    }

    /// Sender of the `n`th load.
    pub fn sender(&self, n: usize) -> EngineEventSender {
        self.senders.lock()[n].clone()
    }

    pub fn loads(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn emit_latest(&self, event: EngineEvent) {
        if let Some(sender) = self.senders.lock().last() {
            sender.emit(event);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn load(&self, _source: &ResourceLocator, events: EngineEventSender) -> BridgeResult<()> {
        self.calls.lock().push("load".to_string());
        if let Some(duration) = *self.duration.lock() {
            events.emit(EngineEvent::LoadedMetadata { duration });
        }
        self.senders.lock().push(events);
        *self.position.lock() = 0.0;
        Ok(())
    }

    async fn play(&self, origin: PlayOrigin) -> BridgeResult<()> {
        if origin == PlayOrigin::Automatic && *self.reject_automatic.lock() {
            return Err(bridge_traits::BridgeError::PolicyRejected(
                "user gesture required".to_string(),
            ));
        }
        self.calls.lock().push("play".to_string());
        self.emit_latest(EngineEvent::Play);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.calls.lock().push("pause".to_string());
        self.emit_latest(EngineEvent::Pause);
        Ok(())
    }

    async fn current_time(&self) -> BridgeResult<f64> {
        Ok(*self.position.lock())
    }

    async fn set_current_time(&self, seconds: f64) -> BridgeResult<()> {
        self.calls.lock().push(format!("seek {}", seconds));
        *self.position.lock() = seconds;
        Ok(())
    }

    async fn duration(&self) -> BridgeResult<Option<f64>> {
        Ok(*self.duration.lock())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.calls.lock().push(format!("volume {}", volume));
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> BridgeResult<()> {
        self.calls.lock().push(format!("muted {}", muted));
        Ok(())
    }

    async fn buffered(&self) -> BridgeResult<TimeRanges> {
        Ok(self
            .duration
            .lock()
            .map(TimeRanges::from_end)
            .unwrap_or_default())
    }

    async fn unload(&self) -> BridgeResult<()> {
        self.calls.lock().push("unload".to_string());
        Ok(())
    }
}

/// Poll snapshots until `predicate` holds.
pub async fn wait_until<F>(player: &PlayerHandle, predicate: F) -> PlaybackSnapshot
where
    F: Fn(&PlaybackSnapshot) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let snapshot = player.snapshot().await.unwrap();
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

/// Collect `(from, to)` status changes until one ends in `target`.
pub async fn statuses_until(stream: &mut EventStream, target: &str) -> Vec<(String, String)> {
    tokio::time::timeout(WAIT, async {
        let mut seen = Vec::new();
        loop {
            if let CoreEvent::Playback(PlaybackEvent::StatusChanged { from, to, .. }) =
                stream.recv().await.unwrap()
            {
                let done = to == target;
                seen.push((from, to));
                if done {
                    return seen;
                }
            }
        }
    })
    .await
    .expect("status not reached in time")
}

/// Wait for the first event matching `predicate`.
pub async fn next_matching<F>(stream: &mut EventStream, predicate: F) -> CoreEvent
where
    F: Fn(&CoreEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = stream.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not observed in time")
}
