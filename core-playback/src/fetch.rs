//! # Fetch Controller
//!
//! Issues synthesis requests and decides which responses may touch the
//! session.
//!
//! Every request is stamped with a [`FetchTicket`]: the [`RequestKey`] that
//! spawned it and a monotonically increasing generation. The network call runs
//! in its own task and reports a [`FetchOutcome`] through a channel. The
//! driver passes each outcome through [`FetchController::admit`]; anything
//! whose generation is no longer current is dropped there, which also
//! releases any resource the late response produced.

use async_trait::async_trait;
use bridge_traits::{Clock, HttpClient, HttpMethod, HttpRequest, HttpResponse, ResourceProvider};
use bytes::Bytes;
use core_runtime::config::{PlayerConfig, SynthesisEngine};
use core_runtime::logging::{preview_text, redact_if_sensitive};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use crate::error::{PlaybackError, Result};
use crate::format;
use crate::resource::{AudioAsset, PlayableHandle};
use crate::state::RequestKey;

/// Audio returned by a synthesis backend.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub payload: Bytes,
    pub media_type: String,
}

/// Turns a [`RequestKey`] into audio.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, key: &RequestKey) -> Result<SynthesizedAudio>;
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine: Option<SynthesisEngine>,
}

/// JSON answer of endpoints that store the audio and return its location.
#[derive(Debug, Deserialize)]
struct SynthesisEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`SynthesisClient`] that POSTs to an HTTP endpoint.
///
/// A 2xx binary body is the audio. A 2xx JSON body carrying `audio_url` is
/// followed with one authenticated GET. No request is retried.
pub struct HttpSynthesisClient {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
}

impl HttpSynthesisClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            config.endpoint.clone(),
            config.request_timeout,
        )
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(
            method = ?request.method,
            headers = ?loggable_headers(&request),
            "Sending synthesis request"
        );
        let response = self
            .http
            .execute(request.timeout(self.timeout))
            .await
            .map_err(PlaybackError::from_transport)?;

        if !response.is_success() {
            let message = response
                .text()
                .ok()
                .map(|body| body.chars().take(200).collect::<String>())
                .unwrap_or_default();
            return Err(PlaybackError::HttpStatus {
                status: response.status,
                message,
            });
        }

        Ok(response)
    }

    async fn follow_audio_url(&self, audio_url: &str, credential: &str) -> Result<SynthesizedAudio> {
        let url = resolve_audio_url(&self.endpoint, audio_url)?;
        debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "Following audio location"
        );

        let request = HttpRequest::new(HttpMethod::Get, url.as_str()).bearer_token(credential);
        let response = self.send(request).await?;
        into_audio(response)
    }
}

#[async_trait]
impl SynthesisClient for HttpSynthesisClient {
    async fn synthesize(&self, key: &RequestKey) -> Result<SynthesizedAudio> {
        let body = SynthesisBody {
            text: &key.text,
            language: &key.language,
            engine: key.engine,
        };
        let request = HttpRequest::new(HttpMethod::Post, self.endpoint.clone())
            .bearer_token(key.credential.clone())
            .json(&body)
            .map_err(|e| PlaybackError::Internal(e.to_string()))?;

        let response = self.send(request).await?;

        if response.content_type().as_deref() == Some("application/json") {
            let envelope: SynthesisEnvelope = serde_json::from_slice(&response.body)
                .map_err(|e| PlaybackError::SynthesisRejected(format!("malformed JSON body: {}", e)))?;

            if envelope.success == Some(false) {
                return Err(PlaybackError::SynthesisRejected(
                    envelope.message.unwrap_or_else(|| "no message".to_string()),
                ));
            }

            return match envelope.audio_url {
                Some(audio_url) => self.follow_audio_url(&audio_url, &key.credential).await,
                None => Err(PlaybackError::SynthesisRejected(
                    "JSON response without audio_url".to_string(),
                )),
            };
        }

        into_audio(response)
    }
}

fn into_audio(response: HttpResponse) -> Result<SynthesizedAudio> {
    if response.body.is_empty() {
        return Err(PlaybackError::EmptyPayload);
    }
    let content_type = response.content_type();
    let media_type = format::detect_media_type(content_type.as_deref(), &response.body);
    Ok(SynthesizedAudio {
        payload: response.body,
        media_type,
    })
}

/// Request headers with credential-bearing values masked.
fn loggable_headers(request: &HttpRequest) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), redact_if_sensitive(name, value)))
        .collect();
    headers.sort();
    headers
}

/// Resolve `audio_url` against the synthesis endpoint.
fn resolve_audio_url(endpoint: &str, audio_url: &str) -> Result<Url> {
    let base = Url::parse(endpoint).map_err(|e| {
        PlaybackError::SynthesisRejected(format!("invalid endpoint URL: {}", e))
    })?;
    base.join(audio_url)
        .map_err(|e| PlaybackError::SynthesisRejected(format!("invalid audio_url: {}", e)))
}

/// Identity of one issued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub key: RequestKey,
}

/// Result of a request, reported back to the driver.
#[derive(Debug)]
pub enum FetchOutcome {
    Completed {
        ticket: FetchTicket,
        asset: AudioAsset,
    },
    Failed {
        ticket: FetchTicket,
        error: PlaybackError,
    },
}

impl FetchOutcome {
    pub fn ticket(&self) -> &FetchTicket {
        match self {
            FetchOutcome::Completed { ticket, .. } | FetchOutcome::Failed { ticket, .. } => ticket,
        }
    }
}

/// Verdict of [`FetchController::admit`].
#[derive(Debug)]
pub enum Admission {
    /// The outcome belongs to the current request.
    Current(FetchOutcome),
    /// The outcome lost a race and was dropped.
    Stale {
        generation: u64,
        superseded_by: Option<u64>,
    },
}

/// Tracks the current request and spawns the network work.
pub struct FetchController {
    client: Arc<dyn SynthesisClient>,
    resources: Arc<dyn ResourceProvider>,
    clock: Arc<dyn Clock>,
    outcomes: mpsc::UnboundedSender<FetchOutcome>,
    generation: u64,
    current: Option<FetchTicket>,
    shutdown: CancellationToken,
}

impl FetchController {
    /// Create a controller and the receiver its outcomes arrive on.
    pub fn new(
        client: Arc<dyn SynthesisClient>,
        resources: Arc<dyn ResourceProvider>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<FetchOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                resources,
                clock,
                outcomes,
                generation: 0,
                current: None,
                shutdown: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Issue a request for `key`, superseding whatever is in flight.
    pub fn request(&mut self, key: RequestKey) -> FetchTicket {
        self.generation += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            key,
        };

        if let Some(previous) = self.current.replace(ticket.clone()) {
            debug!(
                superseded = previous.generation,
                current = ticket.generation,
                "Superseding in-flight synthesis request"
            );
        }

        info!(
            request_id = ticket.generation,
            language = %ticket.key.language,
            text = %preview_text(&ticket.key.text, 24),
            "Requesting synthesis"
        );

        let client = Arc::clone(&self.client);
        let resources = Arc::clone(&self.resources);
        let clock = Arc::clone(&self.clock);
        let tx = self.outcomes.clone();
        let cancelled = self.shutdown.child_token();
        let task_ticket = ticket.clone();
        let span = tracing::debug_span!("synthesis", request_id = ticket.generation);

        tokio::spawn(
            async move {
                let result = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => {
                        debug!("Synthesis abandoned at shutdown");
                        return;
                    }
                    result = run_fetch(client, resources, clock, &task_ticket.key) => result,
                };

                let outcome = match result {
                    Ok(asset) => FetchOutcome::Completed {
                        ticket: task_ticket,
                        asset,
                    },
                    Err(error) => FetchOutcome::Failed {
                        ticket: task_ticket,
                        error,
                    },
                };

                // On send failure the outcome (and any asset in it) is dropped,
                // which releases the resource.
                if tx.send(outcome).is_err() {
                    debug!("Player gone, dropping synthesis result");
                }
            }
            .instrument(span),
        );

        ticket
    }

    /// Forget the current request so that its outcome will be discarded.
    pub fn invalidate(&mut self) -> Option<FetchTicket> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&FetchTicket> {
        self.current.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.is_some()
    }

    /// Latest generation handed out.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Staleness guard. Only the outcome of the current request is returned;
    /// everything else is dropped here.
    pub fn admit(&mut self, outcome: FetchOutcome) -> Admission {
        let generation = outcome.ticket().generation;

        match &self.current {
            Some(current) if current == outcome.ticket() => {
                self.current = None;
                Admission::Current(outcome)
            }
            current => {
                let superseded_by = current.as_ref().map(|t| t.generation);
                debug!(
                    request_id = generation,
                    superseded_by = ?superseded_by,
                    completed = matches!(outcome, FetchOutcome::Completed { .. }),
                    "Discarding stale synthesis result"
                );
                drop(outcome);
                Admission::Stale {
                    generation,
                    superseded_by,
                }
            }
        }
    }

    /// Abandon every in-flight request.
    pub fn shutdown(&mut self) {
        self.current = None;
        self.shutdown.cancel();
    }
}

impl Drop for FetchController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_fetch(
    client: Arc<dyn SynthesisClient>,
    resources: Arc<dyn ResourceProvider>,
    clock: Arc<dyn Clock>,
    key: &RequestKey,
) -> Result<AudioAsset> {
    let audio = client.synthesize(key).await.map_err(|e| {
        warn!(error = %e, "Synthesis request failed");
        e
    })?;

    let handle = PlayableHandle::acquire(resources, audio.payload.clone(), &audio.media_type)?;
    Ok(AudioAsset::new(
        audio.payload,
        audio.media_type,
        clock.now(),
        handle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{BridgeError, FixedClock, ResourceId, ResourceLocator};
    use mockall::mock;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::sync::oneshot;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, content_type: &str, body: &'static [u8]) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        HttpResponse {
            status,
            headers,
            body: Bytes::from_static(body),
        }
    }

    fn client_with(mock: MockHttpClient) -> HttpSynthesisClient {
        HttpSynthesisClient::new(
            Arc::new(mock),
            "https://speech.example.com/api/speak",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn posts_text_language_and_bearer() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.method == HttpMethod::Post
                    && req.url == "https://speech.example.com/api/speak"
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer tok")
                    && body == serde_json::json!({ "text": "Hello", "language": "en" })
                    && req.timeout == Some(Duration::from_secs(5))
            })
            .times(1)
            .returning(|_| Ok(response(200, "audio/mpeg", b"ID3\x04audio")));

        let audio = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap();

        assert_eq!(audio.media_type, "audio/mpeg");
        assert_eq!(audio.payload, Bytes::from_static(b"ID3\x04audio"));
    }

    #[tokio::test]
    async fn engine_preference_is_forwarded() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                body["engine"] == "coqui"
            })
            .returning(|_| Ok(response(200, "audio/wav", b"RIFF\0\0\0\0WAVE")));

        let key = RequestKey::new("Hallo", "de", "tok").with_engine(SynthesisEngine::Coqui);
        assert!(client_with(http).synthesize(&key).await.is_ok());
    }

    #[tokio::test]
    async fn server_error_is_network_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(response(500, "text/plain", b"boom")));

        let err = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap_err();

        assert!(matches!(err, PlaybackError::HttpStatus { status: 500, .. }));
        assert!(err.is_network_error());
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let err = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Network(_)));
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(response(200, "audio/mpeg", b"")));

        let err = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::EmptyPayload));
    }

    #[tokio::test]
    async fn json_envelope_is_followed() {
        let mut http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    "application/json",
                    br#"{"success": true, "audio_url": "/audio/tts_1.mp3", "duration": 1.2}"#,
                ))
            });
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.url == "https://speech.example.com/audio/tts_1.mp3"
                    && req.headers.contains_key("Authorization")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, "application/octet-stream", b"ID3\x03mp3")));

        let audio = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap();
        assert_eq!(audio.media_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn json_failure_is_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                200,
                "application/json; charset=utf-8",
                br#"{"success": false, "message": "No text provided"}"#,
            ))
        });

        let err = client_with(http)
            .synthesize(&RequestKey::new("Hello", "en", "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::SynthesisRejected(ref m) if m == "No text provided"));
    }

    #[test]
    fn audio_url_resolution() {
        let endpoint = "https://speech.example.com/api/speak";
        let resolve = |audio_url: &str| resolve_audio_url(endpoint, audio_url).unwrap().to_string();

        assert_eq!(resolve("/audio/a.wav"), "https://speech.example.com/audio/a.wav");
        assert_eq!(resolve("a.wav"), "https://speech.example.com/api/a.wav");
        assert_eq!(resolve("https://cdn.example.com/a.wav"), "https://cdn.example.com/a.wav");
        assert_eq!(resolve("HTTPS://cdn.example.com/a.wav"), "https://cdn.example.com/a.wav");
        assert_eq!(resolve("//cdn.example.com/a.wav"), "https://cdn.example.com/a.wav");
        assert_eq!(resolve("../audio/a.wav"), "https://speech.example.com/audio/a.wav");
        assert_eq!(
            resolve_audio_url("http://localhost:5000", "/audio/a.wav")
                .unwrap()
                .as_str(),
            "http://localhost:5000/audio/a.wav"
        );
        assert_eq!(
            resolve_audio_url("https://speech.example.com/api/speak?next=/x", "a.wav")
                .unwrap()
                .as_str(),
            "https://speech.example.com/api/a.wav"
        );
    }

    #[test]
    fn logged_headers_hide_the_bearer_token() {
        let request = HttpRequest::new(HttpMethod::Post, "https://speech.example.com/api/speak")
            .bearer_token("sk-live-secret")
            .json(&serde_json::json!({ "text": "Hello" }))
            .unwrap();

        let headers = loggable_headers(&request);
        assert_eq!(
            headers,
            vec![
                ("Authorization".to_string(), "[REDACTED]".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]
        );
        assert!(!format!("{:?}", headers).contains("sk-live-secret"));
    }

    #[test]
    fn unparsable_endpoint_is_rejected() {
        let err = resolve_audio_url("not a url", "/audio/a.wav").unwrap_err();
        assert!(matches!(err, PlaybackError::SynthesisRejected(_)));
    }

    // ------------------------------------------------------------------
    // Controller
    // ------------------------------------------------------------------

    /// Synthesis client whose responses are released by the test.
    #[derive(Default)]
    struct GatedClient {
        gates: Mutex<HashMap<String, oneshot::Receiver<Result<SynthesizedAudio>>>>,
    }

    impl GatedClient {
        fn gate(&self, text: &str) -> oneshot::Sender<Result<SynthesizedAudio>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(text.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl SynthesisClient for GatedClient {
        async fn synthesize(&self, key: &RequestKey) -> Result<SynthesizedAudio> {
            let rx = self
                .gates
                .lock()
                .remove(&key.text)
                .ok_or_else(|| PlaybackError::Internal("no gate".to_string()))?;
            rx.await
                .unwrap_or_else(|_| Err(PlaybackError::Internal("gate dropped".to_string())))
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        live: Mutex<Vec<ResourceId>>,
        revoked: Mutex<usize>,
    }

    impl ResourceProvider for CountingProvider {
        fn create(
            &self,
            _payload: Bytes,
            media_type: &str,
        ) -> bridge_traits::error::Result<ResourceLocator> {
            let id = ResourceId::new();
            self.live.lock().push(id);
            Ok(ResourceLocator::new(id, format!("test://{}", id), media_type))
        }

        fn revoke(&self, locator: &ResourceLocator) {
            self.live.lock().retain(|id| *id != locator.id);
            *self.revoked.lock() += 1;
        }
    }

    fn mp3() -> Result<SynthesizedAudio> {
        Ok(SynthesizedAudio {
            payload: Bytes::from_static(b"ID3\x04"),
            media_type: "audio/mpeg".to_string(),
        })
    }

    #[tokio::test]
    async fn newer_request_supersedes_older() {
        let client = Arc::new(GatedClient::default());
        let provider = Arc::new(CountingProvider::default());
        let hello = client.gate("Hello");
        let world = client.gate("World");

        let (mut controller, mut outcomes) = FetchController::new(
            client.clone(),
            provider.clone(),
            Arc::new(FixedClock::from_millis(0)),
        );

        let first = controller.request(RequestKey::new("Hello", "en", "tok"));
        let second = controller.request(RequestKey::new("World", "en", "tok"));
        assert_eq!(first.generation + 1, second.generation);

        world.send(mp3()).ok();
        let outcome = outcomes.recv().await.unwrap();
        let current = controller.admit(outcome);
        assert!(matches!(current, Admission::Current(_)));

        hello.send(mp3()).ok();
        let late = outcomes.recv().await.unwrap();
        match controller.admit(late) {
            Admission::Stale { generation, .. } => assert_eq!(generation, first.generation),
            other => panic!("expected stale, got {:?}", other),
        }

        // Only the stale asset was released so far.
        assert_eq!(*provider.revoked.lock(), 1);
        assert_eq!(provider.live.lock().len(), 1);

        drop(current);
        assert!(provider.live.lock().is_empty());
    }

    #[tokio::test]
    async fn invalidated_request_is_discarded() {
        let client = Arc::new(GatedClient::default());
        let provider = Arc::new(CountingProvider::default());
        let hello = client.gate("Hello");

        let (mut controller, mut outcomes) = FetchController::new(
            client.clone(),
            provider.clone(),
            Arc::new(FixedClock::from_millis(0)),
        );

        controller.request(RequestKey::new("Hello", "en", "tok"));
        assert!(controller.invalidate().is_some());
        assert!(!controller.is_in_flight());

        hello.send(mp3()).ok();
        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(
            controller.admit(outcome),
            Admission::Stale {
                superseded_by: None,
                ..
            }
        ));
        assert!(provider.live.lock().is_empty());
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_requests() {
        let client = Arc::new(GatedClient::default());
        let provider = Arc::new(CountingProvider::default());
        let hello = client.gate("Hello");

        let (mut controller, mut outcomes) = FetchController::new(
            client.clone(),
            provider.clone(),
            Arc::new(FixedClock::from_millis(0)),
        );
        controller.request(RequestKey::new("Hello", "en", "tok"));
        controller.shutdown();
        drop(controller);

        hello.send(mp3()).ok();
        assert!(outcomes.recv().await.is_none());
        assert!(provider.live.lock().is_empty());
    }

    #[tokio::test]
    async fn asset_carries_clock_timestamp() {
        let client = Arc::new(GatedClient::default());
        let gate = client.gate("Hello");
        let (mut controller, mut outcomes) = FetchController::new(
            client.clone(),
            Arc::new(CountingProvider::default()),
            Arc::new(FixedClock::from_millis(1_700_000_000_000)),
        );

        controller.request(RequestKey::new("Hello", "en", "tok"));
        gate.send(mp3()).ok();

        match controller.admit(outcomes.recv().await.unwrap()) {
            Admission::Current(FetchOutcome::Completed { asset, .. }) => {
                assert_eq!(asset.created_at().timestamp_millis(), 1_700_000_000_000);
                assert_eq!(asset.media_type(), "audio/mpeg");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
