//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`PlayerConfig`] and host-provided media bridges (media
//! engine, resource provider) into a running player driver. Desktop apps
//! typically enable the `desktop-shims` feature (reqwest HTTP client, tokio
//! file system) together with `headless-engine`, whereas hosts with a native
//! audio element pass their own [`MediaEngine`] and [`ResourceProvider`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{MediaEngine, ResourceProvider};
use core_playback::{HttpSynthesisClient, PlayerDriver, PlayerHandle, RequestKey, SynthesisClient};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{EventBus, EventStream};
use tokio::task::JoinHandle;
use tracing::info;

#[cfg(feature = "headless-engine")]
use core_playback::{AutoplayPolicy, HeadlessEngine, HeadlessResourceStore};

/// Media bridges and an optional synthesis client override.
pub struct PlayerDependencies {
    pub engine: Arc<dyn MediaEngine>,
    pub resources: Arc<dyn ResourceProvider>,
    pub synthesis: Option<Arc<dyn SynthesisClient>>,
}

impl PlayerDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(engine: Arc<dyn MediaEngine>, resources: Arc<dyn ResourceProvider>) -> Self {
        Self {
            engine,
            resources,
            synthesis: None,
        }
    }

    /// Use `client` instead of the HTTP client built from the config.
    pub fn with_synthesis(mut self, client: Arc<dyn SynthesisClient>) -> Self {
        self.synthesis = Some(client);
        self
    }

    /// In-memory engine and store for hosts without a native audio element.
    #[cfg(feature = "headless-engine")]
    pub fn headless(policy: AutoplayPolicy) -> Self {
        let store = Arc::new(HeadlessResourceStore::new());
        let engine = Arc::new(HeadlessEngine::new(Arc::clone(&store)).with_policy(policy));
        Self::new(engine, store)
    }
}

/// Primary façade exposed to host applications.
pub struct TtsPlayerService {
    config: PlayerConfig,
    player: PlayerHandle,
    driver: JoinHandle<()>,
}

impl TtsPlayerService {
    /// Validate `config` and start the player driver on the current tokio
    /// runtime.
    pub fn start(config: PlayerConfig, deps: PlayerDependencies) -> Result<Self> {
        config.validate()?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CoreError::CapabilityMissing {
                capability: "tokio runtime".to_string(),
                message: "TtsPlayerService::start must be called from within a tokio runtime"
                    .to_string(),
            });
        }

        let synthesis = deps
            .synthesis
            .unwrap_or_else(|| Arc::new(HttpSynthesisClient::from_config(&config)));
        let events = EventBus::new(config.event_buffer_size);
        let (driver, player) =
            PlayerDriver::new(&config, deps.engine, deps.resources, synthesis, events);
        let driver = driver.spawn();

        info!(
            endpoint = %config.endpoint,
            language = %config.language,
            auto_play = config.auto_play,
            "Speech player service started"
        );

        Ok(Self {
            config,
            player,
            driver,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Cloneable handle for transport controls and snapshots.
    pub fn player(&self) -> PlayerHandle {
        self.player.clone()
    }

    pub fn subscribe(&self) -> EventStream {
        self.player.subscribe()
    }

    /// Request speech for `text`. An empty `language` uses the configured
    /// default.
    pub async fn speak(
        &self,
        text: impl Into<String>,
        language: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<()> {
        let key = RequestKey::new(text, language, credential);
        self.player.set_request(key).await?;
        Ok(())
    }

    /// Stop the driver and wait for it to release everything it holds.
    pub async fn shutdown(self) -> Result<()> {
        self.player.shutdown().await?;
        self.driver
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("driver task failed: {}", e)))?;
        info!("Speech player service stopped");
        Ok(())
    }
}

/// Convenience bootstrapper for desktop hosts: reqwest HTTP, tokio file
/// system and the headless engine.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let service = core_service::bootstrap_desktop("https://tts.example.com/speak")?;
/// service.speak("Hello", "en", "token").await?;
/// # Ok(())
/// # }
/// ```
#[cfg(all(feature = "desktop-shims", feature = "headless-engine"))]
pub fn bootstrap_desktop(endpoint: impl Into<String>) -> Result<TtsPlayerService> {
    let config = PlayerConfig::builder().endpoint(endpoint).build()?;
    TtsPlayerService::start(config, PlayerDependencies::headless(AutoplayPolicy::Allow))
}

#[cfg(all(test, feature = "headless-engine"))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        error::Result as BridgeResult, FileSystemAccess, HttpClient, HttpRequest, HttpResponse,
    };
    use bytes::Bytes;
    use core_playback::{PlaybackStatus, SynthesizedAudio};
    use mockall::mock;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        FileSystem {}

        #[async_trait]
        impl FileSystemAccess for FileSystem {
            async fn get_download_directory(&self) -> BridgeResult<PathBuf>;
            async fn exists(&self, path: &Path) -> BridgeResult<bool>;
            async fn create_dir_all(&self, path: &Path) -> BridgeResult<()>;
            async fn read_file(&self, path: &Path) -> BridgeResult<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()>;
            async fn delete_file(&self, path: &Path) -> BridgeResult<()>;
        }
    }

    struct OneSecondWav;

    #[async_trait]
    impl SynthesisClient for OneSecondWav {
        async fn synthesize(&self, _key: &RequestKey) -> core_playback::Result<SynthesizedAudio> {
            let sample_rate = 8_000u32;
            let data_len = sample_rate * 2;
            let mut wav = Vec::new();
            wav.extend_from_slice(b"RIFF");
            wav.extend_from_slice(&(36 + data_len).to_le_bytes());
            wav.extend_from_slice(b"WAVEfmt ");
            wav.extend_from_slice(&16u32.to_le_bytes());
            wav.extend_from_slice(&1u16.to_le_bytes());
            wav.extend_from_slice(&1u16.to_le_bytes());
            wav.extend_from_slice(&sample_rate.to_le_bytes());
            wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
            wav.extend_from_slice(&2u16.to_le_bytes());
            wav.extend_from_slice(&16u16.to_le_bytes());
            wav.extend_from_slice(b"data");
            wav.extend_from_slice(&data_len.to_le_bytes());
            wav.resize(44 + data_len as usize, 0);
            Ok(SynthesizedAudio {
                payload: Bytes::from(wav),
                media_type: "audio/wav".to_string(),
            })
        }
    }

    fn config() -> PlayerConfig {
        PlayerConfig::builder()
            .endpoint("https://tts.example.com/speak")
            .auto_play(false)
            .http_client(Arc::new(MockHttpClient::new()))
            .file_system(Arc::new(MockFileSystem::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_service_speaks_and_shuts_down() {
        let deps = PlayerDependencies::headless(AutoplayPolicy::Allow)
            .with_synthesis(Arc::new(OneSecondWav));
        let service = TtsPlayerService::start(config(), deps).unwrap();
        let player = service.player();

        service.speak("Hello", "en", "token").await.unwrap();

        let ready = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = player.snapshot().await.unwrap();
                if snapshot.status == PlaybackStatus::Ready && snapshot.duration.is_some() {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(ready.duration, Some(1.0));

        service.shutdown().await.unwrap();
        assert!(matches!(
            player.snapshot().await,
            Err(core_playback::PlaybackError::DriverClosed)
        ));
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let deps = PlayerDependencies::headless(AutoplayPolicy::Allow);
        let result = TtsPlayerService::start(config(), deps);
        assert!(matches!(
            result,
            Err(CoreError::CapabilityMissing { ref capability, .. }) if capability == "tokio runtime"
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = config();
        config.initial_volume = 2.0;
        let result =
            TtsPlayerService::start(config, PlayerDependencies::headless(AutoplayPolicy::Allow));
        assert!(matches!(result, Err(CoreError::Runtime(_))));
    }
}
