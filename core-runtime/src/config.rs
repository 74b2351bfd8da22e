//! # Player Configuration Module
//!
//! Provides configuration management for the speech playback core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `PlayerConfig`
//! instance that holds the bridges and settings the player needs. It enforces
//! fail-fast validation so that a misconfigured player is rejected before any
//! request is issued.
//!
//! ## Dependencies
//!
//! - `HttpClient` - Synthesis requests (desktop default: reqwest)
//! - `FileSystemAccess` - Download export (desktop default: tokio fs)
//! - `Clock` - Timestamps for assets and export names (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `FileSystemAccess` are injected automatically if not
//! provided. Other hosts must inject their own.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{PlayerConfig, SynthesisEngine};
//! use std::time::Duration;
//!
//! let config = PlayerConfig::builder()
//!     .endpoint("https://speech.example.com/api/tts")
//!     .language("en")
//!     .engine_preference(SynthesisEngine::Gtts)
//!     .request_timeout(Duration::from_secs(20))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::PlayerConfig;
//!
//! // Missing endpoint
//! let config = PlayerConfig::builder()
//!     .build()
//!     .expect("Should fail - endpoint is required");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SystemClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default request timeout for synthesis calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Language hint that lets the service detect the language itself.
pub const AUTO_LANGUAGE: &str = "auto";

/// Synthesis backend preference forwarded to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisEngine {
    /// Let the service pick.
    Auto,
    Gtts,
    Azure,
    Coqui,
}

impl SynthesisEngine {
    /// Wire name of the engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisEngine::Auto => "auto",
            SynthesisEngine::Gtts => "gtts",
            SynthesisEngine::Azure => "azure",
            SynthesisEngine::Coqui => "coqui",
        }
    }
}

impl fmt::Display for SynthesisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynthesisEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SynthesisEngine::Auto),
            "gtts" => Ok(SynthesisEngine::Gtts),
            "azure" => Ok(SynthesisEngine::Azure),
            "coqui" => Ok(SynthesisEngine::Coqui),
            other => Err(Error::Config(format!(
                "Unknown synthesis engine '{}'. Expected one of: auto, gtts, azure, coqui",
                other
            ))),
        }
    }
}

/// Configuration for the speech playback core.
///
/// Use [`PlayerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct PlayerConfig {
    /// Synthesis endpoint URL
    pub endpoint: String,

    /// Default language hint for requests that don't specify one
    pub language: String,

    /// Default synthesis engine preference
    pub engine_preference: Option<SynthesisEngine>,

    /// Start playback automatically once audio is ready
    pub auto_play: bool,

    /// Timeout applied to each synthesis request
    pub request_timeout: Duration,

    /// Volume applied to the engine when the player starts (0.0 - 1.0)
    pub initial_volume: f32,

    /// Export directory override; `None` uses the file system's download directory
    pub download_dir: Option<PathBuf>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// HTTP client used for synthesis requests
    pub http_client: Arc<dyn HttpClient>,

    /// File system used for downloads
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerConfig")
            .field("endpoint", &self.endpoint)
            .field("language", &self.language)
            .field("engine_preference", &self.engine_preference)
            .field("auto_play", &self.auto_play)
            .field("request_timeout", &self.request_timeout)
            .field("initial_volume", &self.initial_volume)
            .field("download_dir", &self.download_dir)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl PlayerConfig {
    /// Creates a new builder for constructing a `PlayerConfig`.
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Endpoint is an `http://` or `https://` URL
    /// - Language hint is not empty
    /// - Request timeout is non-zero
    /// - Initial volume is within `0.0..=1.0`
    /// - Event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Config("Endpoint cannot be empty".to_string()));
        }

        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Endpoint must be an http:// or https:// URL, got '{}'",
                endpoint
            )));
        }

        if self.language.trim().is_empty() {
            return Err(Error::Config(
                "Language cannot be empty. Use \"auto\" to let the service detect it.".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "Initial volume must be between 0.0 and 1.0, got {}",
                self.initial_volume
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for synthesis requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile/Web: inject the platform's HTTP stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(download_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs = match download_dir {
        Some(dir) => TokioFileSystem::with_download_directory(dir.clone()),
        None => TokioFileSystem::new(),
    };
    Ok(Arc::new(fs))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(
    _download_dir: Option<&PathBuf>,
) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for audio downloads. \
                 Desktop: enable the 'desktop-shims' feature to use the default TokioFileSystem. \
                 Mobile/Web: inject a storage bridge that can export files."
            .to_string(),
    })
}

/// Builder for constructing [`PlayerConfig`] instances.
#[derive(Default)]
pub struct PlayerConfigBuilder {
    endpoint: Option<String>,
    language: Option<String>,
    engine_preference: Option<SynthesisEngine>,
    auto_play: Option<bool>,
    request_timeout: Option<Duration>,
    initial_volume: Option<f32>,
    download_dir: Option<PathBuf>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PlayerConfigBuilder {
    /// Sets the synthesis endpoint URL (required).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the default language hint.
    ///
    /// Default: `"auto"`
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the default synthesis engine preference.
    pub fn engine_preference(mut self, engine: SynthesisEngine) -> Self {
        self.engine_preference = Some(engine);
        self
    }

    /// Enables or disables automatic playback once audio is ready.
    ///
    /// Default: true
    pub fn auto_play(mut self, enabled: bool) -> Self {
        self.auto_play = Some(enabled);
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the initial engine volume.
    ///
    /// Default: 1.0
    pub fn initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = Some(volume);
        self
    }

    /// Sets the export directory for downloads.
    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the time source.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `PlayerConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint is missing or not an HTTP(S) URL
    /// - A required bridge is missing and no desktop default is available
    /// - Any value is out of range
    pub fn build(self) -> Result<PlayerConfig> {
        let endpoint = self.endpoint.ok_or_else(|| {
            Error::Config("Endpoint is required. Use .endpoint() to set it.".to_string())
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(self.download_dir.as_ref())?,
        };

        let config = PlayerConfig {
            endpoint,
            language: self.language.unwrap_or_else(|| AUTO_LANGUAGE.to_string()),
            engine_preference: self.engine_preference,
            auto_play: self.auto_play.unwrap_or(true),
            request_timeout,
            initial_volume: self.initial_volume.unwrap_or(1.0),
            download_dir: self.download_dir,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
