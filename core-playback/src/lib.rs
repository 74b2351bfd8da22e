//! # Speech Playback Module
//!
//! Fetches synthesized speech and drives its playback on a platform media
//! engine.
//!
//! ## Overview
//!
//! This module handles:
//! - Synthesis requests with a staleness guard (`fetch`)
//! - Revocable playable references with exactly-once release (`resource`)
//! - The playback state machine and its engine event table (`session`)
//! - Guarded transport controls, autoplay fallback and downloads
//! - A single driver task tying it all together (`driver`)
//! - An in-memory headless engine (optional, feature-gated)
//!
//! ## Usage
//!
//! ```ignore
//! let (driver, player) = PlayerDriver::new(&config, engine, resources, synthesis, event_bus);
//! driver.spawn();
//!
//! player.set_request(RequestKey::new("Hello", "en", token)).await?;
//! player.toggle_play().await?;
//! ```

pub mod autoplay;
pub mod download;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod format;
pub mod progress;
pub mod resource;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(feature = "headless-engine")]
pub mod headless;

pub use autoplay::{AutoplayHandler, AutoplayOutcome};
pub use download::{download_file_name, DownloadExporter};
pub use driver::{PlayerCommand, PlayerDriver, PlayerHandle};
pub use engine::EngineAdapter;
pub use error::{PlaybackError, Result};
pub use fetch::{
    Admission, FetchController, FetchOutcome, FetchTicket, HttpSynthesisClient, SynthesisClient,
    SynthesizedAudio,
};
pub use progress::ProgressReconciler;
pub use resource::{AudioAsset, PlayableHandle};
pub use session::PlaybackSession;
pub use state::{PlaybackSnapshot, PlaybackState, PlaybackStatus, RequestKey};
pub use transport::TransportController;

#[cfg(feature = "headless-engine")]
pub use headless::{AutoplayPolicy, HeadlessEngine, HeadlessResourceStore};
