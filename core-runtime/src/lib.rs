//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the speech playback core:
//! - Logging and tracing infrastructure
//! - Player configuration
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback and service
//! crates depend on. It establishes the logging conventions, the configuration
//! builder and the event broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{PlayerConfig, PlayerConfigBuilder, SynthesisEngine};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, EventStream, FetchEvent, PlaybackEvent};
