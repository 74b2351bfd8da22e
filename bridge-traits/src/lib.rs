//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the speech playback core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform
//! (desktop, iOS, Android, web).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations against the synthesis endpoint
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Export of downloaded audio
//!
//! ### Media
//! - [`ResourceProvider`](resource::ResourceProvider) - Turns payload bytes into engine-openable references
//! - [`MediaEngine`](media::MediaEngine) - Play/pause/seek/volume and native media events
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation | Status |
//! |----------|----------------|--------|
//! | Desktop  | `bridge-desktop` + headless engine in `core-playback` | ✅ In Progress |
//! | iOS      | TBD            | 📋 Planned |
//! | Android  | TBD            | 📋 Planned |
//! | Web      | TBD            | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report autoplay refusals as `BridgeError::PolicyRejected`
//! - Provide actionable error messages
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync` on native targets. Media traits use
//! [`PlatformSendSync`](platform::PlatformSendSync) so that single-threaded
//! browser objects can implement them on `wasm32`.

pub mod error;
pub mod http;
pub mod media;
pub mod platform;
pub mod resource;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use media::{
    engine_event_channel, EngineEvent, EngineEventReceiver, EngineEventSender, MediaEngine,
    PlayOrigin, TaggedEngineEvent, TimeRanges,
};
pub use resource::{ResourceId, ResourceLocator, ResourceProvider};
pub use storage::FileSystemAccess;
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
