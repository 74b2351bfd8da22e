//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! the speech playback core needs on desktop:
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs`, exporting into the user's download
//!   directory
//!
//! Media playback on desktop uses the headless engine shipped with
//! `core-playback` (feature `headless-engine`).
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = Arc::new(ReqwestHttpClient::new()?);
//!     let fs = Arc::new(TokioFileSystem::new());
//!
//!     // Use in player configuration
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
