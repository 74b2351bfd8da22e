//! Playable resource handle and the audio asset that owns it.
//!
//! [`PlayableHandle`] wraps one locator obtained from a
//! [`ResourceProvider`]. It is not `Clone`; [`PlayableHandle::release`]
//! consumes it, and dropping it unreleased revokes the locator, so each
//! locator is revoked exactly once.

use bridge_traits::{ResourceId, ResourceLocator, ResourceProvider};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{PlaybackError, Result};

/// Owned, revocable reference to a downloaded payload.
pub struct PlayableHandle {
    locator: ResourceLocator,
    provider: Arc<dyn ResourceProvider>,
    live: bool,
}

impl PlayableHandle {
    /// Register `payload` with the provider.
    pub fn acquire(
        provider: Arc<dyn ResourceProvider>,
        payload: Bytes,
        media_type: &str,
    ) -> Result<Self> {
        let size = payload.len();
        let locator = provider
            .create(payload, media_type)
            .map_err(|e| PlaybackError::Resource(e.to_string()))?;

        debug!(resource = %locator.id, size, media_type, "Acquired playable resource");

        Ok(Self {
            locator,
            provider,
            live: true,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.locator.id
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Revoke the reference.
    pub fn release(mut self) {
        self.revoke();
    }

    fn revoke(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.provider.revoke(&self.locator);
        trace!(resource = %self.locator.id, "Released playable resource");
    }
}

impl Drop for PlayableHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for PlayableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayableHandle")
            .field("id", &self.locator.id)
            .field("uri", &self.locator.uri)
            .field("live", &self.live)
            .finish()
    }
}

/// A synthesized payload together with its playable reference.
///
/// The raw payload outlives the reference: after
/// [`release_reference`](AudioAsset::release_reference) the bytes stay
/// available for download.
#[derive(Debug)]
pub struct AudioAsset {
    payload: Bytes,
    media_type: String,
    created_at: DateTime<Utc>,
    reference: Option<PlayableHandle>,
}

impl AudioAsset {
    pub fn new(
        payload: Bytes,
        media_type: impl Into<String>,
        created_at: DateTime<Utc>,
        reference: PlayableHandle,
    ) -> Self {
        Self {
            payload,
            media_type: media_type.into(),
            created_at,
            reference: Some(reference),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn reference(&self) -> Option<&PlayableHandle> {
        self.reference.as_ref()
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.reference.as_ref().map(PlayableHandle::id)
    }

    /// Release the playable reference, keeping the payload. Returns `false`
    /// if it was already released.
    pub fn release_reference(&mut self) -> bool {
        match self.reference.take() {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }
}
