//! Playable resource bridge.
//!
//! A host turns downloaded audio bytes into something its media engine can
//! open: an object URL in the browser, a temporary file or asset on mobile, an
//! in-memory buffer for headless hosts. The core only ever sees the opaque
//! [`ResourceLocator`] and must hand it back through [`ResourceProvider::revoke`]
//! when it is done.

use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

use crate::{error::Result, platform::PlatformSendSync};

/// Identity of one playable reference. Never reused across acquisitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generate a new resource identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-facing reference to a playable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    /// Identity used to tag engine events originating from this resource.
    pub id: ResourceId,
    /// Platform URI the engine opens (e.g. `blob:...`, `mem://...`).
    pub uri: String,
    /// Media type of the payload behind the URI.
    pub media_type: String,
}

impl ResourceLocator {
    pub fn new(id: ResourceId, uri: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
            media_type: media_type.into(),
        }
    }
}

/// Creates and revokes playable references for downloaded payloads.
///
/// Implementations must tolerate `revoke` for a locator they no longer track
/// (it is a no-op), but the core guarantees it calls `revoke` exactly once per
/// locator returned from `create`.
pub trait ResourceProvider: PlatformSendSync {
    /// Register the payload and return a locator the media engine can open.
    fn create(&self, payload: Bytes, media_type: &str) -> Result<ResourceLocator>;

    /// Invalidate the locator and free whatever backs it.
    fn revoke(&self, locator: &ResourceLocator);
}
