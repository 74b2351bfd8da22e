//! Autoplay fallback.
//!
//! Once an asset is ready the player may try to start playback on its own.
//! Platforms are free to refuse unattended playback; a refusal leaves the
//! player in `ready` waiting for a user gesture and is only logged.

use bridge_traits::{PlayOrigin, ResourceId};
use tracing::{debug, info, warn};

use crate::engine::EngineAdapter;
use crate::error::PlaybackError;

/// Result of one autoplay attempt.
#[derive(Debug)]
pub enum AutoplayOutcome {
    /// Autoplay is turned off.
    Disabled,
    /// This resource was already attempted.
    AlreadyAttempted,
    /// The engine accepted the play request.
    Started,
    /// The platform refused unattended playback.
    Blocked,
    /// The engine failed for another reason.
    Failed(PlaybackError),
}

/// Attempts automatic playback at most once per resource.
#[derive(Debug, Clone)]
pub struct AutoplayHandler {
    enabled: bool,
    attempted: Option<ResourceId>,
}

impl AutoplayHandler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            attempted: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget the last attempted resource.
    pub fn reset(&mut self) {
        self.attempted = None;
    }

    /// Try to start playback of the resource currently bound to `adapter`.
    pub async fn attempt(&mut self, adapter: &EngineAdapter) -> AutoplayOutcome {
        if !self.enabled {
            return AutoplayOutcome::Disabled;
        }

        let Some(resource) = adapter.bound() else {
            return AutoplayOutcome::Failed(PlaybackError::InvalidOperation(
                "autoplay without a bound resource".to_string(),
            ));
        };

        if self.attempted == Some(resource) {
            debug!(resource = %resource, "Autoplay already attempted");
            return AutoplayOutcome::AlreadyAttempted;
        }
        self.attempted = Some(resource);

        match adapter.play(PlayOrigin::Automatic).await {
            Ok(()) => {
                info!(resource = %resource, "Autoplay started");
                AutoplayOutcome::Started
            }
            Err(PlaybackError::AutoplayBlocked(reason)) => {
                warn!(
                    resource = %resource,
                    reason = %reason,
                    "Autoplay blocked by platform policy; waiting for user"
                );
                AutoplayOutcome::Blocked
            }
            Err(e) => AutoplayOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PlayableHandle;
    use async_trait::async_trait;
    use bridge_traits::{
        engine_event_channel, error::Result as BridgeResult, BridgeError, EngineEventSender,
        MediaEngine, ResourceLocator, ResourceProvider, TimeRanges,
    };
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Provider;

    impl ResourceProvider for Provider {
        fn create(&self, _payload: Bytes, media_type: &str) -> BridgeResult<ResourceLocator> {
            let id = ResourceId::new();
            Ok(ResourceLocator::new(id, format!("test://{}", id), media_type))
        }

        fn revoke(&self, _locator: &ResourceLocator) {}
    }

    enum PlayBehaviour {
        Accept,
        Reject,
        Fail,
    }

    struct PolicyEngine {
        behaviour: PlayBehaviour,
        plays: Mutex<Vec<PlayOrigin>>,
    }

    impl PolicyEngine {
        fn new(behaviour: PlayBehaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                plays: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MediaEngine for PolicyEngine {
        async fn load(&self, _source: &ResourceLocator, _events: EngineEventSender) -> BridgeResult<()> {
            Ok(())
        }

        async fn play(&self, origin: PlayOrigin) -> BridgeResult<()> {
            self.plays.lock().push(origin);
            match self.behaviour {
                PlayBehaviour::Accept => Ok(()),
                PlayBehaviour::Reject => Err(BridgeError::PolicyRejected(
                    "user gesture required".to_string(),
                )),
                PlayBehaviour::Fail => Err(BridgeError::OperationFailed("decoder".to_string())),
            }
        }

        async fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn current_time(&self) -> BridgeResult<f64> {
            Ok(0.0)
        }

        async fn set_current_time(&self, _seconds: f64) -> BridgeResult<()> {
            Ok(())
        }

        async fn duration(&self) -> BridgeResult<Option<f64>> {
            Ok(None)
        }

        async fn set_volume(&self, _volume: f32) -> BridgeResult<()> {
            Ok(())
        }

        async fn set_muted(&self, _muted: bool) -> BridgeResult<()> {
            Ok(())
        }

        async fn buffered(&self) -> BridgeResult<TimeRanges> {
            Ok(TimeRanges::default())
        }

        async fn unload(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    async fn bound_adapter(engine: Arc<PolicyEngine>) -> (EngineAdapter, PlayableHandle) {
        let (sender, _rx) = engine_event_channel();
        let mut adapter = EngineAdapter::new(engine, sender);
        let handle =
            PlayableHandle::acquire(Arc::new(Provider), Bytes::from_static(b"RIFF"), "audio/wav")
                .unwrap();
        adapter.bind(&handle, 1.0, false).await.unwrap();
        (adapter, handle)
    }

    #[tokio::test]
    async fn test_autoplay_runs_once_per_resource() {
        let engine = PolicyEngine::new(PlayBehaviour::Accept);
        let (adapter, _handle) = bound_adapter(engine.clone()).await;
        let mut handler = AutoplayHandler::new(true);

        assert!(matches!(
            handler.attempt(&adapter).await,
            AutoplayOutcome::Started
        ));
        assert!(matches!(
            handler.attempt(&adapter).await,
            AutoplayOutcome::AlreadyAttempted
        ));
        assert_eq!(*engine.plays.lock(), vec![PlayOrigin::Automatic]);
    }

    #[tokio::test]
    async fn test_policy_rejection_is_blocked_not_failed() {
        let engine = PolicyEngine::new(PlayBehaviour::Reject);
        let (adapter, _handle) = bound_adapter(engine).await;
        let mut handler = AutoplayHandler::new(true);

        assert!(matches!(
            handler.attempt(&adapter).await,
            AutoplayOutcome::Blocked
        ));
    }

    #[tokio::test]
    async fn test_other_failures_are_engine_errors() {
        let engine = PolicyEngine::new(PlayBehaviour::Fail);
        let (adapter, _handle) = bound_adapter(engine).await;
        let mut handler = AutoplayHandler::new(true);

        match handler.attempt(&adapter).await {
            AutoplayOutcome::Failed(e) => assert!(e.is_engine_error()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disabled_never_touches_engine() {
        let engine = PolicyEngine::new(PlayBehaviour::Accept);
        let (adapter, _handle) = bound_adapter(engine.clone()).await;
        let mut handler = AutoplayHandler::new(false);

        assert!(matches!(
            handler.attempt(&adapter).await,
            AutoplayOutcome::Disabled
        ));
        assert!(engine.plays.lock().is_empty());
    }
}
