//! # Player Driver
//!
//! The single task that owns a [`PlaybackSession`]. It reacts to three
//! sources and nothing else mutates the session:
//!
//! - user commands sent through a [`PlayerHandle`],
//! - fetch outcomes from the [`FetchController`],
//! - engine events from the bound resource.
//!
//! After each step the driver diffs the session snapshot against the last
//! published one and emits the corresponding [`PlaybackEvent`]s on the
//! [`EventBus`].

use bridge_traits::{
    engine_event_channel, EngineEvent, EngineEventReceiver, MediaEngine, ResourceProvider,
    TaggedEngineEvent,
};
use core_runtime::config::{PlayerConfig, SynthesisEngine};
use core_runtime::events::{CoreEvent, EventBus, EventStream, FetchEvent, PlaybackEvent};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::autoplay::{AutoplayHandler, AutoplayOutcome};
use crate::download::DownloadExporter;
use crate::engine::EngineAdapter;
use crate::error::{PlaybackError, Result};
use crate::fetch::{Admission, FetchController, FetchOutcome, SynthesisClient};
use crate::progress::to_percent;
use crate::session::{EngineEffect, PlaybackSession};
use crate::state::{PlaybackSnapshot, PlaybackStatus, RequestKey};
use crate::transport::TransportController;

const COMMAND_BUFFER: usize = 32;

/// Commands accepted by the driver. Each carries an acknowledgement sent
/// once the command has been applied.
#[derive(Debug)]
pub enum PlayerCommand {
    SetRequest {
        key: RequestKey,
        ack: oneshot::Sender<()>,
    },
    TogglePlay {
        ack: oneshot::Sender<()>,
    },
    Seek {
        fraction: f64,
        ack: oneshot::Sender<()>,
    },
    Restart {
        ack: oneshot::Sender<()>,
    },
    SetVolume {
        volume: f32,
        ack: oneshot::Sender<()>,
    },
    ToggleMute {
        ack: oneshot::Sender<()>,
    },
    Download {
        ack: oneshot::Sender<Result<Option<PathBuf>>>,
    },
    Snapshot {
        ack: oneshot::Sender<PlaybackSnapshot>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable front end of a running driver.
///
/// Guarded controls that do not apply in the current status are ignored and
/// still return `Ok(())`. Every method fails with
/// [`PlaybackError::DriverClosed`] once the driver has stopped.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    events: EventBus,
}

impl PlayerHandle {
    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand) -> Result<T> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(command(ack))
            .await
            .map_err(|_| PlaybackError::DriverClosed)?;
        done.await.map_err(|_| PlaybackError::DriverClosed)
    }

    /// Replace the request key. A changed key starts a new fetch; an
    /// incomplete key returns the player to `idle`.
    pub async fn set_request(&self, key: RequestKey) -> Result<()> {
        self.call(|ack| PlayerCommand::SetRequest { key, ack }).await
    }

    pub async fn toggle_play(&self) -> Result<()> {
        self.call(|ack| PlayerCommand::TogglePlay { ack }).await
    }

    /// Seek to a fraction of the duration, e.g. the click position on a
    /// progress track divided by its width.
    pub async fn seek(&self, fraction: f64) -> Result<()> {
        self.call(|ack| PlayerCommand::Seek { fraction, ack }).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.call(|ack| PlayerCommand::Restart { ack }).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.call(|ack| PlayerCommand::SetVolume { volume, ack }).await
    }

    pub async fn toggle_mute(&self) -> Result<()> {
        self.call(|ack| PlayerCommand::ToggleMute { ack }).await
    }

    /// Export the current payload. `None` when there is nothing to export.
    pub async fn download(&self) -> Result<Option<PathBuf>> {
        self.call(|ack| PlayerCommand::Download { ack }).await?
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot> {
        self.call(|ack| PlayerCommand::Snapshot { ack }).await
    }

    /// Stop the driver, releasing every resource it holds.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|ack| PlayerCommand::Shutdown { ack }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}

pub struct PlayerDriver {
    session: PlaybackSession,
    fetch: FetchController,
    outcomes: mpsc::UnboundedReceiver<FetchOutcome>,
    transport: TransportController,
    autoplay: AutoplayHandler,
    engine_events: EngineEventReceiver,
    commands: mpsc::Receiver<PlayerCommand>,
    events: EventBus,
    published: PlaybackSnapshot,
    default_language: String,
    engine_preference: Option<SynthesisEngine>,
}

impl PlayerDriver {
    pub fn new(
        config: &PlayerConfig,
        engine: Arc<dyn MediaEngine>,
        resources: Arc<dyn ResourceProvider>,
        synthesis: Arc<dyn SynthesisClient>,
        events: EventBus,
    ) -> (Self, PlayerHandle) {
        let (fetch, outcomes) = FetchController::new(synthesis, resources, Arc::clone(&config.clock));
        let (engine_sender, engine_events) = engine_event_channel();
        let exporter = DownloadExporter::new(
            Arc::clone(&config.file_system),
            config.download_dir.clone(),
            Arc::clone(&config.clock),
        );
        let transport =
            TransportController::new(EngineAdapter::new(engine, engine_sender), exporter);
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);

        let session = PlaybackSession::new(config.initial_volume);
        let published = session.snapshot();

        let driver = Self {
            session,
            fetch,
            outcomes,
            transport,
            autoplay: AutoplayHandler::new(config.auto_play),
            engine_events,
            commands,
            events: events.clone(),
            published,
            default_language: config.language.clone(),
            engine_preference: config.engine_preference,
        };
        let handle = PlayerHandle {
            commands: tx,
            events,
        };

        (driver, handle)
    }

    /// Run the driver on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(tracing::info_span!("player_driver")))
    }

    pub async fn run(mut self) {
        info!(auto_play = self.autoplay.is_enabled(), "Player driver started");
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown { ack }) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(outcome) = self.outcomes.recv() => self.handle_outcome(outcome).await,
                Some(event) = self.engine_events.next() => self.handle_engine_event(event).await,
            }
        }

        self.teardown().await;
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::SetRequest { key, ack } => {
                self.set_request(key).await;
                let _ = ack.send(());
            }
            PlayerCommand::TogglePlay { ack } => {
                let result = self.transport.toggle_play(&mut self.session).await;
                self.settle("toggle_play", result).await;
                let _ = ack.send(());
            }
            PlayerCommand::Seek { fraction, ack } => {
                let result = self
                    .transport
                    .seek_to_fraction(&mut self.session, fraction)
                    .await;
                self.settle("seek", result).await;
                let _ = ack.send(());
            }
            PlayerCommand::Restart { ack } => {
                let result = self.transport.restart(&mut self.session).await;
                self.settle("restart", result).await;
                let _ = ack.send(());
            }
            PlayerCommand::SetVolume { volume, ack } => {
                let result = self.transport.set_volume(&mut self.session, volume).await;
                self.settle("set_volume", result).await;
                let _ = ack.send(());
            }
            PlayerCommand::ToggleMute { ack } => {
                let result = self.transport.toggle_mute(&mut self.session).await;
                self.settle("toggle_mute", result).await;
                let _ = ack.send(());
            }
            PlayerCommand::Download { ack } => {
                let result = self.download().await;
                let _ = ack.send(result);
            }
            PlayerCommand::Snapshot { ack } => {
                let _ = ack.send(self.session.snapshot());
            }
            PlayerCommand::Shutdown { ack } => {
                // Handled by the run loop.
                let _ = ack.send(());
            }
        }
    }

    fn complete_key(&self, mut key: RequestKey) -> RequestKey {
        if key.language.trim().is_empty() {
            key.language = self.default_language.clone();
        }
        if key.engine.is_none() {
            key.engine = self.engine_preference;
        }
        key
    }

    async fn set_request(&mut self, key: RequestKey) {
        if !key.is_fetchable() {
            if let Some(ticket) = self.fetch.invalidate() {
                debug!(request_id = ticket.generation, "In-flight request invalidated");
            }
            debug!("Request key incomplete, player idle");
            self.transport.unbind().await;
            self.session.clear();
            self.autoplay.reset();
            self.publish();
            return;
        }

        let key = self.complete_key(key);
        if let Some(active) = self.session.request() {
            if active.key == key && self.session.status() != PlaybackStatus::Error {
                trace!(request_id = active.generation, "Request key unchanged");
                return;
            }
        }

        // Release before replace: detach the engine, then drop the asset.
        self.transport.unbind().await;
        let language = key.language.clone();
        let text_chars = key.text.chars().count();
        let ticket = self.fetch.request(key.clone());
        self.session.begin_loading(ticket.generation, key);
        self.autoplay.reset();

        self.emit(CoreEvent::Fetch(FetchEvent::Requested {
            request_id: ticket.generation,
            language,
            text_chars,
        }));
        self.publish();
    }

    async fn handle_outcome(&mut self, outcome: FetchOutcome) {
        match self.fetch.admit(outcome) {
            Admission::Stale {
                generation,
                superseded_by,
            } => {
                self.emit(CoreEvent::Fetch(FetchEvent::Discarded {
                    request_id: generation,
                    superseded_by,
                }));
            }
            Admission::Current(FetchOutcome::Completed { ticket, asset }) => {
                self.emit(CoreEvent::Fetch(FetchEvent::Completed {
                    request_id: ticket.generation,
                    size_bytes: asset.size() as u64,
                    media_type: asset.media_type().to_string(),
                }));

                self.session.install_asset(asset);
                self.publish();

                if let Some(handle) = self.session.reference() {
                    if let Err(e) = self.transport.bind(handle, &self.session).await {
                        self.fail_engine(e).await;
                        return;
                    }
                }

                self.autoplay_once().await;
            }
            Admission::Current(FetchOutcome::Failed { ticket, error }) => {
                error!(
                    request_id = ticket.generation,
                    error = %error,
                    "Synthesis request failed"
                );
                let message = error.user_message();
                self.session.fail(message);
                self.emit(CoreEvent::Fetch(FetchEvent::Failed {
                    request_id: ticket.generation,
                    message: message.to_string(),
                }));
                self.emit(CoreEvent::Playback(PlaybackEvent::Error {
                    request_id: Some(ticket.generation),
                    message: message.to_string(),
                    recoverable: true,
                }));
                self.publish();
            }
        }
    }

    async fn autoplay_once(&mut self) {
        match self.autoplay.attempt(self.transport.adapter()).await {
            AutoplayOutcome::Blocked => {
                if let Some(request_id) = self.session.request_id() {
                    self.emit(CoreEvent::Playback(PlaybackEvent::AutoplayBlocked {
                        request_id,
                    }));
                }
            }
            AutoplayOutcome::Failed(e) => self.settle("autoplay", Err::<(), _>(e)).await,
            AutoplayOutcome::Started
            | AutoplayOutcome::Disabled
            | AutoplayOutcome::AlreadyAttempted => {}
        }
    }

    async fn handle_engine_event(&mut self, tagged: TaggedEngineEvent) {
        if !self.transport.adapter().is_current(&tagged) {
            debug!(
                resource = %tagged.resource,
                event = tagged.event.name(),
                "Dropping event from superseded resource"
            );
            return;
        }

        trace!(event = tagged.event.name(), "Engine event");
        if self.session.apply_engine_event(&tagged.event) == EngineEffect::Failed {
            let detail = match tagged.event {
                EngineEvent::Error { message } => message,
                other => other.name().to_string(),
            };
            self.fail_engine(PlaybackError::Engine(detail)).await;
            return;
        }
        self.publish();
    }

    async fn download(&mut self) -> Result<Option<PathBuf>> {
        match self.transport.download(&self.session).await {
            Ok(path) => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let size_bytes = self.session.asset().map(|a| a.size() as u64).unwrap_or(0);
                self.emit(CoreEvent::Playback(PlaybackEvent::Downloaded {
                    file_name,
                    size_bytes,
                }));
                Ok(Some(path))
            }
            Err(PlaybackError::InvalidOperation(reason)) => {
                debug!(reason = %reason, "Download ignored");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Download failed");
                Err(e)
            }
        }
    }

    /// Route the result of a control through the error policy and publish.
    async fn settle<T>(&mut self, op: &'static str, result: Result<T>) {
        match result {
            Ok(_) => {}
            Err(PlaybackError::InvalidOperation(reason)) => {
                debug!(op, reason = %reason, "Control ignored");
            }
            Err(PlaybackError::AutoplayBlocked(reason)) => {
                warn!(op, reason = %reason, "Playback refused by platform policy");
                if let Some(request_id) = self.session.request_id() {
                    self.emit(CoreEvent::Playback(PlaybackEvent::AutoplayBlocked {
                        request_id,
                    }));
                }
            }
            Err(e) if e.is_user_visible() => {
                warn!(op, error = %e, "Playback engine failure");
                self.fail_engine(e).await;
            }
            Err(e) => {
                warn!(op, error = %e, "Control failed");
            }
        }
        self.publish();
    }

    async fn fail_engine(&mut self, error: PlaybackError) {
        error!(error = %error, "Playback failed");
        self.transport.unbind().await;
        self.session.fail(error.user_message());
        self.emit_error(error.user_message());
        self.publish();
    }

    async fn teardown(&mut self) {
        self.fetch.shutdown();
        self.transport.unbind().await;
        self.session.teardown();
        self.publish();
        info!("Player driver stopped");
    }

    fn emit_error(&self, message: &str) {
        self.emit(CoreEvent::Playback(PlaybackEvent::Error {
            request_id: self.session.request_id(),
            message: message.to_string(),
            recoverable: true,
        }));
    }

    fn emit(&self, event: CoreEvent) {
        if self.events.emit(event).is_err() {
            trace!("No event subscribers");
        }
    }

    /// Emit events for everything that changed since the last publish.
    fn publish(&mut self) {
        let next = self.session.snapshot();
        let prev = &self.published;
        let request_id = next.request_id.or(prev.request_id).unwrap_or(0);
        let mut pending = Vec::new();

        if next.status != prev.status {
            info!(request_id, from = %prev.status, to = %next.status, "Playback status changed");
            pending.push(PlaybackEvent::StatusChanged {
                request_id,
                from: prev.status.to_string(),
                to: next.status.to_string(),
            });
        }

        if progress_of(&next) != progress_of(prev) {
            let (position_ms, duration_ms, playback_percent, buffered_percent) = progress_of(&next);
            pending.push(PlaybackEvent::ProgressChanged {
                request_id,
                position_ms,
                duration_ms,
                playback_percent,
                buffered_percent,
            });
        }

        if next.volume != prev.volume || next.muted != prev.muted {
            pending.push(PlaybackEvent::VolumeChanged {
                volume_percent: to_percent(f64::from(next.volume)),
                muted: next.muted,
            });
        }

        self.published = next;
        for event in pending {
            self.emit(CoreEvent::Playback(event));
        }
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn progress_of(snapshot: &PlaybackSnapshot) -> (u64, Option<u64>, u8, u8) {
    (
        seconds_to_ms(snapshot.current_time),
        snapshot.duration.map(seconds_to_ms),
        snapshot.playback_percent,
        snapshot.buffered_percent,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_ms_rounds() {
        assert_eq!(seconds_to_ms(1.2345), 1235);
        assert_eq!(seconds_to_ms(-1.0), 0);
        assert_eq!(seconds_to_ms(5.0), 5000);
    }

    #[test]
    fn test_progress_tuple_tracks_percentages() {
        let snapshot = PlaybackSnapshot {
            request_id: Some(1),
            status: PlaybackStatus::Playing,
            current_time: 2.5,
            duration: Some(10.0),
            buffered_percent: 100,
            playback_percent: 25,
            volume: 1.0,
            muted: false,
            error_message: None,
            controls_enabled: true,
            can_download: true,
        };
        assert_eq!(progress_of(&snapshot), (2500, Some(10_000), 25, 100));
    }
}
