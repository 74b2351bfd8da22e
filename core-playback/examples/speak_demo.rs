//! # Speech Playback Example
//!
//! Drives the player on the headless engine and prints every published event
//! until playback ends, then exports the audio.
//!
//! Offline, a generated tone stands in for the synthesis service. Point it at
//! a real endpoint with `TTS_ENDPOINT` and `TTS_TOKEN`.
//!
//! Run with: `cargo run --example speak_demo --package core-playback`

use anyhow::Context;
use async_trait::async_trait;
use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
use bridge_traits::LogLevel;
use bytes::Bytes;
use core_playback::{
    HeadlessEngine, HeadlessResourceStore, HttpSynthesisClient, PlayerDriver, RequestKey,
    SynthesisClient, SynthesizedAudio,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;

/// Stand-in synthesis: a short sine tone as 16-bit mono WAV.
struct ToneSynthesis;

#[async_trait]
impl SynthesisClient for ToneSynthesis {
    async fn synthesize(&self, key: &RequestKey) -> core_playback::Result<SynthesizedAudio> {
        let sample_rate = 16_000u32;
        // Roughly a tenth of a second per character, at least one second.
        let frames = (sample_rate as usize * key.text.chars().count() / 10).max(sample_rate as usize);

        let mut pcm = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f64 / sample_rate as f64;
            let sample = ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.3 * i16::MAX as f64) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        let mut wav = Vec::with_capacity(44 + pcm.len());
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        wav.extend_from_slice(&pcm);

        Ok(SynthesizedAudio {
            payload: Bytes::from(wav),
            media_type: "audio/wav".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let endpoint = std::env::var("TTS_ENDPOINT").ok();
    let token = std::env::var("TTS_TOKEN").unwrap_or_else(|_| "demo-token".to_string());
    let export_dir = std::env::temp_dir().join("speech-playback-demo");

    let config = PlayerConfig::builder()
        .endpoint(endpoint.clone().unwrap_or_else(|| "http://localhost:5000/speak".to_string()))
        .language("en")
        .http_client(Arc::new(ReqwestHttpClient::new()?))
        .file_system(Arc::new(TokioFileSystem::with_download_directory(export_dir)))
        .build()
        .context("invalid player configuration")?;

    let synthesis: Arc<dyn SynthesisClient> = match endpoint {
        Some(_) => Arc::new(HttpSynthesisClient::from_config(&config)),
        None => Arc::new(ToneSynthesis),
    };

    let store = Arc::new(HeadlessResourceStore::new());
    let engine = Arc::new(HeadlessEngine::new(store.clone()).with_rate(4.0));
    let (driver, player) = PlayerDriver::new(
        &config,
        engine,
        store,
        synthesis,
        EventBus::new(config.event_buffer_size),
    );
    let task = driver.spawn();
    let mut events = player.subscribe();

    player
        .set_request(RequestKey::new(
            "Hello from the speech playback core.",
            "en",
            token,
        ))
        .await?;

    let finished = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await?;
            println!("[{:?}] {}: {:?}", event.severity(), event.description(), event);
            match event {
                CoreEvent::Playback(PlaybackEvent::StatusChanged { to, .. })
                    if to == "ended" || to == "error" =>
                {
                    return Ok::<_, anyhow::Error>(to);
                }
                _ => {}
            }
        }
    })
    .await
    .context("playback did not finish in time")??;

    if finished == "ended" {
        if let Some(path) = player.download().await? {
            println!("Exported audio to {}", path.display());
        }
    }

    player.shutdown().await?;
    task.await?;
    Ok(())
}
