//! # Media Type Detection
//!
//! Decides the media type of a synthesized payload and the file extension used
//! when exporting it.
//!
//! The response `Content-Type` wins when it names an audio type. When it is
//! missing or generic (`application/octet-stream`), the first bytes of the
//! payload are inspected:
//!
//! | Magic bytes                  | Media type   |
//! |------------------------------|--------------|
//! | `ID3` or MPEG frame sync     | `audio/mpeg` |
//! | `RIFF....WAVE`               | `audio/wav`  |
//! | `OggS`                       | `audio/ogg`  |
//! | `fLaC`                       | `audio/flac` |
//! | `....ftyp`                   | `audio/mp4`  |

use tracing::debug;

/// Media type used when nothing better is known.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Map aliases onto one canonical media type. Parameters are stripped.
pub fn normalize_media_type(media_type: &str) -> String {
    let base = media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase();

    match base.as_str() {
        "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" => "audio/mpeg".to_string(),
        "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "audio/wav".to_string(),
        "audio/x-flac" => "audio/flac".to_string(),
        "audio/x-m4a" | "audio/m4a" => "audio/mp4".to_string(),
        "application/ogg" | "audio/vorbis" | "audio/opus" => "audio/ogg".to_string(),
        _ => base,
    }
}

/// Identify the payload container from its leading bytes.
pub fn sniff_media_type(payload: &[u8]) -> Option<&'static str> {
    if payload.starts_with(b"ID3") {
        return Some("audio/mpeg");
    }
    if payload.len() >= 12 && &payload[0..4] == b"RIFF" && &payload[8..12] == b"WAVE" {
        return Some("audio/wav");
    }
    if payload.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if payload.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if payload.len() >= 8 && &payload[4..8] == b"ftyp" {
        return Some("audio/mp4");
    }
    // MPEG audio frame sync: 11 set bits.
    if payload.len() >= 2 && payload[0] == 0xFF && payload[1] & 0xE0 == 0xE0 {
        return Some("audio/mpeg");
    }
    None
}

/// Resolve the media type from the response header and the payload.
pub fn detect_media_type(content_type: Option<&str>, payload: &[u8]) -> String {
    if let Some(declared) = content_type.map(normalize_media_type) {
        if declared.starts_with("audio/") {
            return declared;
        }
    }

    match sniff_media_type(payload) {
        Some(sniffed) => {
            debug!(declared = ?content_type, sniffed, "Media type sniffed from payload");
            sniffed.to_string()
        }
        None => UNKNOWN_MEDIA_TYPE.to_string(),
    }
}

/// File extension for an exported payload.
pub fn extension_for(media_type: &str) -> &'static str {
    match normalize_media_type(media_type).as_str() {
        "audio/mpeg" => "mp3",
        "audio/wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/mp4" | "audio/aac" => "m4a",
        _ => "bin",
    }
}

/// Probe the payload's duration in seconds. `None` if the container does not
/// declare a frame count.
#[cfg(feature = "headless-engine")]
pub fn probe_duration(payload: bytes::Bytes, media_type: &str) -> Option<f64> {
    use symphonia::core::codecs::CODEC_TYPE_NULL;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mut hint = Hint::new();
    hint.mime_type(media_type);
    hint.with_extension(extension_for(media_type));

    let source = MediaSourceStream::new(Box::new(std::io::Cursor::new(payload)), Default::default());
    let probed = match symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(probed) => probed,
        Err(e) => {
            debug!(error = %e, media_type, "Duration probe failed");
            return None;
        }
    };

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)?;

    let frames = track.codec_params.n_frames?;
    let sample_rate = track.codec_params.sample_rate?;
    if sample_rate == 0 {
        return None;
    }

    Some(frames as f64 / sample_rate as f64)
}
