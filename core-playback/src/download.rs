//! Export of the raw synthesized payload.
//!
//! Files are named `tts_{language}_{unix_ms}.{ext}` and written through the
//! [`FileSystemAccess`] bridge.

use bridge_traits::{Clock, FileSystemAccess};
use core_runtime::logging::strip_path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PlaybackError, Result};
use crate::format::extension_for;
use crate::resource::AudioAsset;

/// Language segment of a file name. Anything outside `[A-Za-z0-9_-]` is
/// dropped; an empty result becomes `auto`.
pub fn sanitize_language(language: &str) -> String {
    let cleaned: String = language
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if cleaned.is_empty() {
        "auto".to_string()
    } else {
        cleaned
    }
}

pub fn download_file_name(language: &str, unix_ms: i64, media_type: &str) -> String {
    format!(
        "tts_{}_{}.{}",
        sanitize_language(language),
        unix_ms,
        extension_for(media_type)
    )
}

/// Writes payloads into the download directory.
pub struct DownloadExporter {
    file_system: Arc<dyn FileSystemAccess>,
    directory: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl DownloadExporter {
    /// `directory` overrides the bridge's download directory.
    pub fn new(
        file_system: Arc<dyn FileSystemAccess>,
        directory: Option<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            file_system,
            directory,
            clock,
        }
    }

    async fn target_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => {
                self.file_system
                    .create_dir_all(dir)
                    .await
                    .map_err(|e| PlaybackError::Download(e.to_string()))?;
                Ok(dir.clone())
            }
            None => self
                .file_system
                .get_download_directory()
                .await
                .map_err(|e| PlaybackError::Download(e.to_string())),
        }
    }

    /// Write `asset`'s payload and return the path written.
    pub async fn export(&self, asset: &AudioAsset, language: &str) -> Result<PathBuf> {
        let dir = self.target_directory().await?;
        let file_name = download_file_name(
            language,
            self.clock.unix_timestamp_millis(),
            asset.media_type(),
        );
        let path = dir.join(&file_name);

        debug!(
            file = %strip_path(&path.to_string_lossy()),
            size = asset.size(),
            "Exporting audio payload"
        );
        self.file_system
            .write_file(&path, asset.payload().clone())
            .await
            .map_err(|e| PlaybackError::Download(e.to_string()))?;

        info!(file_name = %file_name, size = asset.size(), "Audio downloaded");
        Ok(path)
    }
}
