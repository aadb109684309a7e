//! External asset bridge: media files leave the process through an
//! [`AssetStore`], and entities keep only the returned URL and store id.

mod cloudinary;
mod local;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::config::{AssetProvider, Config};

pub use self::cloudinary::CloudinaryStore;
pub use self::local::LocalAssetStore;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Asset store rejected the request: {0}")]
    Rejected(String),

    #[error("Asset store is not configured: {0}")]
    NotConfigured(String),
}

/// Where an uploaded asset ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub url: String,
    pub store_id: String,
    /// Media length in seconds, when the store reports one.
    pub duration: Option<f64>,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<AssetRef, AssetError>;
    async fn delete(&self, store_id: &str) -> Result<(), AssetError>;
    fn name(&self) -> &'static str;
}

/// Build the store selected by `[assets] provider`.
pub fn from_config(config: &Config) -> Result<Arc<dyn AssetStore>, AssetError> {
    let store: Arc<dyn AssetStore> = match config.assets.provider {
        AssetProvider::Local => Arc::new(LocalAssetStore::new(
            config.media_path(),
            &config.assets.public_base_url,
        )?),
        AssetProvider::Cloudinary => Arc::new(CloudinaryStore::from_config(&config.assets)?),
    };
    tracing::info!("Asset store: {}", store.name());
    Ok(store)
}

/// A multipart file staged on local disk. The file is removed when the
/// value is dropped, whether or not it was ever uploaded.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    file_name: String,
}

impl TempUpload {
    pub async fn write(dir: &Path, file_name: &str, data: Bytes) -> Result<Self, AssetError> {
        tokio::fs::create_dir_all(dir).await?;

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let path = dir.join(format!("{}{}", uuid::Uuid::now_v7(), extension));
        tokio::fs::write(&path, &data).await?;

        Ok(Self {
            path,
            file_name: file_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the client gave the file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp upload {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Upload a staged file, then remove it from disk regardless of outcome.
pub async fn upload_temp(store: &dyn AssetStore, temp: TempUpload) -> Result<AssetRef, AssetError> {
    let result = store.upload(temp.path()).await;
    match &result {
        Ok(asset) => tracing::info!("Uploaded {} to {}", temp.file_name(), asset.url),
        Err(e) => tracing::warn!("Upload of {} failed: {}", temp.file_name(), e),
    }
    drop(temp);
    result
}

/// Extract the store id from a URL of the form `.../v<digits>/<id>.<ext>`.
/// The last version segment wins, so a base URL like `/api/v1/media` is
/// never folded into the id.
pub fn store_id_from_url(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^.*/v[0-9]+/(.+)\.[^./]+$").ok())
        .as_ref()?;
    pattern
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort removal of a stored asset. Prefers the recorded store id and
/// falls back to deriving one from the URL. Failures are logged, not returned.
pub async fn discard(store: &dyn AssetStore, store_id: Option<&str>, url: Option<&str>) {
    let id = match store_id
        .map(str::to_string)
        .or_else(|| url.and_then(store_id_from_url))
    {
        Some(id) => id,
        None => return,
    };

    if let Err(e) = store.delete(&id).await {
        tracing::warn!("Failed to delete asset {} from {}: {}", id, store.name(), e);
    }
}
