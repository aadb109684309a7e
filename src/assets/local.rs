use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{AssetError, AssetRef, AssetStore};

/// Keeps assets in a local directory and hands out URLs shaped like a CDN's:
/// `<public_base_url>/v<unix-seconds>/<id>.<ext>`.
pub struct LocalAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalAssetStore {
    pub fn new(root: PathBuf, public_base_url: &str) -> Result<Self, AssetError> {
        let parsed = url::Url::parse(public_base_url).map_err(|e| {
            AssetError::NotConfigured(format!(
                "assets.public_base_url {:?} is not a valid URL: {}",
                public_base_url, e
            ))
        })?;
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            public_base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn check_id(store_id: &str) -> Result<(), AssetError> {
        let valid = !store_id.is_empty()
            && store_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(AssetError::Rejected(format!("invalid asset id {:?}", store_id)))
        }
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, path: &Path) -> Result<AssetRef, AssetError> {
        let store_id = uuid::Uuid::now_v7().simple().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let file_name = format!("{}.{}", store_id, extension);

        tokio::fs::copy(path, self.root.join(&file_name)).await?;

        let version = chrono::Utc::now().timestamp();
        Ok(AssetRef {
            url: format!("{}/v{}/{}", self.public_base_url, version, file_name),
            store_id,
            duration: None,
        })
    }

    async fn delete(&self, store_id: &str) -> Result<(), AssetError> {
        Self::check_id(store_id)?;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(store_id) {
                tokio::fs::remove_file(&path).await?;
                return Ok(());
            }
        }

        Err(AssetError::Rejected(format!("asset {} not found", store_id)))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
