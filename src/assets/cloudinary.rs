use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use super::{AssetError, AssetRef, AssetStore};
use crate::config::AssetsConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Resource types tried in order when destroying an asset whose type was not
/// recorded.
const DESTROY_RESOURCE_TYPES: [&str; 2] = ["image", "video"];

/// Cloudinary upload API client using signed requests.
pub struct CloudinaryStore {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: Option<String>,
    secure_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: Option<String>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: &str, api_key: &str, api_secret: &str) -> Result<Self, AssetError> {
        let http = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            http,
        })
    }

    pub fn from_config(cfg: &AssetsConfig) -> Result<Self, AssetError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AssetError::NotConfigured(format!("assets.{} is required", name)))
        };
        Self::new(
            &required(&cfg.cloud_name, "cloud_name")?,
            &required(&cfg.api_key, "api_key")?,
            &required(&cfg.api_secret, "api_secret")?,
        )
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!("{}/{}/{}/{}", API_BASE, self.cloud_name, resource_type, action)
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, the API secret appended, hashed with SHA-256.
pub(super) fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AssetStore for CloudinaryStore {
    async fn upload(&self, path: &Path) -> Result<AssetRef, AssetError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let timestamp = Self::timestamp();
        let signature = sign(&[("timestamp", timestamp.as_str())], &self.api_secret);

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime.as_ref())?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response: UploadResponse = self
            .http
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(AssetError::Rejected(err.message));
        }
        let url = response
            .secure_url
            .or(response.url)
            .ok_or_else(|| AssetError::Rejected("upload response has no url".into()))?;
        let store_id = response
            .public_id
            .ok_or_else(|| AssetError::Rejected("upload response has no public_id".into()))?;

        Ok(AssetRef {
            url,
            store_id,
            duration: response.duration,
        })
    }

    async fn delete(&self, store_id: &str) -> Result<(), AssetError> {
        for resource_type in DESTROY_RESOURCE_TYPES {
            let timestamp = Self::timestamp();
            let signature = sign(
                &[("public_id", store_id), ("timestamp", timestamp.as_str())],
                &self.api_secret,
            );
            let params = [
                ("public_id", store_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ];

            let response: DestroyResponse = self
                .http
                .post(self.endpoint(resource_type, "destroy"))
                .form(&params)
                .send()
                .await?
                .json()
                .await?;

            if let Some(err) = response.error {
                return Err(AssetError::Rejected(err.message));
            }
            if response.result.as_deref() == Some("ok") {
                tracing::debug!("Destroyed {} {}", resource_type, store_id);
                return Ok(());
            }
        }

        Err(AssetError::Rejected(format!("asset {} not found", store_id)))
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let sig = sign(&[("timestamp", "1315060510"), ("public_id", "sample")], "abcd");
        assert_eq!(
            sig,
            "0d4fe14b2b4a3f68a97ccc5097c43908b623d24293c296826a9390c14d891509"
        );
    }

    #[test]
    fn from_config_requires_credentials() {
        let cfg = AssetsConfig {
            cloud_name: Some("demo".into()),
            api_key: None,
            api_secret: Some("secret".into()),
            ..Default::default()
        };
        assert!(matches!(
            CloudinaryStore::from_config(&cfg),
            Err(AssetError::NotConfigured(msg)) if msg.contains("api_key")
        ));
    }

    #[test]
    fn endpoint_includes_cloud_and_resource_type() {
        let store = CloudinaryStore::new("demo", "key", "secret").unwrap();
        assert_eq!(
            store.endpoint("video", "destroy"),
            "https://api.cloudinary.com/v1_1/demo/video/destroy"
        );
    }
}
