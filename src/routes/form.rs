use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Request};

use crate::assets::{self, AssetRef, AssetStore, TempUpload};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// A multipart body with text fields in memory and file parts staged as
/// [`TempUpload`]s in the uploads directory. Files not taken by the handler
/// are removed when the form is dropped.
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}

impl FromRequest<AppState> for UploadForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let upload_dir = state.config.uploads_path();
        let mut fields = HashMap::new();
        let mut files = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = match field.name() {
                Some(name) => name.to_string(),
                None => continue,
            };

            let file_name = field.file_name().map(str::to_string);
            match file_name {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    // Browsers send an empty part for an unset file input.
                    if data.is_empty() {
                        continue;
                    }
                    let temp = TempUpload::write(&upload_dir, &file_name, data).await?;
                    files.insert(name, temp);
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    fields.insert(name, value);
                }
            }
        }

        Ok(Self { fields, files })
    }
}

/// Assets uploaded while handling one request. Finish with [`Uploaded::keep`]
/// once the owning entity is stored, or [`Uploaded::rollback`] to discard them.
pub struct Uploaded {
    store: Arc<dyn AssetStore>,
    refs: Vec<AssetRef>,
}

impl Uploaded {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            refs: Vec::new(),
        }
    }

    /// Upload a staged file, mapping store failures to a 500 with `what`
    /// naming the asset.
    pub async fn push(&mut self, temp: TempUpload, what: &str) -> AppResult<AssetRef> {
        let asset = assets::upload_temp(self.store.as_ref(), temp)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to upload {}: {}", what, e)))?;
        self.refs.push(asset.clone());
        Ok(asset)
    }

    /// Entity creation failed: remove every uploaded asset.
    pub async fn rollback(mut self) {
        for asset in std::mem::take(&mut self.refs) {
            assets::discard(self.store.as_ref(), Some(&asset.store_id), Some(&asset.url)).await;
        }
    }

    pub fn keep(mut self) {
        self.refs.clear();
    }
}

impl Drop for Uploaded {
    fn drop(&mut self) {
        if !self.refs.is_empty() {
            tracing::warn!(
                "{} uploaded asset(s) neither kept nor rolled back",
                self.refs.len()
            );
        }
    }
}
