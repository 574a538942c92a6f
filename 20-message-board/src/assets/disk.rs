use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::info;

use super::AssetSink;
use crate::error::{BoardError, Result};

/// URL path the server mounts the upload directory under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Writes attachments to a local directory served back by the board itself.
pub struct DiskSink {
    root: PathBuf,
    public_base: String,
}

impl DiskSink {
    pub async fn create(root: impl Into<PathBuf>, public_base: &str) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|err| {
            BoardError::Upload(format!("cannot create {}: {err}", root.display()))
        })?;

        info!(root = %root.display(), "storing attachments on disk");
        Ok(Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetSink for DiskSink {
    async fn put(&self, object_name: &str, _content_type: &str, bytes: Bytes) -> Result<String> {
        let path = self.root.join(object_name);
        let to_upload_error =
            |err: std::io::Error| BoardError::Upload(format!("{}: {err}", path.display()));

        let mut file = fs::File::create(&path).await.map_err(to_upload_error)?;
        file.write_all(&bytes).await.map_err(to_upload_error)?;
        file.sync_all().await.map_err(to_upload_error)?;

        Ok(format!("{}{UPLOADS_ROUTE}/{object_name}", self.public_base))
    }
}
