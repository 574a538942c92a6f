//! Attachment upload collaborators.
//!
//! An [`AssetSink`] makes the bytes of one file durable and returns a public
//! URL for it. [`upload_all`] runs every upload of a request concurrently
//! and only returns descriptors when all of them succeeded, so a post is
//! never created with a link to a missing file.

use async_trait::async_trait;
use axum::body::Bytes;
use futures::future::try_join_all;
use nanoid::nanoid;
use tracing::debug;

use crate::{
    attachment::{self, AssetDescriptor},
    error::Result,
};

pub mod disk;
pub mod gcs;

pub use disk::DiskSink;
pub use gcs::GcsSink;

/// One file part of an inbound create request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[async_trait]
pub trait AssetSink: Send + Sync {
    /// Stores `bytes` under `object_name` and returns the public URL once durable.
    async fn put(&self, object_name: &str, content_type: &str, bytes: Bytes) -> Result<String>;
}

/// Uploads every file, failing the whole batch if any descriptor is malformed
/// (before any bytes move) or any single upload fails.
pub async fn upload_all(
    sink: &dyn AssetSink,
    uploads: Vec<Upload>,
) -> Result<Vec<AssetDescriptor>> {
    for upload in &uploads {
        attachment::check_descriptor(upload.filename.as_deref(), upload.content_type.as_deref())?;
    }

    try_join_all(uploads.into_iter().map(|upload| upload_one(sink, upload))).await
}

async fn upload_one(sink: &dyn AssetSink, upload: Upload) -> Result<AssetDescriptor> {
    let (filename, content_type) =
        attachment::check_descriptor(upload.filename.as_deref(), upload.content_type.as_deref())?;

    let size_bytes = upload.bytes.len() as u64;
    let object = object_name(filename);
    let url = sink.put(&object, content_type, upload.bytes.clone()).await?;

    debug!(%object, size_bytes, "attachment stored");
    Ok(AssetDescriptor {
        filename: Some(filename.to_string()),
        content_type: Some(content_type.to_string()),
        size_bytes,
        url,
    })
}

/// Unique, URL-safe object name that still shows the original filename.
pub fn object_name(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}-{}", nanoid!(10), safe)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::error::BoardError;

    struct CountingSink {
        stored: Arc<AtomicUsize>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl AssetSink for CountingSink {
        async fn put(&self, object_name: &str, _: &str, _: Bytes) -> Result<String> {
            if self.fail_on.is_some_and(|name| object_name.ends_with(name)) {
                return Err(BoardError::Upload("bucket refused".into()));
            }
            self.stored.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.test/{object_name}"))
        }
    }

    fn upload(name: &str) -> Upload {
        Upload {
            filename: Some(name.to_string()),
            content_type: Some("text/plain".to_string()),
            bytes: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn object_names_are_unique_and_url_safe() {
        let first = object_name("my photo (1).png");
        let second = object_name("my photo (1).png");

        assert!(first.ends_with("-my_photo__1_.png"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn descriptors_carry_size_and_url() {
        let sink = CountingSink {
            stored: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
        };

        let descriptors = upload_all(&sink, vec![upload("a.txt"), upload("b.txt")])
            .await
            .expect("uploads");

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].size_bytes, 5);
        assert_eq!(descriptors[1].filename.as_deref(), Some("b.txt"));
        assert!(descriptors[1].url.starts_with("https://cdn.test/"));
    }

    #[tokio::test]
    async fn one_failed_upload_fails_the_batch() {
        let sink = CountingSink {
            stored: Arc::new(AtomicUsize::new(0)),
            fail_on: Some("bad.txt"),
        };

        let result = upload_all(&sink, vec![upload("a.txt"), upload("bad.txt")]).await;
        assert!(matches!(result, Err(BoardError::Upload(_))));
    }

    #[tokio::test]
    async fn malformed_part_uploads_nothing() {
        let stored = Arc::new(AtomicUsize::new(0));
        let sink = CountingSink {
            stored: Arc::clone(&stored),
            fail_on: None,
        };
        let mut nameless = upload("x");
        nameless.filename = None;

        let result = upload_all(&sink, vec![upload("a.txt"), nameless]).await;

        assert!(matches!(result, Err(BoardError::Resolution(_))));
        assert_eq!(stored.load(Ordering::SeqCst), 0);
    }
}
