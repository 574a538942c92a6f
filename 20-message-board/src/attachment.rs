//! Turns already-uploaded asset metadata into the attachment records of a post.
//!
//! Bytes never pass through here; see [`crate::assets`] for the upload side.

use crate::{
    error::{BoardError, Result},
    post::Attachment,
};

/// Maximum attachments on one post. Extra assets are dropped, not rejected.
pub const MAX_ATTACHMENTS: usize = 4;

/// Metadata of an asset the upload collaborator has already made durable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub url: String,
}

/// Builds the attachment list for a new post, keeping at most [`MAX_ATTACHMENTS`].
pub fn resolve(assets: Vec<AssetDescriptor>) -> Result<Vec<Attachment>> {
    assets
        .into_iter()
        .take(MAX_ATTACHMENTS)
        .map(resolve_one)
        .collect()
}

fn resolve_one(asset: AssetDescriptor) -> Result<Attachment> {
    let (filename, content_type) =
        check_descriptor(asset.filename.as_deref(), asset.content_type.as_deref())?;

    Ok(Attachment {
        filename: filename.to_string(),
        url: asset.url,
        content_type: content_type.to_string(),
        size_bytes: asset.size_bytes,
    })
}

/// Rejects a descriptor without a filename or content type.
///
/// Also used by the upload path so malformed parts are refused before any
/// bytes are written.
pub fn check_descriptor<'a>(
    filename: Option<&'a str>,
    content_type: Option<&'a str>,
) -> Result<(&'a str, &'a str)> {
    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BoardError::Resolution("attachment is missing a filename".into()))?;

    let content_type = content_type
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| {
            BoardError::Resolution(format!("attachment '{filename}' is missing a content type"))
        })?;

    Ok((filename, content_type))
}
