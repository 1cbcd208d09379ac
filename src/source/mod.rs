//! Input acquisition: local files and remote share links.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bytes::Bytes;

use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

pub mod detect;
pub mod remote;
pub mod share_link;

pub use detect::{ContainerFormat, detect_container, has_mp3_signature};
pub use remote::{DriveFetcher, DriveFetcherOpts, MediaFetcher, acquire_remote};
pub use share_link::extract_resource_id;

/// A source video held in memory.
#[derive(Clone, Debug)]
pub struct MediaInput {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl MediaInput {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where a source video comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Remote(String),
}

/// Validate a user-provided file and settle its media type.
///
/// The file must be non-empty, within `max_bytes`, and recognizably audio/video: by its declared
/// type, its leading bytes, or its extension (in that order).
pub fn validate_local(
    name: &str,
    declared_type: Option<&str>,
    bytes: Bytes,
    max_bytes: u64,
) -> Mp3ifyResult<MediaInput> {
    if bytes.is_empty() {
        return Err(Mp3ifyError::invalid_input(format!("'{name}' is empty")));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(Mp3ifyError::invalid_input(format!(
            "'{name}' is {} bytes, larger than the {max_bytes} byte limit",
            bytes.len()
        )));
    }

    let content_type = match declared_type.filter(|t| detect::is_media_mime(t)) {
        Some(t) => t.to_string(),
        None => detect_container(&bytes)
            .mime()
            .or_else(|| detect::mime_from_extension(name))
            .ok_or_else(|| {
                Mp3ifyError::invalid_input(format!("'{name}' is not a recognized media file"))
            })?
            .to_string(),
    };

    Ok(MediaInput::new(name, content_type, bytes))
}

/// Read and validate a local file.
pub async fn read_local(path: &Path, max_bytes: u64) -> Mp3ifyResult<MediaInput> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat '{}'", path.display()))?;
    if meta.len() > max_bytes {
        return Err(Mp3ifyError::invalid_input(format!(
            "'{}' is {} bytes, larger than the {max_bytes} byte limit",
            path.display(),
            meta.len()
        )));
    }
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    validate_local(&name, None, Bytes::from(data), max_bytes)
}
