use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Url, header};
use tracing::{debug, info};

use super::MediaInput;
use super::share_link::extract_resource_id;
use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

/// Name given to every remotely fetched input.
pub const DOWNLOADED_FILE_NAME: &str = "downloaded_video.mp4";

/// Fetches a remote file by resource identifier.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, resource_id: &str) -> Mp3ifyResult<MediaInput>;
}

/// Resolve a share link and fetch it. Links that do not match are rejected before any request.
pub async fn acquire_remote(fetcher: &dyn MediaFetcher, share_url: &str) -> Mp3ifyResult<MediaInput> {
    let id = extract_resource_id(share_url)?;
    debug!(resource_id = id, "fetching remote input");
    fetcher.fetch(id).await
}

#[derive(Clone, Debug)]
pub struct DriveFetcherOpts {
    /// Scheme and host of the storage API, e.g. `https://www.googleapis.com`.
    pub api_base: String,
    /// Access credential appended as the `key` query parameter. Held server-side only.
    pub api_key: Option<String>,
    pub max_bytes: u64,
}

/// Storage content API client (`GET /drive/v3/files/<id>?alt=media&key=<key>`).
pub struct DriveFetcher {
    client: Client,
    opts: DriveFetcherOpts,
}

impl DriveFetcher {
    pub fn new(opts: DriveFetcherOpts) -> Self {
        Self {
            client: Client::new(),
            opts,
        }
    }

    pub fn download_url(&self, resource_id: &str) -> Mp3ifyResult<Url> {
        let mut url = Url::parse(&self.opts.api_base).map_err(|e| {
            Mp3ifyError::config(format!("invalid storage api base '{}': {e}", self.opts.api_base))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Mp3ifyError::config(format!(
                    "storage api base '{}' cannot carry a path",
                    self.opts.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["drive", "v3", "files", resource_id]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(key) = self.opts.api_key.as_deref() {
                query.append_pair("key", key);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl MediaFetcher for DriveFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, resource_id: &str) -> Mp3ifyResult<MediaInput> {
        let url = self.download_url(resource_id)?;

        let mut resp = self.client.get(url).send().await.map_err(|e| {
            // Strip the URL so the credential never reaches logs or clients.
            anyhow::anyhow!("storage request failed: {}", e.without_url())
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Mp3ifyError::DownloadFailed {
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let max = self.opts.max_bytes;
        if let Some(len) = resp.content_length()
            && len > max
        {
            return Err(Mp3ifyError::invalid_input(format!(
                "remote file is {len} bytes, larger than the {max} byte limit"
            )));
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| anyhow::anyhow!("storage download interrupted: {}", e.without_url()))?
        {
            if (body.len() + chunk.len()) as u64 > max {
                return Err(Mp3ifyError::invalid_input(format!(
                    "remote file exceeds the {max} byte limit"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        info!(bytes = body.len(), %content_type, "downloaded remote input");
        Ok(MediaInput::new(
            DOWNLOADED_FILE_NAME,
            content_type,
            Bytes::from(body),
        ))
    }
}
