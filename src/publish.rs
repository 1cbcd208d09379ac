//! Published conversion results, addressable by revocable URIs.

use std::collections::HashMap;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
pub const AUDIO_URI_PREFIX: &str = "/audio/";

/// Reference to a published audio resource.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AudioRef {
    pub id: Uuid,
    pub uri: String,
}

#[derive(Clone, Debug)]
pub struct PublishedAudio {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub published_at: SystemTime,
}

/// In-memory store of published MP3 outputs.
///
/// Entries live until revoked. Sessions revoke their previous output before publishing a new one.
#[derive(Debug, Default)]
pub struct AudioStore {
    entries: RwLock<HashMap<Uuid, PublishedAudio>>,
}

impl AudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, bytes: Bytes) -> AudioRef {
        let id = Uuid::new_v4();
        self.entries.write().insert(
            id,
            PublishedAudio {
                bytes,
                content_type: AUDIO_CONTENT_TYPE,
                published_at: SystemTime::now(),
            },
        );
        tracing::debug!(%id, "published audio");
        AudioRef {
            id,
            uri: format!("{AUDIO_URI_PREFIX}{id}"),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<PublishedAudio> {
        self.entries.read().get(&id).cloned()
    }

    /// Revoke a reference. Returns `false` when it was already gone.
    pub fn revoke(&self, audio: &AudioRef) -> bool {
        let removed = self.entries.write().remove(&audio.id).is_some();
        if removed {
            tracing::debug!(id = %audio.id, "revoked audio");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
