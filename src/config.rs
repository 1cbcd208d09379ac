use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

/// Default storage content API base.
pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com";

/// Default cap on input size, in bytes (2 GiB).
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 2 * 1024 * 1024 * 1024;

pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

pub const ENV_FFMPEG: &str = "MP3IFY_FFMPEG";
pub const ENV_DRIVE_API_KEY: &str = "MP3IFY_DRIVE_API_KEY";
pub const ENV_BIND: &str = "MP3IFY_BIND";

/// Top-level configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `ffmpeg` executable; a bare name is looked up on `PATH`.
    pub ffmpeg_path: PathBuf,
    /// Parent directory for per-session engine scratch directories.
    pub scratch_root: PathBuf,
    /// Per-conversion time limit in seconds; 0 disables it.
    pub convert_timeout_secs: u64,
    pub max_input_bytes: u64,
    pub drive: DriveSettings,
    pub server: ServerSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveSettings {
    pub api_base: String,
    /// Storage API credential. Only ever used server-side.
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind: String,
    /// Sessions without client activity for this many seconds are closed; 0 keeps them forever.
    pub session_idle_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            scratch_root: std::env::temp_dir(),
            convert_timeout_secs: 0,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            drive: DriveSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            api_key: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the JSON file at `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Mp3ifyResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: &Path) -> Mp3ifyResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("open config '{}'", path.display()))?;
        serde_json::from_str(&text).map_err(|e| {
            Mp3ifyError::config(format!("parse config '{}': {e}", path.display()))
        })
    }

    /// Apply `MP3IFY_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_FFMPEG).filter(|v| !v.trim().is_empty()) {
            self.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_DRIVE_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.drive.api_key = Some(v);
        }
        if let Some(v) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.server.bind = v;
        }
    }

    pub fn validate(&self) -> Mp3ifyResult<()> {
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(Mp3ifyError::config("ffmpeg_path must not be empty"));
        }
        if self.scratch_root.as_os_str().is_empty() {
            return Err(Mp3ifyError::config("scratch_root must not be empty"));
        }
        if self.max_input_bytes == 0 {
            return Err(Mp3ifyError::config("max_input_bytes must be non-zero"));
        }
        let base = url::Url::parse(&self.drive.api_base).map_err(|e| {
            Mp3ifyError::config(format!("drive.api_base '{}': {e}", self.drive.api_base))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Mp3ifyError::config(
                "drive.api_base must be an http(s) URL",
            ));
        }
        if self.server.bind.trim().is_empty() {
            return Err(Mp3ifyError::config("server.bind must not be empty"));
        }
        Ok(())
    }

    pub fn convert_timeout(&self) -> Option<Duration> {
        (self.convert_timeout_secs > 0).then(|| Duration::from_secs(self.convert_timeout_secs))
    }

    pub fn session_idle(&self) -> Option<Duration> {
        let secs = self.server.session_idle_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
