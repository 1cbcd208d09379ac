use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bytes::Bytes;

use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

/// The engine's private filesystem: a flat namespace of files in a temporary directory.
///
/// The directory and everything in it is removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    pub fn create_in(root: &Path) -> Mp3ifyResult<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("failed to create scratch root '{}'", root.display()))?;
        let dir = tempfile::Builder::new()
            .prefix("mp3ify-")
            .tempdir_in(root)
            .with_context(|| format!("failed to create scratch dir in '{}'", root.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn entry_path(&self, name: &str) -> Mp3ifyResult<PathBuf> {
        validate_entry_name(name)?;
        Ok(self.dir.path().join(name))
    }

    pub async fn write(&self, name: &str, data: &[u8]) -> Mp3ifyResult<()> {
        let path = self.entry_path(name)?;
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("failed to write scratch entry '{name}'"))?;
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Mp3ifyResult<Bytes> {
        let path = self.entry_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Mp3ifyError::convert(
                format!("engine produced no file named '{name}'"),
            )),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to read scratch entry '{name}'"))
                .into()),
        }
    }

    /// Remove an entry. Missing entries are not an error.
    pub async fn remove(&self, name: &str) -> Mp3ifyResult<()> {
        let path = self.entry_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to remove scratch entry '{name}'"))
                .into()),
        }
    }

    pub fn entry_names(&self) -> Mp3ifyResult<Vec<String>> {
        let mut names = Vec::new();
        let rd = std::fs::read_dir(self.dir.path())
            .with_context(|| format!("failed to list '{}'", self.dir.path().display()))?;
        for entry in rd {
            let entry = entry.context("failed to read scratch dir entry")?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Entry names are flat: no separators, no `.`/`..`, no NUL, and no leading `-` (which the engine
/// would parse as an option).
pub fn validate_entry_name(name: &str) -> Mp3ifyResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Mp3ifyError::invalid_input(format!(
            "invalid engine file name '{name}'"
        )));
    }
    if name.starts_with('-') || name.contains(['/', '\\', '\0']) {
        return Err(Mp3ifyError::invalid_input(format!(
            "invalid engine file name '{name}'"
        )));
    }
    Ok(())
}
