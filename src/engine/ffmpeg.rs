use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::ffmpeg_log::{
    LogTail, ProgressLine, parse_duration_line, parse_progress_line, parse_version,
};
use super::vfs::ScratchDir;
use super::{Engine, EngineEvent, EngineInfo, EventHub};
use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

const LOG_TAIL_LINES: usize = 12;

/// Options for [`FfmpegEngine`].
#[derive(Clone, Debug)]
pub struct FfmpegEngineOpts {
    /// Executable to run. A bare name is resolved through `PATH`.
    pub ffmpeg_path: PathBuf,
    /// Directory under which the engine's private scratch directory is created.
    pub scratch_root: PathBuf,
}

impl FfmpegEngineOpts {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            scratch_root: scratch_root.into(),
        }
    }
}

impl Default for FfmpegEngineOpts {
    fn default() -> Self {
        Self::new("ffmpeg", std::env::temp_dir())
    }
}

/// Engine backed by the system `ffmpeg` binary.
///
/// Each instance owns one scratch directory, created on [`load`](Engine::load) and removed when
/// the engine is dropped. Commands run with the scratch directory as working directory, so the
/// flat file names used by callers resolve inside it.
pub struct FfmpegEngine {
    opts: FfmpegEngineOpts,
    events: EventHub,
    scratch: OnceLock<ScratchDir>,
}

impl FfmpegEngine {
    pub fn new(opts: FfmpegEngineOpts) -> Self {
        Self {
            opts,
            events: EventHub::new(),
            scratch: OnceLock::new(),
        }
    }

    fn scratch(&self) -> Mp3ifyResult<&ScratchDir> {
        self.scratch
            .get()
            .ok_or_else(|| Mp3ifyError::load("ffmpeg engine is not loaded"))
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    #[tracing::instrument(skip(self), fields(ffmpeg = %self.opts.ffmpeg_path.display()))]
    async fn load(&self) -> Mp3ifyResult<EngineInfo> {
        let out = Command::new(&self.opts.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Mp3ifyError::load(format!(
                    "failed to run '{}' (is ffmpeg installed and on PATH?): {e}",
                    self.opts.ffmpeg_path.display()
                ))
            })?;
        if !out.status.success() {
            return Err(Mp3ifyError::load(format!(
                "'{} -version' exited with status {}: {}",
                self.opts.ffmpeg_path.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let version = parse_version(&String::from_utf8_lossy(&out.stdout))
            .unwrap_or_else(|| "unknown".to_string());

        if self.scratch.get().is_none() {
            let scratch = ScratchDir::create_in(&self.opts.scratch_root)
                .map_err(|e| Mp3ifyError::load(format!("failed to prepare scratch dir: {e}")))?;
            tracing::debug!(path = %scratch.path().display(), "created engine scratch dir");
            // A concurrent load may have won; the loser's directory is dropped and removed.
            let _ = self.scratch.set(scratch);
        }

        tracing::info!(%version, "ffmpeg engine loaded");
        Ok(EngineInfo {
            name: "ffmpeg".to_string(),
            version,
        })
    }

    fn events(&self) -> &EventHub {
        &self.events
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Mp3ifyResult<()> {
        self.scratch()?.write(name, &data).await
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn exec(&self, args: &[String], cancel: CancellationToken) -> Mp3ifyResult<()> {
        let scratch = self.scratch()?;

        let mut cmd = Command::new(&self.opts.ffmpeg_path);
        cmd.current_dir(scratch.path())
            .args([
                "-hide_banner",
                "-nostdin",
                "-y",
                "-nostats",
                "-progress",
                "pipe:1",
            ])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Mp3ifyError::convert(format!("failed to spawn ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Mp3ifyError::convert("failed to open ffmpeg stdout (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Mp3ifyError::convert("failed to open ffmpeg stderr (unexpected)"))?;

        // Input duration in microseconds, learned from the log; 0 until known.
        let duration_cell = AtomicU64::new(0);
        let duration_us = &duration_cell;
        let events = &self.events;

        let log_reader = async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut tail = LogTail::new(LOG_TAIL_LINES);
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
                if duration_us.load(Ordering::Relaxed) == 0
                    && let Some(secs) = parse_duration_line(&line)
                {
                    duration_us.store((secs * 1_000_000.0) as u64, Ordering::Relaxed);
                }
                tail.push(&line);
                events.emit(&EngineEvent::Log(line));
            }
            Ok::<_, std::io::Error>(tail)
        };

        let progress_reader = async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
                match parse_progress_line(&line) {
                    Some(ProgressLine::OutTimeUs(us)) => {
                        let total = duration_us.load(Ordering::Relaxed);
                        if total > 0 {
                            events.emit(&EngineEvent::Progress(us as f64 / total as f64));
                        }
                    }
                    Some(ProgressLine::End) => events.emit(&EngineEvent::Progress(1.0)),
                    Some(ProgressLine::Continue) | None => {}
                }
            }
            Ok::<_, std::io::Error>(())
        };

        // `child` moves in here so that dropping this future on cancellation kills ffmpeg.
        let run = async move { tokio::join!(log_reader, progress_reader, child.wait()) };

        let (tail, progress, status) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("ffmpeg command cancelled");
                return Err(Mp3ifyError::Cancelled);
            }
            out = run => out,
        };

        let tail =
            tail.map_err(|e| Mp3ifyError::convert(format!("failed to read ffmpeg log: {e}")))?;
        progress.map_err(|e| {
            Mp3ifyError::convert(format!("failed to read ffmpeg progress: {e}"))
        })?;
        let status = status
            .map_err(|e| Mp3ifyError::convert(format!("failed to wait for ffmpeg: {e}")))?;

        if !status.success() {
            return Err(Mp3ifyError::convert(format!(
                "ffmpeg exited with status {}: {}",
                status,
                tail.joined().trim()
            )));
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Mp3ifyResult<Bytes> {
        self.scratch()?.read(name).await
    }

    async fn delete_file(&self, name: &str) -> Mp3ifyResult<()> {
        self.scratch()?.remove(name).await
    }
}

/// Next line without its terminator. ffmpeg echoes container metadata verbatim, so bytes that
/// are not UTF-8 are replaced rather than treated as a read error.
async fn next_lossy_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
