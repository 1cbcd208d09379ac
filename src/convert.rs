//! Transcode invocation: input bytes in, MP3 bytes out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};
use crate::source::{MediaInput, has_mp3_signature};

pub const INPUT_STEM: &str = "input_video";
pub const OUTPUT_FILE_NAME: &str = "output_audio.mp3";

/// Engine file name for an input: `input_video` plus the original extension, when it has a plain
/// alphanumeric one.
pub fn input_file_name(original: &str) -> String {
    match original.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{INPUT_STEM}.{ext}")
        }
        _ => INPUT_STEM.to_string(),
    }
}

/// Engine arguments: read the named input, write an MP3 with default encoder settings.
pub fn transcode_args(input_name: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        input_name.to_string(),
        OUTPUT_FILE_NAME.to_string(),
    ]
}

/// Runs at most one conversion at a time against an [`EngineHandle`].
#[derive(Debug)]
pub struct Transcoder {
    engine: Arc<EngineHandle>,
    timeout: Option<Duration>,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Transcoder {
    pub fn new(engine: Arc<EngineHandle>, timeout: Option<Duration>) -> Self {
        Self {
            engine,
            timeout,
            busy: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the transcoder for one conversion, failing with `Busy` while another one runs.
    pub fn reserve(&self) -> Mp3ifyResult<Reservation<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Mp3ifyError::Busy);
        }
        Ok(Reservation {
            transcoder: self,
            _busy: BusyGuard(&self.busy),
        })
    }

    /// Convert `input` to MP3 bytes.
    ///
    /// Fails with `NoInputSelected` without touching the engine when `input` is `None`, and with
    /// `Busy` while another conversion runs.
    pub async fn convert(
        &self,
        input: Option<&MediaInput>,
        cancel: CancellationToken,
    ) -> Mp3ifyResult<Bytes> {
        let input = input.ok_or(Mp3ifyError::NoInputSelected)?;
        self.reserve()?.run(input, cancel).await
    }
}

/// Exclusive claim on a [`Transcoder`]; released on drop.
pub struct Reservation<'a> {
    transcoder: &'a Transcoder,
    _busy: BusyGuard<'a>,
}

impl Reservation<'_> {
    /// Run the conversion. Engine file entries are removed afterwards whether it succeeded or not.
    #[tracing::instrument(skip_all, fields(input = %input.name))]
    pub async fn run(self, input: &MediaInput, cancel: CancellationToken) -> Mp3ifyResult<Bytes> {
        let handle = &self.transcoder.engine;
        handle.ensure_loaded().await?;
        let _exec = handle.lock_exec().await;

        let input_name = input_file_name(&input.name);
        let steps = run_steps(handle, input, &input_name, cancel.clone());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Mp3ifyError::Cancelled),
            out = with_timeout(self.transcoder.timeout, steps) => out,
        };

        for name in [input_name.as_str(), OUTPUT_FILE_NAME] {
            if let Err(e) = handle.engine().delete_file(name).await {
                warn!(file = name, error = %e, "failed to remove engine file");
            }
        }

        match &result {
            Ok(out) => info!(bytes = out.len(), "conversion finished"),
            Err(e) => warn!(error = %e, "conversion failed"),
        }
        result
    }
}

async fn run_steps(
    handle: &EngineHandle,
    input: &MediaInput,
    input_name: &str,
    cancel: CancellationToken,
) -> Mp3ifyResult<Bytes> {
    let engine = handle.engine();

    debug!(file = input_name, bytes = input.len(), "writing engine input");
    engine.write_file(input_name, input.bytes.clone()).await?;

    engine.exec(&transcode_args(input_name), cancel).await?;

    let out = engine.read_file(OUTPUT_FILE_NAME).await?;
    if out.is_empty() {
        return Err(Mp3ifyError::convert("engine produced an empty output file"));
    }
    if !has_mp3_signature(&out) {
        return Err(Mp3ifyError::convert(
            "engine output does not start with an MP3 header",
        ));
    }
    Ok(out)
}

async fn with_timeout<F>(timeout: Option<Duration>, fut: F) -> Mp3ifyResult<Bytes>
where
    F: std::future::Future<Output = Mp3ifyResult<Bytes>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Mp3ifyError::TimedOut(limit))?,
        None => fut.await,
    }
}
