#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use mp3ify::{
    AudioStore, Engine, EngineEvent, EngineInfo, EventHub, MediaFetcher, MediaInput, Mp3ifyError,
    Mp3ifyResult, Session, SessionOpts,
};

/// Smallest valid MP3 prefix: an ID3v2.4 header with an empty tag.
pub fn fake_mp3() -> Bytes {
    let mut out = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    out.extend_from_slice(&[0u8; 64]);
    Bytes::from(out)
}

/// Bytes that sniff as an ISO-BMFF (`.mp4`) file.
pub fn fake_mp4() -> Bytes {
    let mut out = vec![0, 0, 0, 0x20];
    out.extend_from_slice(b"ftypisom");
    out.extend_from_slice(&[0u8; 256]);
    Bytes::from(out)
}

#[derive(Clone, Debug)]
pub struct Script {
    pub fail_load: bool,
    /// `None`: the command "succeeds" without writing an output file.
    pub output: Option<Bytes>,
    pub exec_error: Option<String>,
    pub progress: Vec<f64>,
    pub exec_delay: Duration,
    pub load_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_load: false,
            output: Some(fake_mp3()),
            exec_error: None,
            progress: vec![0.25, 0.5, 0.75, 1.0],
            exec_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
        }
    }
}

/// In-memory engine that follows a [`Script`] and counts calls.
#[derive(Default)]
pub struct ScriptedEngine {
    pub script: Mutex<Script>,
    events: EventHub,
    files: Mutex<HashMap<String, Bytes>>,
    pub loads: AtomicUsize,
    pub execs: AtomicUsize,
    pub writes: AtomicUsize,
    pub last_args: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Self::default()
        })
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn load(&self) -> Mp3ifyResult<EngineInfo> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().clone();
        tokio::time::sleep(script.load_delay).await;
        if script.fail_load {
            return Err(Mp3ifyError::load("scripted load failure"));
        }
        self.events
            .emit(&EngineEvent::Log("scripted engine ready".to_string()));
        Ok(EngineInfo {
            name: "scripted".to_string(),
            version: "1".to_string(),
        })
    }

    fn events(&self) -> &EventHub {
        &self.events
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Mp3ifyResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn exec(&self, args: &[String], cancel: CancellationToken) -> Mp3ifyResult<()> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock() = args.to_vec();
        let script = self.script.lock().clone();

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| Mp3ifyError::convert("missing -i"))?;
        if !self.files.lock().contains_key(input) {
            return Err(Mp3ifyError::convert(format!("{input}: No such file")));
        }
        let output = args
            .last()
            .ok_or_else(|| Mp3ifyError::convert("missing output"))?;

        self.events
            .emit(&EngineEvent::Log(format!("Input #0, from '{input}':")));
        for p in &script.progress {
            self.events.emit(&EngineEvent::Progress(*p));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Mp3ifyError::Cancelled),
            _ = tokio::time::sleep(script.exec_delay) => {}
        }

        if let Some(msg) = script.exec_error {
            return Err(Mp3ifyError::convert(msg));
        }
        if let Some(out) = script.output {
            self.files.lock().insert(output.clone(), out);
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Mp3ifyResult<Bytes> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Mp3ifyError::convert(format!("engine produced no file named '{name}'")))
    }

    async fn delete_file(&self, name: &str) -> Mp3ifyResult<()> {
        self.files.lock().remove(name);
        Ok(())
    }
}

/// Fetcher that serves one canned file and counts requests.
#[derive(Default)]
pub struct StaticFetcher {
    pub body: Option<MediaInput>,
    pub requests: AtomicUsize,
    pub last_id: Mutex<Option<String>>,
}

impl StaticFetcher {
    pub fn serving(input: MediaInput) -> Arc<Self> {
        Arc::new(Self {
            body: Some(input),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch(&self, resource_id: &str) -> Mp3ifyResult<MediaInput> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_id.lock() = Some(resource_id.to_string());
        self.body
            .clone()
            .ok_or(Mp3ifyError::DownloadFailed { status: 404 })
    }
}

pub fn session_with(
    engine: Arc<ScriptedEngine>,
    fetcher: Arc<StaticFetcher>,
    timeout: Option<Duration>,
) -> (Arc<Session>, Arc<AudioStore>) {
    let store = Arc::new(AudioStore::new());
    let session = Session::new(
        engine,
        fetcher,
        store.clone(),
        SessionOpts {
            timeout,
            ..SessionOpts::default()
        },
    );
    (Arc::new(session), store)
}
