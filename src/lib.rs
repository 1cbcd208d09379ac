//! mp3ify converts videos to MP3 files.
//!
//! A [`Session`] holds one user's state: it loads an [`Engine`] once, accepts an input (an
//! uploaded/local file or a share link fetched server-side), runs a single transcode, and
//! publishes the result under a revocable URI in an [`AudioStore`].
//!
//! The default engine drives the system `ffmpeg` binary. The [`server`] module exposes sessions
//! over HTTP; the `mp3ify` binary offers the same flow on the command line.
#![forbid(unsafe_code)]

mod foundation;

pub mod config;
pub mod convert;
pub mod engine;
pub mod logging;
pub mod publish;
pub mod server;
pub mod session;
pub mod source;

pub use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};
pub use crate::foundation::progress::{ProgressTracker, fraction_to_percent};

pub use crate::config::Settings;
pub use crate::convert::{OUTPUT_FILE_NAME, Transcoder, input_file_name};
pub use crate::engine::ffmpeg::{FfmpegEngine, FfmpegEngineOpts, is_ffmpeg_on_path};
pub use crate::engine::{Engine, EngineEvent, EngineHandle, EngineInfo, EventHub, EventKind};
pub use crate::publish::{AudioRef, AudioStore};
pub use crate::session::{Session, SessionOpts, SessionSnapshot, Status};
pub use crate::source::{
    DriveFetcher, DriveFetcherOpts, InputSource, MediaFetcher, MediaInput, extract_resource_id,
};
