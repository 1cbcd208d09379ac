use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use mp3ify::{
    AudioStore, DriveFetcher, DriveFetcherOpts, FfmpegEngine, FfmpegEngineOpts, InputSource,
    Session, SessionOpts, Settings, Status,
};

#[derive(Parser, Debug)]
#[command(name = "mp3ify", version)]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one video to MP3 (requires `ffmpeg` on PATH).
    Convert(ConvertArgs),
    /// Run the HTTP session API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
#[group(id = "source", required = true, multiple = false)]
struct SourceArgs {
    /// Input video file.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Share link of a remote video (`.../d/<id>/...`).
    #[arg(long)]
    url: Option<String>,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output MP3 path.
    #[arg(long)]
    out: PathBuf,

    /// Abort the conversion after this many seconds (0 = no limit).
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// ffmpeg executable to use.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:8080.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mp3ify::logging::init_tracing(cli.log_json);

    let mut settings = Settings::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Convert(args) => {
            if let Some(secs) = args.timeout_secs {
                settings.convert_timeout_secs = secs;
            }
            if let Some(ffmpeg) = args.ffmpeg.clone() {
                settings.ffmpeg_path = ffmpeg;
            }
            settings.validate()?;
            cmd_convert(&settings, args).await
        }
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                settings.server.bind = bind;
            }
            settings.validate()?;
            cmd_serve(&settings).await
        }
    }
}

fn input_source(args: &SourceArgs) -> anyhow::Result<InputSource> {
    match (&args.in_path, &args.url) {
        (Some(path), None) => Ok(InputSource::Local(path.clone())),
        (None, Some(url)) => Ok(InputSource::Remote(url.clone())),
        _ => anyhow::bail!("exactly one of --in or --url is required"),
    }
}

async fn cmd_convert(settings: &Settings, args: ConvertArgs) -> anyhow::Result<()> {
    let source = input_source(&args.source)?;

    let engine = Arc::new(FfmpegEngine::new(FfmpegEngineOpts::new(
        settings.ffmpeg_path.clone(),
        settings.scratch_root.clone(),
    )));
    let fetcher = Arc::new(DriveFetcher::new(DriveFetcherOpts {
        api_base: settings.drive.api_base.clone(),
        api_key: settings.drive.api_key.clone(),
        max_bytes: settings.max_input_bytes,
    }));
    let session = Arc::new(Session::new(
        engine,
        fetcher,
        Arc::new(AudioStore::new()),
        SessionOpts {
            timeout: settings.convert_timeout(),
            max_input_bytes: settings.max_input_bytes,
        },
    ));

    session.select(&source).await?;
    session.initialize_engine().await?;

    let reporter = tokio::spawn(report_progress(session.clone()));
    let interrupt = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                session.cancel();
            }
        })
    };

    let result = session.convert().await;
    reporter.abort();
    interrupt.abort();
    eprintln!();
    result?;

    let bytes = session
        .output_bytes()
        .context("conversion finished without a published output (bug)")?;
    write_output(&args.out, &bytes)?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn report_progress(session: Arc<Session>) {
    let mut last = None;
    loop {
        let snap = session.snapshot();
        if snap.status == Status::Converting && last != Some(snap.progress_percent) {
            eprint!("\r{} {:>3}%", snap.status_text, snap.progress_percent);
            let _ = std::io::stderr().flush();
            last = Some(snap.progress_percent);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write mp3 '{}'", path.display()))?;
    Ok(())
}

async fn cmd_serve(settings: &Settings) -> anyhow::Result<()> {
    if settings.drive.api_key.is_none() {
        tracing::warn!("no storage API key configured; remote fetches will be unauthenticated");
    }
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("bind '{}'", settings.server.bind))?;
    let state = mp3ify::server::AppState::from_settings(settings);
    mp3ify::server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
