mod support;

use std::time::Duration;

use bytes::Bytes;
use mp3ify::{Engine, EventKind, MediaInput, Mp3ifyError, Status};

use support::{Script, ScriptedEngine, StaticFetcher, fake_mp3, fake_mp4, session_with};

async fn wait_for_status(session: &mp3ify::Session, status: Status) {
    for _ in 0..200 {
        if session.snapshot().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {status:?}");
}

#[tokio::test]
async fn convert_without_input_never_touches_engine() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    let err = session.convert().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::NoInputSelected));

    assert_eq!(engine.loads(), 0);
    assert_eq!(engine.writes(), 0);
    assert_eq!(engine.execs(), 0);
    assert!(store.is_empty());

    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Idle);
    assert_eq!(
        snap.error.as_deref(),
        Some("no input selected: please select a video file first")
    );
}

#[tokio::test]
async fn converts_selected_file_and_publishes_it() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    session.initialize_engine().await.unwrap();
    assert_eq!(session.snapshot().status_text, "FFmpeg loaded");

    session
        .select_file("holiday.mp4", Some("video/mp4"), fake_mp4())
        .unwrap();
    let audio = session.convert().await.unwrap();

    assert!(audio.uri.starts_with("/audio/"));
    assert_eq!(store.get(audio.id).unwrap().bytes, fake_mp3());
    assert_eq!(session.output_bytes().unwrap(), fake_mp3());
    assert_eq!(
        *engine.last_args.lock(),
        vec!["-i", "input_video.mp4", "output_audio.mp3"]
    );
    // Both engine entries are gone once the conversion finishes.
    assert!(engine.file_names().is_empty());

    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Complete);
    assert_eq!(snap.status_text, "Conversion complete");
    assert_eq!(snap.progress_percent, 100);
    assert_eq!(snap.output, Some(audio));
    assert!(snap.error.is_none());
    assert_eq!(snap.engine.unwrap().name, "scripted");
}

#[tokio::test]
async fn engine_loads_once_across_calls() {
    let engine = ScriptedEngine::new(Script {
        load_delay: Duration::from_millis(30),
        ..Script::default()
    });
    let (session, _store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    let (a, b) = tokio::join!(session.initialize_engine(), session.initialize_engine());
    a.unwrap();
    b.unwrap();

    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    session.convert().await.unwrap();
    session.convert().await.unwrap();

    assert_eq!(engine.loads(), 1);
    assert_eq!(engine.events().handler_count(EventKind::Progress), 1);
    assert_eq!(engine.events().handler_count(EventKind::Log), 1);
}

#[tokio::test]
async fn failed_load_can_be_retried_without_duplicate_listeners() {
    let engine = ScriptedEngine::new(Script {
        fail_load: true,
        ..Script::default()
    });
    let (session, _store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    let err = session.initialize_engine().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::Load(_)));
    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Error);
    assert!(!snap.loaded);
    assert!(snap.error.unwrap().starts_with("engine load error:"));

    engine.script.lock().fail_load = false;
    session.initialize_engine().await.unwrap();

    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Ready);
    assert!(snap.loaded);
    assert!(snap.error.is_none());
    assert_eq!(engine.loads(), 2);
    assert_eq!(engine.events().handler_count(EventKind::Progress), 1);
}

#[tokio::test]
async fn convert_loads_engine_on_demand() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, _store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    session.select_file("clip.mov", None, fake_mp4()).unwrap();
    assert_eq!(session.snapshot().status, Status::Idle);

    session.convert().await.unwrap();
    assert_eq!(engine.loads(), 1);
    assert!(session.snapshot().loaded);
}

#[tokio::test]
async fn reconverting_revokes_the_previous_output() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine, StaticFetcher::failing(), None);

    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    let first = session.convert().await.unwrap();
    let second = session.convert().await.unwrap();

    assert_ne!(first.id, second.id);
    assert!(store.get(first.id).is_none());
    assert!(store.get(second.id).is_some());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn failed_conversion_keeps_previous_output() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine.clone(), StaticFetcher::failing(), None);

    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    let first = session.convert().await.unwrap();

    engine.script.lock().exec_error = Some("Invalid data found when processing input".into());
    let err = session.convert().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::Convert(_)));

    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Error);
    assert_eq!(snap.output, Some(first.clone()));
    assert!(store.get(first.id).is_some());
    assert!(
        snap.error
            .unwrap()
            .contains("Invalid data found when processing input")
    );
    assert!(engine.file_names().is_empty());
}

#[tokio::test]
async fn missing_empty_or_foreign_output_is_a_conversion_error() {
    for output in [None, Some(Bytes::new()), Some(Bytes::from_static(b"RIFF....WAVEfmt "))] {
        let engine = ScriptedEngine::new(Script {
            output,
            ..Script::default()
        });
        let (session, store) = session_with(engine.clone(), StaticFetcher::failing(), None);
        session.select_file("a.mp4", None, fake_mp4()).unwrap();

        let err = session.convert().await.unwrap_err();
        assert!(matches!(err, Mp3ifyError::Convert(_)), "{err}");
        assert!(store.is_empty());
        assert!(session.snapshot().output.is_none());
        assert!(engine.file_names().is_empty());
    }
}

#[tokio::test]
async fn second_convert_is_rejected_while_busy() {
    let engine = ScriptedEngine::new(Script {
        exec_delay: Duration::from_millis(300),
        ..Script::default()
    });
    let (session, _store) = session_with(engine.clone(), StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.convert().await })
    };
    wait_for_status(&session, Status::Converting).await;
    assert!(session.is_converting());

    let err = session.convert().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::Busy));
    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Converting);
    assert!(snap.error.is_none());

    running.await.unwrap().unwrap();
    assert_eq!(engine.execs(), 1);
    assert_eq!(session.snapshot().status, Status::Complete);
}

#[tokio::test]
async fn slow_conversion_times_out_and_cleans_up() {
    let engine = ScriptedEngine::new(Script {
        exec_delay: Duration::from_secs(30),
        ..Script::default()
    });
    let (session, store) = session_with(
        engine.clone(),
        StaticFetcher::failing(),
        Some(Duration::from_millis(100)),
    );
    session.select_file("a.mp4", None, fake_mp4()).unwrap();

    let err = session.convert().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::TimedOut(_)));
    assert!(store.is_empty());
    assert!(engine.file_names().is_empty());
    assert_eq!(session.snapshot().status, Status::Error);
    assert!(!session.is_converting());
}

#[tokio::test]
async fn cancel_stops_a_running_conversion() {
    let engine = ScriptedEngine::new(Script {
        exec_delay: Duration::from_secs(30),
        ..Script::default()
    });
    let (session, store) = session_with(engine.clone(), StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    assert!(!session.cancel());

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.convert().await })
    };
    wait_for_status(&session, Status::Converting).await;
    assert!(session.cancel());

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, Mp3ifyError::Cancelled));
    assert!(store.is_empty());
    assert!(engine.file_names().is_empty());
    assert!(!session.cancel());

    // The session stays usable.
    engine.script.lock().exec_delay = Duration::ZERO;
    session.convert().await.unwrap();
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let engine = ScriptedEngine::new(Script {
        progress: vec![0.2, 0.5, 0.3, f64::NAN],
        exec_error: Some("stop here".into()),
        ..Script::default()
    });
    let (session, _store) = session_with(engine, StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();

    let _ = session.convert().await;
    assert_eq!(session.snapshot().progress_percent, 50);
}

#[tokio::test]
async fn progress_resets_for_each_conversion() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, _store) = session_with(engine.clone(), StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    session.convert().await.unwrap();
    assert_eq!(session.snapshot().progress_percent, 100);

    {
        let mut script = engine.script.lock();
        script.progress = vec![0.1];
        script.exec_error = Some("boom".into());
    }
    let _ = session.convert().await;
    assert_eq!(session.snapshot().progress_percent, 10);
}

#[tokio::test]
async fn selecting_new_input_revokes_output_and_leaves_complete() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine, StaticFetcher::failing(), None);

    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    let audio = session.convert().await.unwrap();

    session.select_file("b.webm", Some("video/webm"), fake_mp4()).unwrap();
    let snap = session.snapshot();
    assert_eq!(snap.status, Status::Ready);
    assert!(snap.output.is_none());
    assert!(store.get(audio.id).is_none());
    assert_eq!(snap.input.unwrap().name, "b.webm");
}

#[tokio::test]
async fn rejects_empty_and_unrecognized_uploads() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, _store) = session_with(engine, StaticFetcher::failing(), None);

    let err = session.select_file("a.mp4", None, Bytes::new()).unwrap_err();
    assert!(matches!(err, Mp3ifyError::InvalidInput(_)));

    let err = session
        .select_file("notes.txt", Some("text/plain"), Bytes::from_static(b"hello"))
        .unwrap_err();
    assert!(matches!(err, Mp3ifyError::InvalidInput(_)));

    let snap = session.snapshot();
    assert!(snap.input.is_none());
    assert!(snap.error.unwrap().starts_with("invalid input:"));
}

#[tokio::test]
async fn invalid_share_link_never_reaches_the_network() {
    let engine = ScriptedEngine::new(Script::default());
    let fetcher = StaticFetcher::failing();
    let (session, _store) = session_with(engine, fetcher.clone(), None);

    let err = session
        .select_remote("https://example.com/nothing-here")
        .await
        .unwrap_err();
    assert!(matches!(err, Mp3ifyError::InvalidUrlFormat(_)));
    assert_eq!(fetcher.requests(), 0);
    assert!(
        session
            .snapshot()
            .error
            .unwrap()
            .starts_with("invalid share link:")
    );
}

#[tokio::test]
async fn remote_input_is_fetched_by_resource_id() {
    let engine = ScriptedEngine::new(Script::default());
    let fetcher = StaticFetcher::serving(MediaInput::new(
        "downloaded_video.mp4",
        "video/mp4",
        fake_mp4(),
    ));
    let (session, _store) = session_with(engine.clone(), fetcher.clone(), None);

    session
        .select_remote("https://drive.example.com/file/d/ABC123/view?usp=sharing")
        .await
        .unwrap();
    assert_eq!(fetcher.requests(), 1);
    assert_eq!(fetcher.last_id.lock().as_deref(), Some("ABC123"));

    let input = session.snapshot().input.unwrap();
    assert_eq!(input.name, "downloaded_video.mp4");
    assert_eq!(input.content_type, "video/mp4");

    session.convert().await.unwrap();
    assert_eq!(engine.last_args.lock()[1], "input_video.mp4");
}

#[tokio::test]
async fn failed_download_clears_previous_selection() {
    let engine = ScriptedEngine::new(Script::default());
    let fetcher = StaticFetcher::failing();
    let (session, _store) = session_with(engine.clone(), fetcher, None);

    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    let err = session
        .select_remote("https://drive.example.com/file/d/GONE/view")
        .await
        .unwrap_err();
    assert!(matches!(err, Mp3ifyError::DownloadFailed { status: 404 }));

    let snap = session.snapshot();
    assert!(snap.input.is_none());
    assert_eq!(
        snap.error.as_deref(),
        Some("download failed with HTTP status 404")
    );

    let err = session.convert().await.unwrap_err();
    assert!(matches!(err, Mp3ifyError::NoInputSelected));
    assert_eq!(engine.execs(), 0);
}

#[tokio::test]
async fn close_revokes_output() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, store) = session_with(engine, StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    session.convert().await.unwrap();
    assert_eq!(store.len(), 1);

    session.close();
    assert!(store.is_empty());
    assert!(session.output_bytes().is_none());
}

#[tokio::test]
async fn engine_logs_reach_the_snapshot() {
    let engine = ScriptedEngine::new(Script::default());
    let (session, _store) = session_with(engine, StaticFetcher::failing(), None);
    session.select_file("a.mp4", None, fake_mp4()).unwrap();
    session.convert().await.unwrap();

    let last = session.snapshot().last_log.unwrap();
    assert!(last.starts_with("Input #0"), "{last}");
}

#[tokio::test]
async fn transcoder_checks_input_before_touching_engine() {
    use std::sync::Arc;

    use mp3ify::{EngineHandle, Transcoder};
    use tokio_util::sync::CancellationToken;

    let engine = ScriptedEngine::new(Script::default());
    let transcoder = Transcoder::new(Arc::new(EngineHandle::new(engine.clone())), None);

    let err = transcoder
        .convert(None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Mp3ifyError::NoInputSelected));
    assert_eq!(engine.loads(), 0);

    let input = MediaInput::new("a.mkv", "video/x-matroska", fake_mp4());
    let out = transcoder
        .convert(Some(&input), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, fake_mp3());
    assert_eq!(engine.loads(), 1);
    assert_eq!(engine.last_args.lock()[1], "input_video.mkv");
    assert!(!transcoder.is_busy());
}
