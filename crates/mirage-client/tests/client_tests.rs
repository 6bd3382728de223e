//! Client tests against a mock Mirage server.

use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mirage_client::{ClientError, CompareSession, MirageClient, RemoteTrigger};
use mirage_models::VideoKind;

fn write_clip(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![7u8; bytes]).unwrap();
    path
}

fn upload_body() -> serde_json::Value {
    json!({
        "message": "File uploaded and processed successfully",
        "original_filename": "lobby.mp4",
        "processed_filename": "processed_lobby.mp4",
        "processed_info": {
            "codec": "h264",
            "file_size": 400,
            "width": 1280,
            "height": 720,
            "duration": 3.0,
            "bitrate": 1067
        },
        "report": {
            "frames_total": 90,
            "frames_idle": 60,
            "frames_degraded": 55,
            "elapsed_ms": 1200
        }
    })
}

fn stats_body(codec: &str, file_size: u64) -> serde_json::Value {
    json!({
        "codec": codec,
        "file_size": file_size,
        "width": 1280,
        "height": 720,
        "duration": 3.0,
        "bitrate_data": [
            {"timestamp": 0, "bitrate": 900},
            {"timestamp": 1, "bitrate": 300},
            {"timestamp": 2, "bitrate": 250}
        ]
    })
}

#[tokio::test]
async fn test_upload_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let clip = write_clip(&dir, "lobby.mp4", 1000);
    let client = MirageClient::with_base_url(server.uri()).unwrap();

    let upload = client.upload(&clip).await.unwrap();
    assert_eq!(upload.processed_filename, "processed_lobby.mp4");
    assert_eq!(upload.processed_info.codec, "h264");
    assert_eq!(upload.report.map(|r| r.frames_idle), Some(60));
}

#[tokio::test]
async fn test_upload_streams_whole_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_body()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let content: Vec<u8> = (0..=255u8).cycle().take(300_000).collect();
    let clip = dir.path().join("big.mp4");
    std::fs::write(&clip, &content).unwrap();

    let client = MirageClient::with_base_url(server.uri()).unwrap();
    client.upload(&clip).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = &requests[0].body;
    let header_end = body
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap()
        + 4;
    let head = String::from_utf8_lossy(&body[..header_end]);
    assert!(head.contains("name=\"file\""));
    assert!(head.contains("filename=\"big.mp4\""));
    assert!(head.contains("video/mp4"));
    assert_eq!(&body[header_end..header_end + content.len()], content.as_slice());
}

#[tokio::test]
async fn test_error_body_becomes_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "File type not allowed"})),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let clip = write_clip(&dir, "notes.txt", 10);
    let client = MirageClient::with_base_url(server.uri()).unwrap();

    let err = client.upload(&clip).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    match err {
        ClientError::Status { message, .. } => assert_eq!(message, "File type not allowed"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_plain_text_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/video/gone.mp4/stats"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway\n"))
        .mount(&server)
        .await;

    let client = MirageClient::with_base_url(server.uri()).unwrap();
    let err = client
        .video_stats(VideoKind::Original, "gone.mp4")
        .await
        .unwrap_err();

    match err {
        ClientError::Status { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_video_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/processed/processed_lobby.mp4/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body("h264", 400)))
        .mount(&server)
        .await;

    let client = MirageClient::with_base_url(server.uri()).unwrap();
    let data = client
        .video_stats(VideoKind::Processed, "processed_lobby.mp4")
        .await
        .unwrap();

    assert_eq!(data.codec, "h264");
    assert_eq!(data.bitrate_data.len(), 3);
    assert_eq!(data.bitrate_at(1.5), 300);
}

#[tokio::test]
async fn test_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/processed/processed_lobby.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(vec![1u8; 4096]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("out").join("lobby.mp4");
    let client = MirageClient::with_base_url(server.uri()).unwrap();

    let written = client
        .download(VideoKind::Processed, "processed_lobby.mp4", &dest)
        .await
        .unwrap();

    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
}

#[tokio::test]
async fn test_remote_trigger_fills_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/processed/processed_lobby.mp4/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body("h264", 400)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/video/lobby.mp4/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body("mpeg4", 1000)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let clip = write_clip(&dir, "lobby.mp4", 1000);
    let client = MirageClient::with_base_url(server.uri()).unwrap();
    let trigger = RemoteTrigger::new(client);

    let mut session = CompareSession::new();
    session.select(&clip).await.unwrap();
    let processed = session.process(&trigger).await.unwrap().clone();

    assert_eq!(
        processed.reference,
        format!("{}/api/processed/processed_lobby.mp4", server.uri())
    );
    assert_eq!(processed.remote_name.as_deref(), Some("processed_lobby.mp4"));
    assert_eq!(processed.data.codec, "h264");

    let original = session.original().unwrap();
    assert_eq!(original.data.codec, "mpeg4");
    assert_eq!(session.original_bitrate_at(0.2), 900);
}

#[tokio::test]
async fn test_remote_trigger_without_stats_uses_upload_info() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_body()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let clip = write_clip(&dir, "lobby.mp4", 1000);
    let trigger = RemoteTrigger::new(MirageClient::with_base_url(server.uri()).unwrap());

    let mut session = CompareSession::new();
    session.select(&clip).await.unwrap();
    let processed = session.process(&trigger).await.unwrap();

    assert_eq!(processed.data.file_size, 400);
    assert!(processed.data.bitrate_data.is_empty());
    // Original keeps its placeholder table
    assert_eq!(session.original().map(|o| o.data.codec.as_str()), Some("..."));
}

#[tokio::test]
async fn test_remote_trigger_failure_resets_processed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "Invalid video file"})),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let clip = write_clip(&dir, "lobby.mp4", 1000);
    let trigger = RemoteTrigger::new(MirageClient::with_base_url(server.uri()).unwrap());

    let mut session = CompareSession::new();
    session.select(&clip).await.unwrap();
    let err = session.process(&trigger).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(session.processed().is_none());
    assert!(!session.is_processing());
}
