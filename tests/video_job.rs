//! End-to-end orchestrator tests against a local mock of the long-running
//! video endpoints.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pyramid_keepers::api::types::{
    AspectRatio, GenerationMode, Resolution, VideoModel, VideoRequest,
};
use pyramid_keepers::api::{ApiError, VideoOrchestrator};

/// Serve each connection one request and close it, so the client cannot
/// pool connections across canned responses.
fn serve<F>(listener: TcpListener, handler: F)
where
    F: Fn(&str, &str) -> (u16, Vec<u8>) + Send + 'static,
{
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let Ok(clone) = stream.try_clone() else { continue };
            let mut reader = BufReader::new(clone);

            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or("").to_string();
            let path = parts.next().unwrap_or("").to_string();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).is_err() {
                    break;
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some(value) = trimmed
                    .to_ascii_lowercase()
                    .strip_prefix("content-length:")
                {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            if content_length > 0 {
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);
            }

            let (status, body) = handler(&method, &path);
            let reason = if status == 200 { "OK" } else { "Error" };
            let header = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status, reason, body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
    });
}

fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    (listener, base_url)
}

fn orchestrator(base_url: &str) -> VideoOrchestrator {
    let mut orchestrator = VideoOrchestrator::new("test-key");
    orchestrator.base_url = base_url.to_string();
    orchestrator.poll_interval = Duration::from_millis(50);
    orchestrator.max_wait = Duration::from_secs(5);
    orchestrator
}

fn text_request() -> VideoRequest {
    VideoRequest {
        prompt: "a glowing pyramid".to_string(),
        model: VideoModel::VeoFast,
        aspect_ratio: AspectRatio::Landscape16x9,
        resolution: Resolution::P720,
        mode: GenerationMode::TextToVideo,
    }
}

fn pending_job() -> Vec<u8> {
    serde_json::json!({ "name": "operations/job-1", "done": false })
        .to_string()
        .into_bytes()
}

#[test]
fn text_to_video_runs_submit_poll_fetch_to_a_local_file() {
    let (listener, base_url) = bind();
    let poll_hits = Arc::new(AtomicUsize::new(0));
    let polls = poll_hits.clone();
    let artifact_uri = format!("{}/files/clip%2Dfinal", base_url);

    serve(listener, move |method, path| {
        if method == "POST" && path.contains(":predictLongRunning") {
            (200, pending_job())
        } else if method == "GET" && path == "/v1beta/operations/job-1" {
            // First poll still running, second poll terminal.
            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                (200, pending_job())
            } else {
                let body = serde_json::json!({
                    "name": "operations/job-1",
                    "done": true,
                    "response": {
                        "generateVideoResponse": {
                            "generatedSamples": [
                                { "video": { "uri": artifact_uri } }
                            ]
                        }
                    }
                });
                (200, body.to_string().into_bytes())
            }
        } else if method == "GET" && path == "/files/clip-final" {
            (200, b"PYRAMIDVIDEO".to_vec())
        } else {
            (404, b"{}".to_vec())
        }
    });

    let cancel = AtomicBool::new(false);
    let result = orchestrator(&base_url)
        .generate(&text_request(), &cancel)
        .unwrap();

    assert_eq!(result.bytes, b"PYRAMIDVIDEO");
    // The percent-encoded URI was decoded before the fetch.
    assert!(result.uri.ends_with("/files/clip-final"));
    assert!(result.video.uri().unwrap().contains("clip%2Dfinal"));
    assert_eq!(poll_hits.load(Ordering::SeqCst), 2);

    assert!(result.path.exists());
    assert_eq!(std::fs::read(&result.path).unwrap(), b"PYRAMIDVIDEO");
    result.release();
    assert!(!result.path.exists());
}

#[test]
fn a_finished_job_with_no_videos_is_an_empty_result() {
    let (listener, base_url) = bind();
    let file_hits = Arc::new(AtomicUsize::new(0));
    let files = file_hits.clone();

    serve(listener, move |method, path| {
        if method == "POST" && path.contains(":predictLongRunning") {
            let body = serde_json::json!({
                "name": "operations/job-1",
                "done": true,
                "response": { "generateVideoResponse": { "generatedSamples": [] } }
            });
            (200, body.to_string().into_bytes())
        } else if path.starts_with("/files/") {
            files.fetch_add(1, Ordering::SeqCst);
            (200, Vec::new())
        } else {
            (404, b"{}".to_vec())
        }
    });

    let cancel = AtomicBool::new(false);
    let err = orchestrator(&base_url)
        .generate(&text_request(), &cancel)
        .unwrap_err();

    assert!(matches!(err, ApiError::EmptyResult(_)));
    assert_eq!(file_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn a_job_reporting_a_failure_payload_surfaces_the_remote_message() {
    let (listener, base_url) = bind();
    serve(listener, move |method, path| {
        if method == "POST" && path.contains(":predictLongRunning") {
            let body = serde_json::json!({
                "name": "operations/job-1",
                "done": true,
                "error": { "code": 8, "message": "quota exhausted" }
            });
            (200, body.to_string().into_bytes())
        } else {
            (404, b"{}".to_vec())
        }
    });

    let cancel = AtomicBool::new(false);
    let err = orchestrator(&base_url)
        .generate(&text_request(), &cancel)
        .unwrap_err();

    match err {
        ApiError::Remote(message) => assert!(message.contains("quota exhausted")),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn a_missing_artifact_reports_the_http_status() {
    let (listener, base_url) = bind();
    let artifact_uri = format!("{}/files/gone.mp4", base_url);

    serve(listener, move |method, path| {
        if method == "POST" && path.contains(":predictLongRunning") {
            let body = serde_json::json!({
                "name": "operations/job-1",
                "done": true,
                "response": {
                    "generateVideoResponse": {
                        "generatedSamples": [ { "video": { "uri": artifact_uri } } ]
                    }
                }
            });
            (200, body.to_string().into_bytes())
        } else {
            (404, b"not here".to_vec())
        }
    });

    let cancel = AtomicBool::new(false);
    let err = orchestrator(&base_url)
        .generate(&text_request(), &cancel)
        .unwrap_err();

    assert!(matches!(err, ApiError::HttpStatus(404)));
}

#[test]
fn a_cancelled_job_stops_before_the_first_poll() {
    let (listener, base_url) = bind();
    let poll_hits = Arc::new(AtomicUsize::new(0));
    let polls = poll_hits.clone();

    serve(listener, move |method, path| {
        if method == "POST" && path.contains(":predictLongRunning") {
            (200, pending_job())
        } else {
            polls.fetch_add(1, Ordering::SeqCst);
            (200, pending_job())
        }
    });

    let cancel = AtomicBool::new(true);
    let err = orchestrator(&base_url)
        .generate(&text_request(), &cancel)
        .unwrap_err();

    assert!(matches!(err, ApiError::Cancelled));
    assert_eq!(poll_hits.load(Ordering::SeqCst), 0);
}
