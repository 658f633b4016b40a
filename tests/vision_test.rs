//! Integration tests for the Vision client against a local HTTP stub.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use secrecy::SecretString;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use visionq::analysis::vision::{VisionClient, VisionConfig};
use visionq::analysis::{AnalysisOutcome, Analyzer};

const API_KEY: &str = "test-key-5f2a9c";
const IMAGE: &[u8] = b"\xff\xd8\xff\xe0 not really a jpeg";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One captured HTTP request.
struct Captured {
    request_line: String,
    body: Value,
}

/// Serve a single connection: read one request, wait `delay`, then answer.
async fn serve_once(
    status_line: &'static str,
    body: &'static str,
    delay: Duration,
) -> (SocketAddr, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;

        tokio::time::sleep(delay).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        // The client may have given up already.
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        captured
    });

    (addr, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>().unwrap())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body");
        buf.extend_from_slice(&chunk[..n]);
    }

    Captured {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap(),
    }
}

fn client(endpoint: String, timeout: Duration) -> VisionClient {
    VisionClient::new(VisionConfig {
        endpoint,
        api_key: SecretString::from(API_KEY),
        features: vec!["DOCUMENT_TEXT_DETECTION".to_string()],
        timeout,
    })
    .unwrap()
}

fn image_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, IMAGE).unwrap();
    file
}

fn fatal_reason(outcome: AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::FatalServiceFailure(reason) => reason,
        other => panic!("expected fatal failure, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forbidden_is_transient_and_request_is_well_formed() {
    let (addr, server) = serve_once(
        "403 Forbidden",
        r#"{"error":{"code":403,"message":"billing disabled"}}"#,
        Duration::ZERO,
    )
    .await;
    let image = image_file();

    let outcome = client(format!("http://{addr}"), Duration::from_secs(5))
        .analyze(image.path())
        .await;

    assert_eq!(outcome, AnalysisOutcome::TransientServiceFailure(403));

    let captured = server.await.unwrap();
    assert!(
        captured
            .request_line
            .starts_with(&format!("POST /v1/images:annotate?key={API_KEY} ")),
        "{}",
        captured.request_line
    );
    let request = &captured.body["requests"][0];
    assert_eq!(
        request["image"]["content"],
        base64::engine::general_purpose::STANDARD.encode(IMAGE)
    );
    assert_eq!(request["features"][0]["type"], "DOCUMENT_TEXT_DETECTION");
}

#[tokio::test]
async fn annotation_response_is_success() {
    let (addr, server) = serve_once(
        "200 OK",
        r#"{"responses":[{"fullTextAnnotation":{"text":"total 12.50"}}]}"#,
        Duration::ZERO,
    )
    .await;
    let image = image_file();

    let outcome = client(format!("http://{addr}/"), Duration::from_secs(5))
        .analyze(image.path())
        .await;

    match outcome {
        AnalysisOutcome::Success(value) => {
            assert_eq!(value["fullTextAnnotation"]["text"], "total 12.50");
        }
        other => panic!("expected success, got {other:?}"),
    }
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Failures that never reach a response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stalled_service_times_out() {
    let (addr, _server) = serve_once("200 OK", r#"{"responses":[]}"#, Duration::from_secs(5)).await;
    let image = image_file();

    let outcome = client(format!("http://{addr}"), Duration::from_millis(300))
        .analyze(image.path())
        .await;

    let reason = fatal_reason(outcome);
    assert_eq!(reason, "request timed out");
    assert!(!reason.contains(API_KEY));
}

#[tokio::test]
async fn connection_error_keeps_key_out_of_reason() {
    // Bind then drop, so the port is closed.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let image = image_file();

    let outcome = client(format!("http://{addr}"), Duration::from_secs(5))
        .analyze(image.path())
        .await;

    let reason = fatal_reason(outcome);
    assert!(reason.starts_with("request failed"), "{reason}");
    assert!(!reason.contains(API_KEY), "{reason}");
}

#[tokio::test]
async fn unreadable_image_is_fatal_without_a_request() {
    let outcome = client("http://127.0.0.1:9".to_string(), Duration::from_secs(5))
        .analyze(Path::new("/nonexistent/visionq/photo1.jpg"))
        .await;

    let reason = fatal_reason(outcome);
    assert!(reason.starts_with("cannot read image"), "{reason}");
}
