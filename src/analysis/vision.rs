//! Google Cloud Vision `images:annotate` client.

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use super::{AnalysisOutcome, Analyzer};
use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com";

/// Connection settings for the Vision API.
#[derive(Debug)]
pub struct VisionConfig {
    /// Base URL, without the `/v1/images:annotate` path.
    pub endpoint: String,
    pub api_key: SecretString,
    /// Feature types requested for every image, e.g. `DOCUMENT_TEXT_DETECTION`.
    pub features: Vec<String>,
    /// Upper bound on one annotate call, connect included.
    pub timeout: Duration,
}

/// Long-lived Vision API client. Built once at startup.
pub struct VisionClient {
    http: reqwest::Client,
    url: String,
    api_key: SecretString,
    features: Vec<String>,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self> {
        if config.features.is_empty() {
            return Err(Error::Config(
                "at least one vision feature must be requested".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            url: format!(
                "{}/v1/images:annotate",
                config.endpoint.trim_end_matches('/')
            ),
            api_key: config.api_key,
            features: config.features,
        })
    }

    fn request_body(&self, image: &[u8]) -> Value {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|feature| json!({ "type": feature }))
            .collect();

        json!({
            "requests": [{
                "image": { "content": base64::engine::general_purpose::STANDARD.encode(image) },
                "features": features,
            }]
        })
    }
}

impl Analyzer for VisionClient {
    async fn analyze(&self, path: &Path) -> AnalysisOutcome {
        let image = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return AnalysisOutcome::FatalServiceFailure(format!("cannot read image: {e}")),
        };

        let response = self
            .http
            .post(&self.url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&self.request_body(&image))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return AnalysisOutcome::FatalServiceFailure("request timed out".to_string());
            }
            // Strip the URL so the API key never lands in a comment.
            Err(e) => {
                return AnalysisOutcome::FatalServiceFailure(format!(
                    "request failed: {}",
                    e.without_url()
                ));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AnalysisOutcome::FatalServiceFailure(format!(
                    "failed to read response: {}",
                    e.without_url()
                ));
            }
        };

        debug!(status = status.as_u16(), bytes = body.len(), "vision response");
        classify_response(status, &body)
    }
}

/// Map an HTTP status and response body to an outcome.
pub fn classify_response(status: StatusCode, body: &str) -> AnalysisOutcome {
    if matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    ) {
        return AnalysisOutcome::TransientServiceFailure(status.as_u16());
    }

    if !status.is_success() {
        return AnalysisOutcome::FatalServiceFailure(format!(
            "HTTP {}: {}",
            status.as_u16(),
            error_message(body).unwrap_or_else(|| "no error message".to_string())
        ));
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return AnalysisOutcome::FatalServiceFailure(format!("invalid JSON: {e}")),
    };

    // One request in, one response out.
    let Some(annotation) = parsed
        .get("responses")
        .and_then(Value::as_array)
        .and_then(|responses| responses.first())
    else {
        return AnalysisOutcome::EmptyResult;
    };

    if let Some(error) = annotation.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return AnalysisOutcome::FatalServiceFailure(format!("vision error: {message}"));
    }

    match annotation.as_object() {
        Some(fields) if !fields.is_empty() => AnalysisOutcome::Success(annotation.clone()),
        _ => AnalysisOutcome::EmptyResult,
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_and_auth_statuses_are_transient() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert_eq!(
                classify_response(status, "{}"),
                AnalysisOutcome::TransientServiceFailure(status.as_u16())
            );
        }
    }

    #[test]
    fn server_error_is_fatal_with_message() {
        let body = r#"{"error":{"code":500,"message":"backend exploded"}}"#;
        match classify_response(StatusCode::INTERNAL_SERVER_ERROR, body) {
            AnalysisOutcome::FatalServiceFailure(reason) => {
                assert!(reason.contains("500"));
                assert!(reason.contains("backend exploded"));
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn empty_annotation_is_empty_result() {
        assert_eq!(
            classify_response(StatusCode::OK, r#"{"responses":[{}]}"#),
            AnalysisOutcome::EmptyResult
        );
        assert_eq!(
            classify_response(StatusCode::OK, r#"{"responses":[]}"#),
            AnalysisOutcome::EmptyResult
        );
        assert_eq!(
            classify_response(StatusCode::OK, "{}"),
            AnalysisOutcome::EmptyResult
        );
    }

    #[test]
    fn per_image_error_is_fatal() {
        let body = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        assert_eq!(
            classify_response(StatusCode::OK, body),
            AnalysisOutcome::FatalServiceFailure("vision error: Bad image data.".to_string())
        );
    }

    #[test]
    fn annotation_is_returned_as_success() {
        let body = r#"{"responses":[{"fullTextAnnotation":{"text":"hello"}}]}"#;
        match classify_response(StatusCode::OK, body) {
            AnalysisOutcome::Success(value) => {
                assert_eq!(value["fullTextAnnotation"]["text"], "hello");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_fatal() {
        assert!(matches!(
            classify_response(StatusCode::OK, "not json"),
            AnalysisOutcome::FatalServiceFailure(_)
        ));
    }

    #[test]
    fn client_requires_a_feature() {
        let config = VisionConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: SecretString::from("k"),
            features: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        assert!(VisionClient::new(config).is_err());
    }
}
