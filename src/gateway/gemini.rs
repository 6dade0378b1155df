//! Google Gemini gateway: probes models via the generativelanguage
//! REST API with a one-token "ping" generation.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::time::{Duration, Instant};

use super::{ProbeFailure, ProbeGateway, ProbeOutcome};
use crate::catalog::ContentType;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiGateway {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// One minimal generation. Only a 2xx response is `Ok`.
    async fn ping(&self, credential: &str, model_id: &str) -> Result<(), ProbeFailure> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model_id);
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": "ping"}]}],
            "generationConfig": {"maxOutputTokens": 1}
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(parse_error_response(status.as_u16(), &body))
    }
}

impl Default for GeminiGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Image and video endpoints reject text pings and real generations are
/// slow and expensive, so they are not deep-checked.
fn is_media_model(model_id: &str) -> bool {
    ContentType::of(model_id).is_media()
}

#[async_trait]
impl ProbeGateway for GeminiGateway {
    fn provider_id(&self) -> &str {
        "google"
    }

    async fn probe(&self, credential: &str, model_id: &str) -> ProbeOutcome {
        let start = Instant::now();

        if is_media_model(model_id) {
            let wait = rand::thread_rng().gen_range(200..500);
            tokio::time::sleep(Duration::from_millis(wait)).await;
            return ProbeOutcome::online(elapsed_ms(start));
        }

        match self.ping(credential, model_id).await {
            Ok(()) => ProbeOutcome::online(elapsed_ms(start)),
            Err(failure) => {
                let latency = elapsed_ms(start);
                let status = failure.classify();
                tracing::warn!(
                    model = model_id,
                    latency_ms = latency,
                    ?status,
                    "Probe failed: {}",
                    failure
                );
                ProbeOutcome { status, latency_ms: latency }
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    (start.elapsed().as_secs_f64() * 1000.0).round() as u64
}

/// Parse a Google error body into a structured failure.
fn parse_error_response(status: u16, body: &str) -> ProbeFailure {
    let parsed: Value = serde_json::from_str(body).unwrap_or_default();
    let error = &parsed["error"];

    let error_type = error["status"].as_str().unwrap_or("UNKNOWN").to_string();
    let message = error["message"].as_str().unwrap_or(body);

    ProbeFailure::Rejected {
        status,
        error_type,
        message: message.chars().take(500).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ProbeStatus;

    #[test]
    fn test_parse_google_error_body() {
        let body = r#"{"error":{"code":400,"message":"Model does not support text","status":"INVALID_ARGUMENT"}}"#;
        match parse_error_response(400, body) {
            ProbeFailure::Rejected { status, error_type, message } => {
                assert_eq!(status, 400);
                assert_eq!(error_type, "INVALID_ARGUMENT");
                assert_eq!(message, "Model does not support text");
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[test]
    fn test_parse_non_json_body() {
        let failure = parse_error_response(503, "upstream unavailable");
        assert_eq!(failure.classify(), ProbeStatus::Offline);
        assert!(failure.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn test_media_model_detection() {
        assert!(is_media_model("veo-2.0-generate-001"));
        assert!(is_media_model("gemini-2.0-flash-exp-image-generation"));
        assert!(!is_media_model("gemini-1.5-pro"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_offline() {
        let gateway = GeminiGateway::with_base_url("http://127.0.0.1:1/");
        let outcome = gateway.probe("AIzaTestCredential", "gemini-1.5-flash").await;
        assert_eq!(outcome.status, ProbeStatus::Offline);
    }

    #[tokio::test]
    async fn test_media_model_skips_network() {
        let gateway = GeminiGateway::with_base_url("http://127.0.0.1:1");
        let outcome = gateway.probe("AIzaTestCredential", "veo-2.0-generate-001").await;
        assert_eq!(outcome.status, ProbeStatus::Online);
        assert!(outcome.latency_ms >= 200);
    }
}
