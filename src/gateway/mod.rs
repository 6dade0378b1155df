//! Probe gateway: provider-agnostic availability check.
//!
//! The orchestrator hands a gateway an opaque credential and a model id
//! and gets back a status and a latency. A gateway never fails: every
//! transport, auth, or quota error is folded into a status before it
//! leaves this module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gemini;

// ── Core Types ──────────────────────────────────────────────────────

/// The verdict of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
}

/// Result of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub latency_ms: u64,
}

impl ProbeOutcome {
    pub fn online(latency_ms: u64) -> Self {
        Self { status: ProbeStatus::Online, latency_ms }
    }

    pub fn offline(latency_ms: u64) -> Self {
        Self { status: ProbeStatus::Offline, latency_ms }
    }
}

/// Why a probe attempt did not come back clean.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint rejected probe ({status} {error_type}): {message}")]
    Rejected {
        status: u16,
        error_type: String,
        message: String,
    },
}

impl ProbeFailure {
    /// A model that rejects the minimal ping payload as an invalid
    /// argument still authenticated the credential, so it counts as online.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            ProbeFailure::Rejected { status, error_type, message } => {
                *status == 400
                    || error_type == "INVALID_ARGUMENT"
                    || message.contains("INVALID_ARGUMENT")
            }
            ProbeFailure::Transport(_) => false,
        }
    }

    pub fn classify(&self) -> ProbeStatus {
        if self.is_invalid_argument() {
            ProbeStatus::Online
        } else {
            ProbeStatus::Offline
        }
    }
}

// ── Gateway Trait ───────────────────────────────────────────────────

/// Anything that can check whether a model answers for a credential.
///
/// Implementations must always resolve and must never surface an error;
/// the orchestrator relies on that to clear in-flight state.
#[async_trait]
pub trait ProbeGateway: Send + Sync {
    /// Unique provider identifier (e.g., "google").
    fn provider_id(&self) -> &str;

    /// Perform one network attempt against `model_id` using `credential`.
    async fn probe(&self, credential: &str, model_id: &str) -> ProbeOutcome;
}
