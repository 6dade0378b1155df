//! Model catalog: static metadata for every model endpoint we probe.
//!
//! Each entry carries the rate limits Google publishes for the free and
//! paid tiers. Nothing here is enforced; the limits are reported next to
//! session usage so a dashboard can show how close a project is to them.

use serde::Serialize;

// ── Enums ───────────────────────────────────────────────────────────

/// What kind of content a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
}

impl ContentType {
    /// Infer the output kind from a model id (`veo-*` is video,
    /// `*image*` is image, anything else text).
    pub fn of(model_id: &str) -> Self {
        if model_id.contains("veo") {
            ContentType::Video
        } else if model_id.contains("image") {
            ContentType::Image
        } else {
            ContentType::Text
        }
    }

    pub fn is_media(self) -> bool {
        self != ContentType::Text
    }
}

/// Paid-tier daily limits are uncapped (`None`) for every current
/// model; that serializes as the string `"Unlimited"`.
fn serialize_daily_limit<S: serde::Serializer>(
    limit: &Option<u32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match limit {
        Some(n) => serializer.serialize_u32(*n),
        None => serializer.serialize_str("Unlimited"),
    }
}

// ── Model Descriptor ────────────────────────────────────────────────

/// Static description of a model endpoint and its declared limits.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Model identifier for API calls (e.g., "gemini-2.0-flash")
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    pub description: &'static str,
    /// Requests per minute, free tier
    pub rpm_limit_free: u32,
    /// Requests per minute, paid tier
    pub rpm_limit_paid: u32,
    /// Tokens per minute, free tier
    pub tpm_limit_free: u64,
    /// Tokens per minute, paid tier
    pub tpm_limit_paid: u64,
    /// Requests per day, free tier
    pub rpd_limit_free: u32,
    /// Requests per day, paid tier; `None` when uncapped
    #[serde(serialize_with = "serialize_daily_limit")]
    pub rpd_limit_paid: Option<u32>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
}

// ── Static Catalog ──────────────────────────────────────────────────

/// Every model the dashboard tracks, in display order.
pub static CORE_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "gemini-2.0-flash",
        name: "Gemini 2.0 Flash",
        description: "Next-gen multimodal model with superior performance.",
        rpm_limit_free: 10,
        rpm_limit_paid: 2_000,
        tpm_limit_free: 1_000_000,
        tpm_limit_paid: 4_000_000,
        rpd_limit_free: 1_500,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-2.0-flash-lite-preview-02-05",
        name: "Gemini 2.0 Flash Lite",
        description: "Optimized for cost-efficiency and low latency.",
        rpm_limit_free: 30,
        rpm_limit_paid: 2_000,
        tpm_limit_free: 1_000_000,
        tpm_limit_paid: 4_000_000,
        rpd_limit_free: 1_500,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-1.5-flash",
        name: "Gemini 1.5 Flash",
        description: "Fast, cost-efficient multimodal model.",
        rpm_limit_free: 15,
        rpm_limit_paid: 2_000,
        tpm_limit_free: 1_000_000,
        tpm_limit_paid: 4_000_000,
        rpd_limit_free: 1_500,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-1.5-pro",
        name: "Gemini 1.5 Pro",
        description: "Mid-size multimodal model for complex tasks.",
        rpm_limit_free: 2,
        rpm_limit_paid: 360,
        tpm_limit_free: 32_000,
        tpm_limit_paid: 2_000_000,
        rpd_limit_free: 50,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-1.5-flash-8b",
        name: "Gemini 1.5 Flash-8B",
        description: "High volume, low intelligence tasks.",
        rpm_limit_free: 15,
        rpm_limit_paid: 4_000,
        tpm_limit_free: 1_000_000,
        tpm_limit_paid: 4_000_000,
        rpd_limit_free: 1_500,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-3-flash-preview",
        name: "Gemini 3.0 Flash",
        description: "Experimental next-gen flash model.",
        rpm_limit_free: 15,
        rpm_limit_paid: 1_000,
        tpm_limit_free: 1_000_000,
        tpm_limit_paid: 4_000_000,
        rpd_limit_free: 1_500,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
    ModelDescriptor {
        id: "gemini-3-pro-preview",
        name: "Gemini 3.0 Pro",
        description: "Experimental next-gen pro model.",
        rpm_limit_free: 2,
        rpm_limit_paid: 360,
        tpm_limit_free: 32_000,
        tpm_limit_paid: 2_000_000,
        rpd_limit_free: 50,
        rpd_limit_paid: None,
        content_type: ContentType::Text,
    },
];

// ── Catalog API ─────────────────────────────────────────────────────

/// Look up a model by its API identifier.
pub fn get_model(id: &str) -> Option<&'static ModelDescriptor> {
    CORE_MODELS.iter().find(|m| m.id == id)
}

/// Models whose name or id contains `query`, case-insensitively.
/// An empty query matches everything.
pub fn search(query: &str) -> Vec<&'static ModelDescriptor> {
    let needle = query.trim().to_lowercase();
    CORE_MODELS
        .iter()
        .filter(|m| {
            needle.is_empty()
                || m.name.to_lowercase().contains(&needle)
                || m.id.to_lowercase().contains(&needle)
        })
        .collect()
}
