//! Data models for the survey store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded recording, identified by a content hash of the audio bytes.
///
/// Created at upload time and immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingDescriptor {
    /// Sha-256 hex digest of the audio bytes.
    pub recording_id: String,
    /// Blob store key where the audio lives (`audio/{id}{ext}`).
    pub object_key: String,
    /// Display filename as found in the source directory.
    pub filename: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

/// One predicted label for one audio segment.
///
/// Confidence is expected in [0, 1]; out-of-range or non-numeric values are
/// absent, never clamped. Segments without a confidence never participate in
/// aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl SegmentResult {
    /// Canonical grouping key: trimmed scientific name if non-empty, else
    /// trimmed label, else `"unknown"`. Deterministic so aggregation is
    /// reproducible across reruns.
    pub fn species_key(&self) -> String {
        if let Some(s) = self.scientific_name.as_deref() {
            let s = s.trim();
            if !s.is_empty() {
                return s.to_string();
            }
        }
        if let Some(l) = self.label.as_deref() {
            let l = l.trim();
            if !l.is_empty() {
                return l.to_string();
            }
        }
        "unknown".to_string()
    }
}

/// Taxonomy names resolved for an outcome's best label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonNames {
    pub latin_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
}

/// HTTP request/response metadata recorded alongside an outcome.
///
/// Persisted column-wise by the store, not as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    /// HTTP status code, absent when the request never completed.
    pub status_code: Option<u16>,
    /// True only for a completed 2xx response.
    pub ok: bool,
    pub requested_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// The stored result of classifying one recording.
///
/// Exactly one outcome may exist per recording id; the store's unique index
/// enforces this. Outcomes are never mutated or deleted in normal operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub recording_id: String,
    pub filename: String,
    pub object_key: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// Blob key of the request/response audit log.
    pub log_key: String,
    pub http: ResponseMeta,
    pub best_label: Option<String>,
    pub best_score: Option<f64>,
    pub taxonomy: Option<TaxonNames>,
    /// Canonical per-segment records (only segments with usable confidence).
    pub segments: Vec<SegmentResult>,
    /// Raw payload echo for audit.
    pub raw: serde_json::Value,
}

/// One field observation from the observation source.
///
/// Used only as an auxiliary corroboration count; never merged into the
/// per-species confidence math.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub source: String,
    /// Monotonically increasing per-run sequence number within the source.
    pub seq: i64,
    pub taxon_code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub ingested_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// One taxonomy row, keyed by a stable taxon code.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonEntry {
    pub taxon_code: String,
    pub latin_name: String,
    pub common_name: Option<String>,
    pub family: Option<String>,
    pub order: Option<String>,
    pub source: String,
    pub seeded_at: DateTime<Utc>,
}
