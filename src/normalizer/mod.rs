//! Classifier response normalization.
//!
//! The external classifier's response shape is not contractually fixed, so
//! normalization is an ordered chain of pure extractors, each returning
//! either a populated result or no match. The first strategy that matches
//! wins:
//!
//! 1. a single "best" object: `{"best": {"label": "...", "score": 0.9}}`
//! 2. a list of per-segment results under `predictions` or `results`
//!
//! Normalization never fails: a payload that is not structured at all is an
//! empty result, non-numeric scores become absent, and segments without a
//! usable confidence are dropped and counted rather than raised.

use crate::survey_store::SegmentResult;
use serde_json::{json, Value};

/// Parse a response body fail-soft: anything that is not valid JSON degrades
/// to a raw-echo object so the body is still auditable.
pub fn safe_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// Result of normalizing one classifier payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalization {
    /// Canonical per-segment records, each with a usable confidence.
    pub segments: Vec<SegmentResult>,
    /// Segments discarded for an unparseable or implausible confidence.
    pub dropped_segments: usize,
}

type Extractor = fn(&Value) -> Option<Normalization>;

/// Extraction strategies in priority order.
const EXTRACTORS: &[Extractor] = &[extract_best, extract_top_prediction, extract_segment_results];

/// Normalize an arbitrary classifier payload into canonical segment records.
///
/// Pure and idempotent: the same payload always yields the same result.
pub fn normalize(payload: &Value) -> Normalization {
    EXTRACTORS
        .iter()
        .find_map(|extract| extract(payload))
        .unwrap_or_default()
}

/// Best label/score pair for audit metadata, using the same strategies.
///
/// Unlike segment confidence, the audit score is echoed without a
/// plausibility gate; it is never used for aggregation.
pub fn best_of(payload: &Value) -> Option<(String, Option<f64>)> {
    let obj = payload.as_object()?;
    if let Some(best) = obj.get("best").and_then(Value::as_object) {
        if let Some(label) = field_string(best, &["label", "taxon_code", "species"]) {
            let score = best.get("score").and_then(parse_number);
            return Some((label, score));
        }
    }
    let list = prediction_list(payload)?;
    let top = list.first()?.as_object()?;
    let label = field_string(top, &["label", "taxon_code", "species"])?;
    let score = field_number(top, &["score", "confidence"]);
    Some((label, score))
}

/// Strategy 1: a single best-of object with a usable label.
fn extract_best(payload: &Value) -> Option<Normalization> {
    let best = payload.as_object()?.get("best")?.as_object()?;
    let label = field_string(best, &["label", "taxon_code", "species"])?;
    let segment = SegmentResult {
        label: Some(label),
        scientific_name: field_string(best, &["scientific_name"]),
        common_name: field_string(best, &["common_name"]),
        confidence: best.get("score").and_then(parse_confidence),
    };
    Some(retain_usable(vec![segment]))
}

/// Strategy 2: a `predictions` list of ranked alternatives for the clip.
///
/// The elements compete for the same audio, so only the top-ranked one
/// becomes a segment; folding all of them would inflate the segment totals.
fn extract_top_prediction(payload: &Value) -> Option<Normalization> {
    let list = non_empty_array(payload, "predictions")?;
    let mut out = Normalization::default();
    push_entry(&list[0], &mut out);
    Some(out)
}

/// Strategy 3: a `results` list with one entry per audio segment.
///
/// Every element is normalized independently; none is discarded for lacking
/// a scientific or common name.
fn extract_segment_results(payload: &Value) -> Option<Normalization> {
    let list = non_empty_array(payload, "results")?;
    let mut out = Normalization::default();
    for entry in list {
        push_entry(entry, &mut out);
    }
    Some(out)
}

/// Fold one list element into the normalization. Non-object entries and
/// entries without a usable confidence are counted as dropped.
fn push_entry(entry: &Value, out: &mut Normalization) {
    let Some(obj) = entry.as_object() else {
        out.dropped_segments += 1;
        return;
    };
    let segment = SegmentResult {
        label: field_string(obj, &["label", "taxon_code", "species"]),
        scientific_name: field_string(obj, &["scientific_name"]),
        common_name: field_string(obj, &["common_name"]),
        confidence: obj
            .get("confidence")
            .or_else(|| obj.get("score"))
            .and_then(parse_confidence),
    };
    if segment.confidence.is_some() {
        out.segments.push(segment);
    } else {
        out.dropped_segments += 1;
    }
}

fn non_empty_array<'a>(payload: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    let list = payload.as_object()?.get(key)?.as_array()?;
    (!list.is_empty()).then_some(list)
}

fn prediction_list(payload: &Value) -> Option<&Vec<Value>> {
    ["predictions", "results"]
        .iter()
        .find_map(|key| non_empty_array(payload, key))
}

fn retain_usable(segments: Vec<SegmentResult>) -> Normalization {
    let mut out = Normalization::default();
    for segment in segments {
        if segment.confidence.is_some() {
            out.segments.push(segment);
        } else {
            out.dropped_segments += 1;
        }
    }
    out
}

/// First present non-empty string among `keys`.
fn field_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn field_number(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(parse_number)
}

/// Soft numeric coercion: numbers and numeric strings, anything else absent.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric coercion plus the plausibility gate for segment confidence:
/// values outside [0, 1] (or non-finite) are absent, never clamped.
fn parse_confidence(value: &Value) -> Option<f64> {
    parse_number(value).filter(|c| c.is_finite() && (0.0..=1.0).contains(c))
}
