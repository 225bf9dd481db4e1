//! Field-observation ingestion: one JSONL batch file, one row per line,
//! deduplicated by `(source, line index)` so replaying a batch is safe.

use super::RunSummary;
use crate::normalizer::safe_json;
use crate::survey_store::{ObservationRecord, ObservationStore};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use tracing::info;

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_of<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = payload.as_object()?;
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Pull a taxon code and coordinates out of an arbitrary observation
/// payload. Upstream producers disagree on field names; every known
/// spelling is tried in a fixed order, top-level keys before nested
/// location objects.
pub fn extract_taxon_and_geo(payload: &Value) -> (Option<String>, Option<f64>, Option<f64>) {
    let taxon = first_of(
        payload,
        &[
            "taxon_code",
            "taxonCode",
            "species_code",
            "speciesCode",
            "taxon",
            "species",
            "code",
        ],
    )
    .and_then(value_string);

    let mut lat = first_of(payload, &["lat", "latitude"]).and_then(value_float);
    let mut lon = first_of(payload, &["lon", "lng", "longitude", "long"]).and_then(value_float);

    if let Some(loc) = first_of(payload, &["location", "geo", "coordinates"]) {
        if loc.is_object() {
            lat = lat.or_else(|| first_of(loc, &["lat", "latitude"]).and_then(value_float));
            lon = lon.or_else(|| first_of(loc, &["lon", "lng", "longitude"]).and_then(value_float));
        }
    }

    (taxon, lat, lon)
}

/// Ingest a JSONL batch file. Malformed lines are kept as raw payloads
/// rather than dropped, so nothing silently disappears from the record.
pub fn run_ingest_observations(
    store: &dyn ObservationStore,
    batch_path: &Path,
    source: &str,
) -> Result<RunSummary> {
    let content = std::fs::read_to_string(batch_path)
        .with_context(|| format!("failed to read observation batch {:?}", batch_path))?;

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    info!("Observation batch lines collected: {}", lines.len());

    let mut summary = RunSummary::default();

    for (i, line) in lines.iter().enumerate() {
        let payload = safe_json(line);
        let (taxon_code, lat, lon) = extract_taxon_and_geo(&payload);

        let record = ObservationRecord {
            source: source.to_string(),
            seq: i as i64,
            taxon_code,
            lat,
            lon,
            ingested_at: Utc::now(),
            payload,
        };

        if store.insert_observation_if_absent(&record)? {
            summary.processed += 1;
        } else {
            summary.skipped += 1;
        }
    }

    info!("Observation ingest finished: {}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey_store::SqliteSurveyStore;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_extract_prefers_first_matching_key() {
        let payload = json!({"taxon_code": "erithacus_rubecula", "species": "other"});
        let (taxon, _, _) = extract_taxon_and_geo(&payload);
        assert_eq!(taxon.as_deref(), Some("erithacus_rubecula"));
    }

    #[test]
    fn test_extract_falls_back_through_key_spellings() {
        let payload = json!({"speciesCode": "parus_major"});
        let (taxon, _, _) = extract_taxon_and_geo(&payload);
        assert_eq!(taxon.as_deref(), Some("parus_major"));
    }

    #[test]
    fn test_extract_numeric_taxon_code_is_stringified() {
        let payload = json!({"code": 4711});
        let (taxon, _, _) = extract_taxon_and_geo(&payload);
        assert_eq!(taxon.as_deref(), Some("4711"));
    }

    #[test]
    fn test_extract_coordinates_top_level_and_nested() {
        let payload = json!({"lat": 45.07, "lng": 7.68});
        let (_, lat, lon) = extract_taxon_and_geo(&payload);
        assert_eq!(lat, Some(45.07));
        assert_eq!(lon, Some(7.68));

        let nested = json!({"location": {"latitude": "44.5", "lon": 8.0}});
        let (_, lat, lon) = extract_taxon_and_geo(&nested);
        assert_eq!(lat, Some(44.5));
        assert_eq!(lon, Some(8.0));
    }

    #[test]
    fn test_extract_top_level_wins_over_nested() {
        let payload = json!({"lat": 1.0, "geo": {"lat": 2.0, "lon": 3.0}});
        let (_, lat, lon) = extract_taxon_and_geo(&payload);
        assert_eq!(lat, Some(1.0));
        assert_eq!(lon, Some(3.0));
    }

    #[test]
    fn test_extract_nothing_from_garbage() {
        let (taxon, lat, lon) = extract_taxon_and_geo(&json!("not an object"));
        assert!(taxon.is_none() && lat.is_none() && lon.is_none());
    }

    #[test]
    fn test_reingesting_the_same_batch_inserts_nothing() {
        let dir = tempdir().unwrap();
        let batch = dir.path().join("batch.jsonl");
        std::fs::write(
            &batch,
            concat!(
                "{\"taxon_code\":\"erithacus_rubecula\",\"lat\":45.0,\"lon\":7.6}\n",
                "not json at all\n",
                "\n",
                "{\"species\":\"parus_major\"}\n",
            ),
        )
        .unwrap();

        let store = SqliteSurveyStore::in_memory().unwrap();
        let first = run_ingest_observations(&store, &batch, "field-app").unwrap();
        // Blank line skipped, malformed line kept as raw payload.
        assert_eq!(first.processed, 3);
        assert_eq!(first.skipped, 0);
        assert_eq!(store.count_by_taxon_code("erithacus_rubecula").unwrap(), 1);

        let second = run_ingest_observations(&store, &batch, "field-app").unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(store.count_by_taxon_code("erithacus_rubecula").unwrap(), 1);
    }
}
