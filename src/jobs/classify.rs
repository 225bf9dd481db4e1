//! Classification job: run every registered recording through the external
//! classifier and commit exactly one outcome per recording.

use super::RunSummary;
use crate::blob_store::BlobStore;
use crate::classifier::Classifier;
use crate::normalizer;
use crate::survey_store::{
    ClassificationOutcome, OutcomeStore, RecordingDescriptor, RecordingStore, ResponseMeta,
    StoreError, TaxonomyStore,
};
use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

/// Classify all registered recordings that have no stored outcome yet.
///
/// Per-recording failures (missing blob, transport error) are isolated: the
/// batch continues and the failure is counted. A transport failure still
/// commits an outcome with a non-ok envelope, so the attempt is on record
/// and the recording is not retried forever; only infrastructure failures
/// before the classifier call (blob fetch) leave the recording unclassified.
pub async fn run_classify<S>(
    store: &S,
    blob: &dyn BlobStore,
    classifier: &dyn Classifier,
) -> Result<RunSummary>
where
    S: RecordingStore + OutcomeStore + TaxonomyStore,
{
    let recordings = store.list_recordings()?;
    info!("Found {} registered recordings", recordings.len());

    let mut summary = RunSummary::default();

    for recording in &recordings {
        if store.is_classified(&recording.recording_id)? {
            debug!("Skip {} (already classified)", recording.filename);
            summary.skipped += 1;
            continue;
        }

        let audio = match blob.get(&recording.object_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Blob fetch failed for {} ({}): {}",
                    recording.filename, recording.object_key, e
                );
                summary.failed += 1;
                continue;
            }
        };

        let response = classifier.classify(&recording.filename, audio).await;
        let parsed = normalizer::safe_json(&response.body);

        // Audit log to the blob store, best effort: losing the log never
        // loses the outcome.
        let log_key = format!("logs/classify/{}.json", recording.recording_id);
        write_audit_log(blob, &log_key, recording, &response, &parsed);

        let normalization = normalizer::normalize(&parsed);
        if normalization.dropped_segments > 0 {
            debug!(
                "{}: dropped {} segments without usable confidence",
                recording.filename, normalization.dropped_segments
            );
        }

        let best = normalizer::best_of(&parsed);
        let (best_label, best_score) = match best {
            Some((label, score)) => (Some(label), score),
            None => (None, None),
        };
        let taxonomy = match best_label.as_deref() {
            Some(label) => store.lookup_taxon(label)?,
            None => None,
        };

        let outcome = ClassificationOutcome {
            recording_id: recording.recording_id.clone(),
            filename: recording.filename.clone(),
            object_key: recording.object_key.clone(),
            lat: recording.lat,
            lon: recording.lon,
            created_at: Utc::now(),
            log_key,
            http: ResponseMeta {
                status_code: response.status_code,
                ok: response.ok,
                requested_at: response.requested_at,
                received_at: response.received_at,
            },
            best_label: best_label.clone(),
            best_score,
            taxonomy,
            segments: normalization.segments,
            raw: parsed,
        };

        match store.insert_outcome(&outcome) {
            Ok(()) => {
                info!(
                    "Classified {} -> best={:?} score={:?}",
                    recording.filename, best_label, best_score
                );
                summary.processed += 1;
            }
            // Another run committed first; the stored outcome wins.
            Err(StoreError::Conflict(_)) => {
                debug!("Skip {} (classified concurrently)", recording.filename);
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Classification finished: {}", summary);
    Ok(summary)
}

fn write_audit_log(
    blob: &dyn BlobStore,
    log_key: &str,
    recording: &RecordingDescriptor,
    response: &crate::classifier::ClassifierResponse,
    parsed: &serde_json::Value,
) {
    let log_doc = json!({
        "request": {
            "recording_id": recording.recording_id,
            "object_key": recording.object_key,
            "filename": recording.filename,
            "lat": recording.lat,
            "lon": recording.lon,
            "requested_at": response.requested_at.to_rfc3339(),
        },
        "response": {
            "status_code": response.status_code,
            "ok": response.ok,
            "received_at": response.received_at.to_rfc3339(),
        },
        "parsed": parsed,
    });
    let bytes = log_doc.to_string().into_bytes();
    if let Err(e) = blob.put(log_key, &bytes, "application/json") {
        warn!("Could not store audit log {}: {}", log_key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::FsBlobStore;
    use crate::classifier::ClassifierResponse;
    use crate::survey_store::SqliteSurveyStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StubClassifier {
        body: String,
        ok: bool,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _filename: &str, _audio: Vec<u8>) -> ClassifierResponse {
            ClassifierResponse {
                status_code: Some(if self.ok { 200 } else { 500 }),
                ok: self.ok,
                body: self.body.clone(),
                requested_at: Utc::now(),
                received_at: Utc::now(),
            }
        }
    }

    fn register(
        store: &SqliteSurveyStore,
        blob: &FsBlobStore,
        recording_id: &str,
        with_blob: bool,
    ) {
        let object_key = format!("audio/{}.wav", recording_id);
        if with_blob {
            blob.put(&object_key, b"audio-bytes", "application/octet-stream")
                .unwrap();
        }
        store
            .insert_recording(&RecordingDescriptor {
                recording_id: recording_id.to_string(),
                object_key,
                filename: format!("{}.wav", recording_id),
                lat: Some(45.0),
                lon: Some(7.6),
                uploaded_at: Utc::now(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_classifies_and_stores_outcome() {
        let bucket = tempdir().unwrap();
        let store = SqliteSurveyStore::in_memory().unwrap();
        let blob = FsBlobStore::new(bucket.path());
        register(&store, &blob, "rec1", true);

        let classifier = StubClassifier {
            body: r#"{"predictions":[{"label":"robin","score":0.8}]}"#.to_string(),
            ok: true,
        };
        let summary = run_classify(&store, &blob, &classifier).await.unwrap();
        assert_eq!(summary.processed, 1);

        let outcome = store.get_outcome("rec1").unwrap().unwrap();
        assert_eq!(outcome.best_label.as_deref(), Some("robin"));
        assert_eq!(outcome.best_score, Some(0.8));
        assert_eq!(outcome.segments.len(), 1);
        assert!(outcome.http.ok);
        // Audit log was written
        assert!(blob.get("logs/classify/rec1.json").is_ok());
    }

    #[tokio::test]
    async fn test_second_run_skips_classified_recordings() {
        let bucket = tempdir().unwrap();
        let store = SqliteSurveyStore::in_memory().unwrap();
        let blob = FsBlobStore::new(bucket.path());
        register(&store, &blob, "rec1", true);

        let classifier = StubClassifier {
            body: r#"{"best":{"label":"robin","score":0.9}}"#.to_string(),
            ok: true,
        };
        run_classify(&store, &blob, &classifier).await.unwrap();
        let second = run_classify(&store, &blob, &classifier).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn test_missing_blob_does_not_block_the_batch() {
        let bucket = tempdir().unwrap();
        let store = SqliteSurveyStore::in_memory().unwrap();
        let blob = FsBlobStore::new(bucket.path());
        register(&store, &blob, "missing", false);
        register(&store, &blob, "present", true);

        let classifier = StubClassifier {
            body: r#"{"best":{"label":"robin","score":0.9}}"#.to_string(),
            ok: true,
        };
        let summary = run_classify(&store, &blob, &classifier).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert!(store.get_outcome("missing").unwrap().is_none());
        assert!(store.get_outcome("present").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_still_commits_a_non_ok_outcome() {
        let bucket = tempdir().unwrap();
        let store = SqliteSurveyStore::in_memory().unwrap();
        let blob = FsBlobStore::new(bucket.path());
        register(&store, &blob, "rec1", true);

        let classifier = StubClassifier {
            body: "connection refused".to_string(),
            ok: false,
        };
        let summary = run_classify(&store, &blob, &classifier).await.unwrap();
        assert_eq!(summary.processed, 1);

        let outcome = store.get_outcome("rec1").unwrap().unwrap();
        assert!(!outcome.http.ok);
        assert!(outcome.best_label.is_none());
        assert!(outcome.segments.is_empty());
        // The unparseable body is still echoed for audit.
        assert_eq!(outcome.raw["raw"], "connection refused");
    }
}
