//! End-to-end tests for the upload → classify → report pipeline.
//!
//! All collaborators are local: a temp-dir blob store, a file-backed sqlite
//! database and a stub classifier, so the tests exercise the real job code
//! paths without any network.

use async_trait::async_trait;
use birdpipe::blob_store::FsBlobStore;
use birdpipe::classifier::{Classifier, ClassifierResponse};
use birdpipe::jobs::{
    run_classify, run_healthcheck, run_ingest_observations, run_report, run_seed_taxa,
    run_upload, ReportParams,
};
use birdpipe::survey_store::{OutcomeStore, SqliteSurveyStore};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

/// Classifier stub answering from a filename-keyed response table.
struct TableClassifier {
    responses: HashMap<String, String>,
}

#[async_trait]
impl Classifier for TableClassifier {
    async fn classify(&self, filename: &str, _audio: Vec<u8>) -> ClassifierResponse {
        match self.responses.get(filename) {
            Some(body) => ClassifierResponse {
                status_code: Some(200),
                ok: true,
                body: body.clone(),
                requested_at: Utc::now(),
                received_at: Utc::now(),
            },
            None => ClassifierResponse {
                status_code: None,
                ok: false,
                body: "connection refused".to_string(),
                requested_at: Utc::now(),
                received_at: Utc::now(),
            },
        }
    }
}

struct TestEnv {
    _workdir: TempDir,
    store: SqliteSurveyStore,
    blob: FsBlobStore,
    audio_dir: std::path::PathBuf,
    out_dir: std::path::PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let workdir = TempDir::new().unwrap();
        let store = SqliteSurveyStore::open(workdir.path().join("survey.db")).unwrap();
        let blob = FsBlobStore::new(workdir.path().join("bucket"));
        let audio_dir = workdir.path().join("audio");
        let out_dir = workdir.path().join("out");
        std::fs::create_dir_all(&audio_dir).unwrap();
        TestEnv {
            _workdir: workdir,
            store,
            blob,
            audio_dir,
            out_dir,
        }
    }

    fn add_audio(&self, name: &str, content: &[u8]) {
        std::fs::write(self.audio_dir.join(name), content).unwrap();
    }
}

fn robin_body() -> String {
    r#"{"predictions":[
        {"label":"robin","scientific_name":"Erithacus rubecula","common_name":"European Robin","score":0.8}
    ]}"#
    .to_string()
}

#[tokio::test]
async fn test_full_pipeline_produces_single_species_row() {
    let env = TestEnv::new();
    env.add_audio("r1.wav", b"recording-one");
    env.add_audio("r2.wav", b"recording-two");
    env.add_audio("r3.wav", b"recording-three");

    run_healthcheck(&env.store, &env.blob).unwrap();

    let uploaded = run_upload(&env.store, &env.blob, &env.audio_dir, Some(45.0), Some(7.6)).unwrap();
    assert_eq!(uploaded.processed, 3);

    let classifier = TableClassifier {
        responses: ["r1.wav", "r2.wav", "r3.wav"]
            .iter()
            .map(|f| (f.to_string(), robin_body()))
            .collect(),
    };
    let classified = run_classify(&env.store, &env.blob, &classifier).await.unwrap();
    assert_eq!(classified.processed, 3);

    let params = ReportParams {
        threshold: 0.30,
        species: None,
        top_n: 0,
    };
    let (path, summary) = run_report(&env.store, &env.out_dir, &params).unwrap();
    assert_eq!(summary.processed, 1);

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    assert_eq!(
        header,
        "scientific_name,common_name,label,audio_files_count,positive_segments,\
         segments_total,max_confidence,avg_confidence,observations_count,sample_lat,sample_lon"
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("Erithacus rubecula,European Robin,robin,3,3,3,0.8,0.8,0,45,7.6"));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn test_rerunning_every_stage_is_idempotent() {
    let env = TestEnv::new();
    env.add_audio("r1.wav", b"recording-one");

    run_upload(&env.store, &env.blob, &env.audio_dir, None, None).unwrap();
    let reupload = run_upload(&env.store, &env.blob, &env.audio_dir, None, None).unwrap();
    assert_eq!(reupload.processed, 0);
    assert_eq!(reupload.skipped, 1);

    let classifier = TableClassifier {
        responses: [("r1.wav".to_string(), robin_body())].into_iter().collect(),
    };
    run_classify(&env.store, &env.blob, &classifier).await.unwrap();
    let reclassify = run_classify(&env.store, &env.blob, &classifier).await.unwrap();
    assert_eq!(reclassify.processed, 0);
    assert_eq!(reclassify.skipped, 1);

    let outcomes = env.store.list_outcomes().unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn test_classifier_outage_is_recorded_not_fatal() {
    let env = TestEnv::new();
    env.add_audio("good.wav", b"good-audio");
    env.add_audio("bad.wav", b"bad-audio");

    run_upload(&env.store, &env.blob, &env.audio_dir, None, None).unwrap();

    // Only good.wav is in the response table; bad.wav gets a transport error.
    let classifier = TableClassifier {
        responses: [("good.wav".to_string(), robin_body())].into_iter().collect(),
    };
    let summary = run_classify(&env.store, &env.blob, &classifier).await.unwrap();
    assert_eq!(summary.processed, 2);

    let outcomes = env.store.list_outcomes().unwrap();
    let failed = outcomes.iter().find(|o| o.filename == "bad.wav").unwrap();
    assert!(!failed.http.ok);
    assert!(failed.segments.is_empty());

    // The failed recording contributes nothing to the report.
    let params = ReportParams {
        threshold: 0.30,
        species: None,
        top_n: 0,
    };
    let (_, report) = run_report(&env.store, &env.out_dir, &params).unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn test_observations_corroborate_report_rows() {
    let env = TestEnv::new();
    env.add_audio("r1.wav", b"recording-one");
    run_upload(&env.store, &env.blob, &env.audio_dir, None, None).unwrap();

    // Best label matches the derived taxon code of the seeded species.
    let classifier = TableClassifier {
        responses: [(
            "r1.wav".to_string(),
            r#"{"best":{"label":"erithacus_rubecula","score":0.9}}"#.to_string(),
        )]
        .into_iter()
        .collect(),
    };

    let seed_path = env.audio_dir.parent().unwrap().join("taxa.json");
    std::fs::write(
        &seed_path,
        r#"[{"scientific_name": "Erithacus rubecula", "canonical_name": "European Robin",
            "rank": "SPECIES", "family": "Muscicapidae", "order": "Passeriformes"}]"#,
    )
    .unwrap();
    run_seed_taxa(&env.store, &seed_path, "export").unwrap();

    run_classify(&env.store, &env.blob, &classifier).await.unwrap();

    let batch_path = env.audio_dir.parent().unwrap().join("batch.jsonl");
    std::fs::write(
        &batch_path,
        "{\"taxon_code\":\"erithacus_rubecula\",\"lat\":45.0,\"lon\":7.6}\n\
         {\"taxon_code\":\"erithacus_rubecula\"}\n",
    )
    .unwrap();
    let ingested = run_ingest_observations(&env.store, &batch_path, "field-app").unwrap();
    assert_eq!(ingested.processed, 2);

    let params = ReportParams {
        threshold: 0.30,
        species: None,
        top_n: 0,
    };
    let (path, _) = run_report(&env.store, &env.out_dir, &params).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let row = content.lines().nth(1).unwrap();

    // species_key is the label "erithacus_rubecula"; the observation counter
    // finds two corroborating rows under that code.
    let fields: Vec<&str> = row.split(',').collect();
    assert_eq!(fields[2], "erithacus_rubecula");
    assert_eq!(fields[8], "2");
}

#[tokio::test]
async fn test_fuzzy_species_filter_and_top_n() {
    let env = TestEnv::new();
    env.add_audio("r1.wav", b"recording-one");
    env.add_audio("r2.wav", b"recording-two");
    run_upload(&env.store, &env.blob, &env.audio_dir, None, None).unwrap();

    let sparrow = r#"{"predictions":[
        {"label":"sparrow","scientific_name":"Passer domesticus","score":0.9}
    ]}"#;
    let classifier = TableClassifier {
        responses: [
            ("r1.wav".to_string(), robin_body()),
            ("r2.wav".to_string(), sparrow.to_string()),
        ]
        .into_iter()
        .collect(),
    };
    run_classify(&env.store, &env.blob, &classifier).await.unwrap();

    // Misspelled query still matches via trigram similarity.
    let params = ReportParams {
        threshold: 0.30,
        species: Some("sparow".to_string()),
        top_n: 0,
    };
    let (path, summary) = run_report(&env.store, &env.out_dir, &params).unwrap();
    assert_eq!(summary.processed, 1);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.lines().nth(1).unwrap().contains("Passer domesticus"));

    // top_n truncates after sorting.
    let params = ReportParams {
        threshold: 0.30,
        species: None,
        top_n: 1,
    };
    let (_, summary) = run_report(&env.store, &env.out_dir, &params).unwrap();
    assert_eq!(summary.processed, 1);
}

#[test]
fn test_database_survives_reopen() {
    let workdir = TempDir::new().unwrap();
    let db_path = workdir.path().join("survey.db");

    {
        let store = SqliteSurveyStore::open(&db_path).unwrap();
        store.probe("test-host").unwrap();
    }

    // Reopen validates the schema instead of recreating it.
    let reopened = SqliteSurveyStore::open(&db_path).unwrap();
    reopened.probe("test-host").unwrap();
    assert!(Path::new(&db_path).exists());
}
