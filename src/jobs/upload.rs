//! Audio upload job: register local recordings in the blob store and the
//! survey database, keyed by content hash so reruns are no-ops.

use super::RunSummary;
use crate::blob_store::BlobStore;
use crate::survey_store::{RecordingDescriptor, RecordingStore, StoreError};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

fn audio_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    AUDIO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Scan `audio_dir` (non-recursive) and upload every `.wav`/`.mp3` not yet
/// registered. The recording id is the sha-256 digest of the audio bytes,
/// so renamed duplicates collapse onto one recording.
pub fn run_upload(
    store: &dyn RecordingStore,
    blob: &dyn BlobStore,
    audio_dir: &Path,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<RunSummary> {
    if !audio_dir.is_dir() {
        bail!("audio directory does not exist: {:?}", audio_dir);
    }
    blob.ensure_bucket().context("blob bucket unavailable")?;

    let mut summary = RunSummary::default();

    for entry in WalkDir::new(audio_dir).min_depth(1).max_depth(1) {
        let entry = entry.context("failed to scan audio directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = audio_extension(path) else {
            continue;
        };
        let filename = entry.file_name().to_string_lossy().to_string();

        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        let recording_id = format!("{:x}", Sha256::digest(&bytes));

        if store.is_registered(&recording_id)? {
            info!("Skip {} (already registered)", filename);
            summary.skipped += 1;
            continue;
        }

        let object_key = format!("audio/{}.{}", recording_id, ext);
        blob.put(&object_key, &bytes, "application/octet-stream")
            .with_context(|| format!("upload failed for {}", filename))?;

        let descriptor = RecordingDescriptor {
            recording_id: recording_id.clone(),
            object_key: object_key.clone(),
            filename: filename.clone(),
            lat,
            lon,
            uploaded_at: Utc::now(),
        };
        match store.insert_recording(&descriptor) {
            Ok(()) => {
                info!("Uploaded {} -> {}", filename, object_key);
                summary.processed += 1;
            }
            // Concurrent run registered it between our check and insert.
            Err(StoreError::Conflict(_)) => {
                warn!("Skip {} (registered concurrently)", filename);
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Audio upload finished: {}", summary);
    Ok(summary)
}
