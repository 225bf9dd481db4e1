//! Startup connectivity probe for the two external stores.

use crate::blob_store::BlobStore;
use crate::survey_store::SqliteSurveyStore;
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

/// Verify both stores accept writes. Fatal on any failure: a deployment
/// where either store is down should not start ingesting.
pub fn run_healthcheck(store: &SqliteSurveyStore, blob: &dyn BlobStore) -> Result<()> {
    info!("Checking survey database...");
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    store
        .probe(&host)
        .context("survey database healthcheck failed")?;
    info!("Survey database OK");

    info!("Checking blob store...");
    if blob.bucket_exists().context("blob store unreachable")? {
        info!("Blob bucket exists");
    } else {
        blob.ensure_bucket().context("could not create blob bucket")?;
        info!("Blob bucket created");
    }

    // A tiny write to verify access, timestamped so probes never collide.
    let probe_key = format!(
        "healthchecks/{}.txt",
        Utc::now().to_rfc3339().replace(':', "-")
    );
    blob.put(&probe_key, b"ok", "text/plain")
        .context("blob store probe write failed")?;
    info!("Blob store OK (wrote {})", probe_key);

    info!("All stores are ready");
    Ok(())
}
