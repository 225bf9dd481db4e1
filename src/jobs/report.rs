//! Report job: aggregate the stored outcome corpus and write the CSV.

use super::RunSummary;
use crate::report::{aggregate, build_report, render_csv, report_filename};
use crate::survey_store::{ObservationStore, OutcomeStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything the report run needs beyond the stores.
#[derive(Debug, Clone)]
pub struct ReportParams {
    /// Confidence threshold for a positive segment (inclusive).
    pub threshold: f64,
    /// Optional fuzzy species filter.
    pub species: Option<String>,
    /// Keep only the first N rows after sorting; 0 means all.
    pub top_n: usize,
}

/// Aggregate all stored outcomes and write the report CSV into `out_dir`.
/// Returns the written path and a summary (`processed` = rows written).
pub fn run_report<S>(
    store: &S,
    out_dir: &Path,
    params: &ReportParams,
) -> Result<(PathBuf, RunSummary)>
where
    S: OutcomeStore + ObservationStore,
{
    let outcomes = store.list_outcomes()?;
    info!("Loaded {} classification outcomes", outcomes.len());

    let aggregates = aggregate(&outcomes, params.threshold);

    let aux_counter = |taxon_code: &str| -> u64 {
        store.count_by_taxon_code(taxon_code).unwrap_or_else(|e| {
            warn!("Observation count lookup failed for {}: {}", taxon_code, e);
            0
        })
    };
    let rows = build_report(
        &aggregates,
        params.species.as_deref(),
        params.top_n,
        &aux_counter,
    );

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {:?}", out_dir))?;
    let path = out_dir.join(report_filename(Utc::now()));
    std::fs::write(&path, render_csv(&rows))
        .with_context(|| format!("failed to write report {:?}", path))?;

    info!(
        "Report written to {:?}: rows={} threshold={} fuzzy={}",
        path,
        rows.len(),
        params.threshold,
        if params.species.is_some() { "on" } else { "off" }
    );
    let summary = RunSummary {
        processed: rows.len() as u64,
        ..Default::default()
    };
    Ok((path, summary))
}
