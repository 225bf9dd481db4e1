//! Taxonomy seeding from a species export file.
//!
//! The export is a JSON array of rows with scientific/common names plus
//! rank, family and order. Only SPECIES-rank rows are kept; the taxon code
//! is derived from the latin name so it is stable across exports.

use super::RunSummary;
use crate::survey_store::{TaxonEntry, TaxonomyStore};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TaxonSeedRow {
    #[serde(alias = "scientific_name", alias = "scientificName")]
    latin_name: Option<String>,
    #[serde(alias = "canonical_name", alias = "canonicalName")]
    common_name: Option<String>,
    rank: Option<String>,
    family: Option<String>,
    order: Option<String>,
}

/// Stable pseudo-code from a latin name: lower-case, whitespace to
/// underscores, everything outside `[a-z0-9_]` stripped.
pub fn taxon_code_from_name(name: &str) -> Option<String> {
    let collapsed = name.trim().to_lowercase();
    if collapsed.is_empty() {
        return None;
    }
    let code: String = collapsed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    (!code.is_empty()).then_some(code)
}

/// Seed the taxa table from `seed_path`. A non-empty table means a previous
/// seed run completed; the whole job is skipped rather than merged.
pub fn run_seed_taxa(
    store: &dyn TaxonomyStore,
    seed_path: &Path,
    source: &str,
) -> Result<RunSummary> {
    let existing = store.taxa_count()?;
    if existing > 0 {
        info!("Skip: taxa already seeded (count={})", existing);
        return Ok(RunSummary {
            skipped: existing,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(seed_path)
        .with_context(|| format!("failed to read taxonomy seed {:?}", seed_path))?;
    let rows: Vec<TaxonSeedRow> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse taxonomy seed {:?}", seed_path))?;
    info!("Taxonomy seed rows loaded: {}", rows.len());

    let mut summary = RunSummary::default();
    let seeded_at = Utc::now();

    for row in rows {
        let is_species = row
            .rank
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("SPECIES"));
        if !is_species {
            summary.skipped += 1;
            continue;
        }
        let Some(latin_name) = row.latin_name.as_deref().map(str::trim).filter(|s| !s.is_empty())
        else {
            warn!("Dropping taxonomy row without a latin name");
            summary.failed += 1;
            continue;
        };
        let Some(taxon_code) = taxon_code_from_name(latin_name) else {
            warn!("Could not derive a taxon code from {:?}", latin_name);
            summary.failed += 1;
            continue;
        };

        store.upsert_taxon(&TaxonEntry {
            taxon_code,
            latin_name: latin_name.to_string(),
            common_name: row.common_name.clone(),
            family: row.family.clone(),
            order: row.order.clone(),
            source: source.to_string(),
            seeded_at,
        })?;
        summary.processed += 1;
    }

    info!("Taxonomy seed finished: {}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey_store::SqliteSurveyStore;
    use tempfile::tempdir;

    #[test]
    fn test_taxon_code_derivation() {
        assert_eq!(
            taxon_code_from_name("Erithacus rubecula").as_deref(),
            Some("erithacus_rubecula")
        );
        assert_eq!(
            taxon_code_from_name("  Parus   major  ").as_deref(),
            Some("parus_major")
        );
        assert_eq!(
            taxon_code_from_name("Gallus gallus (domesticus)").as_deref(),
            Some("gallus_gallus_domesticus")
        );
        assert!(taxon_code_from_name("   ").is_none());
        assert!(taxon_code_from_name("???").is_none());
    }

    fn write_seed(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("taxa.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_seeds_species_rows_only() {
        let dir = tempdir().unwrap();
        let seed = write_seed(
            dir.path(),
            r#"[
                {"scientific_name": "Erithacus rubecula", "canonical_name": "European Robin",
                 "rank": "SPECIES", "family": "Muscicapidae", "order": "Passeriformes"},
                {"scientific_name": "Erithacus", "rank": "GENUS"},
                {"scientific_name": "Parus major", "rank": "species"}
            ]"#,
        );

        let store = SqliteSurveyStore::in_memory().unwrap();
        let summary = run_seed_taxa(&store, &seed, "export").unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.taxa_count().unwrap(), 2);

        let names = store.lookup_taxon("erithacus_rubecula").unwrap().unwrap();
        assert_eq!(names.latin_name, "Erithacus rubecula");
        assert_eq!(names.common_name.as_deref(), Some("European Robin"));
    }

    #[test]
    fn test_skips_entirely_when_already_seeded() {
        let dir = tempdir().unwrap();
        let seed = write_seed(
            dir.path(),
            r#"[{"scientific_name": "Erithacus rubecula", "rank": "SPECIES"}]"#,
        );

        let store = SqliteSurveyStore::in_memory().unwrap();
        run_seed_taxa(&store, &seed, "export").unwrap();

        let second = run_seed_taxa(&store, &seed, "export").unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn test_malformed_seed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let seed = write_seed(dir.path(), "not json");
        let store = SqliteSurveyStore::in_memory().unwrap();
        assert!(run_seed_taxa(&store, &seed, "export").is_err());
    }
}
