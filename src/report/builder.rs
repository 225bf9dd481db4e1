//! Report row building: filtering, ranking and truncation.

use super::aggregate::SpeciesAggregate;
use crate::matcher;
use std::collections::HashMap;

/// Placeholder shown when a species has no common name.
const UNKNOWN_COMMON_NAME: &str = "(unknown)";

/// One report row; field order matches the rendered output.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub scientific_name: String,
    pub common_name: String,
    pub label: String,
    /// Distinct recordings contributing to this species.
    pub audio_files_count: u64,
    pub positive_segments: u64,
    pub segments_total: u64,
    /// Rounded to 4 decimal places.
    pub max_confidence: f64,
    /// Rounded to 4 decimal places.
    pub avg_confidence: f64,
    /// Corroborating field observations.
    pub observations_count: u64,
    pub sample_lat: Option<f64>,
    pub sample_lon: Option<f64>,
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Build the ranked report from aggregates.
///
/// `aux_counter` looks up corroborating observation counts by taxon code;
/// it is queried with the species key first, then with the label when the
/// key yields zero.
pub fn build_report(
    aggregates: &HashMap<String, SpeciesAggregate>,
    filter_query: Option<&str>,
    top_n: usize,
    aux_counter: &dyn Fn(&str) -> u64,
) -> Vec<ReportRow> {
    // Deterministic row order before the stable sort, so reruns over the
    // same corpus produce identical reports.
    let mut keys: Vec<&String> = aggregates.keys().collect();
    keys.sort();

    let mut rows: Vec<ReportRow> = keys
        .into_iter()
        .map(|key| {
            let agg = &aggregates[key];

            let mut observations_count = aux_counter(key);
            if observations_count == 0 && !agg.label.is_empty() {
                observations_count = aux_counter(&agg.label);
            }

            let scientific_name = if agg.scientific_name.is_empty() {
                key.clone()
            } else {
                agg.scientific_name.clone()
            };
            let common_name = if agg.common_name.is_empty() {
                UNKNOWN_COMMON_NAME.to_string()
            } else {
                agg.common_name.clone()
            };

            ReportRow {
                scientific_name,
                common_name,
                label: agg.label.clone(),
                audio_files_count: agg.recording_ids.len() as u64,
                positive_segments: agg.positive_segments,
                segments_total: agg.segments_total,
                max_confidence: round4(agg.max_confidence),
                avg_confidence: round4(agg.mean_confidence()),
                observations_count,
                sample_lat: agg.sample_lat,
                sample_lon: agg.sample_lon,
            }
        })
        .collect();

    if let Some(query) = filter_query {
        rows = apply_fuzzy_filter(rows, query);
    }

    // Most positives first, max confidence breaks ties.
    rows.sort_by(|a, b| {
        b.positive_segments
            .cmp(&a.positive_segments)
            .then(b.max_confidence.total_cmp(&a.max_confidence))
    });

    if top_n > 0 {
        rows.truncate(top_n);
    }
    rows
}

/// Keep rows fuzzy-matching the query.
///
/// The allowed set is computed over the union of every row's names; a row
/// also survives on a direct row-local score, so a single highly-similar
/// name matches even when it was not among the globally ranked candidates.
fn apply_fuzzy_filter(rows: Vec<ReportRow>, query: &str) -> Vec<ReportRow> {
    let candidates = rows
        .iter()
        .flat_map(|r| {
            [
                r.scientific_name.as_str(),
                r.common_name.as_str(),
                r.label.as_str(),
            ]
        })
        .collect::<Vec<_>>();
    let allowed = matcher::match_set(query, candidates, matcher::DEFAULT_MIN_SCORE);

    rows.into_iter()
        .filter(|r| {
            allowed.contains(&r.scientific_name)
                || allowed.contains(&r.common_name)
                || allowed.contains(&r.label)
                || matcher::similarity(query, &r.scientific_name) >= matcher::DEFAULT_MIN_SCORE
                || matcher::similarity(query, &r.common_name) >= matcher::DEFAULT_MIN_SCORE
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn aggregate_entry(
        scientific: &str,
        common: &str,
        label: &str,
        positive: u64,
        max_confidence: f64,
    ) -> SpeciesAggregate {
        SpeciesAggregate {
            scientific_name: scientific.to_string(),
            common_name: common.to_string(),
            label: label.to_string(),
            positive_segments: positive,
            segments_total: positive + 1,
            confidence_sum: max_confidence * (positive + 1) as f64,
            confidence_count: positive + 1,
            max_confidence,
            sample_lat: None,
            sample_lon: None,
            recording_ids: HashSet::from(["rec1".to_string()]),
        }
    }

    fn aggregates_of(entries: Vec<SpeciesAggregate>) -> HashMap<String, SpeciesAggregate> {
        entries
            .into_iter()
            .map(|e| {
                let key = if e.scientific_name.is_empty() {
                    e.label.clone()
                } else {
                    e.scientific_name.clone()
                };
                (key, e)
            })
            .collect()
    }

    fn no_observations(_: &str) -> u64 {
        0
    }

    #[test]
    fn test_sorts_by_positives_then_max_confidence_descending() {
        let aggregates = aggregates_of(vec![
            aggregate_entry("Species low", "", "low", 2, 0.99),
            aggregate_entry("Species high", "", "high", 5, 0.6),
            aggregate_entry("Species tie", "", "tie", 5, 0.9),
        ]);
        let rows = build_report(&aggregates, None, 0, &no_observations);
        let names: Vec<&str> = rows.iter().map(|r| r.scientific_name.as_str()).collect();
        // Equal positives: the higher max confidence ranks first.
        assert_eq!(names, ["Species tie", "Species high", "Species low"]);
    }

    #[test]
    fn test_top_n_truncates_after_sorting() {
        let aggregates = aggregates_of(vec![
            aggregate_entry("A", "", "a", 1, 0.5),
            aggregate_entry("B", "", "b", 3, 0.5),
            aggregate_entry("C", "", "c", 2, 0.5),
        ]);
        let rows = build_report(&aggregates, None, 2, &no_observations);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].scientific_name, "B");
        assert_eq!(rows[1].scientific_name, "C");
    }

    #[test]
    fn test_top_n_zero_keeps_all_rows() {
        let aggregates = aggregates_of(vec![
            aggregate_entry("A", "", "a", 1, 0.5),
            aggregate_entry("B", "", "b", 3, 0.5),
        ]);
        assert_eq!(build_report(&aggregates, None, 0, &no_observations).len(), 2);
    }

    #[test]
    fn test_fuzzy_filter_keeps_only_similar_rows() {
        let aggregates = aggregates_of(vec![
            aggregate_entry("Turdus migratorius", "American Robin", "amerob", 4, 0.9),
            aggregate_entry("Haliaeetus leucocephalus", "Bald Eagle", "baleag", 3, 0.8),
        ]);
        let rows = build_report(&aggregates, Some("robin"), 0, &no_observations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].common_name, "American Robin");
    }

    #[test]
    fn test_empty_common_name_renders_placeholder() {
        let aggregates = aggregates_of(vec![aggregate_entry(
            "Erithacus rubecula",
            "",
            "robin",
            1,
            0.5,
        )]);
        let rows = build_report(&aggregates, None, 0, &no_observations);
        assert_eq!(rows[0].common_name, "(unknown)");
    }

    #[test]
    fn test_scientific_name_falls_back_to_species_key() {
        let aggregates = aggregates_of(vec![aggregate_entry("", "", "robin", 1, 0.5)]);
        let rows = build_report(&aggregates, None, 0, &no_observations);
        assert_eq!(rows[0].scientific_name, "robin");
    }

    #[test]
    fn test_confidences_round_to_four_decimals() {
        let mut entry = aggregate_entry("A", "", "a", 1, 0.123456);
        entry.confidence_sum = 0.2;
        entry.confidence_count = 3;
        let aggregates = aggregates_of(vec![entry]);
        let rows = build_report(&aggregates, None, 0, &no_observations);
        assert_eq!(rows[0].max_confidence, 0.1235);
        assert_eq!(rows[0].avg_confidence, 0.0667);
    }

    #[test]
    fn test_aux_counter_falls_back_to_label() {
        let aggregates = aggregates_of(vec![aggregate_entry(
            "Erithacus rubecula",
            "",
            "eurrob",
            1,
            0.5,
        )]);
        let counter = |code: &str| if code == "eurrob" { 7 } else { 0 };
        let rows = build_report(&aggregates, None, 0, &counter);
        assert_eq!(rows[0].observations_count, 7);
    }

    #[test]
    fn test_aux_counter_prefers_species_key() {
        let aggregates = aggregates_of(vec![aggregate_entry(
            "Erithacus rubecula",
            "",
            "eurrob",
            1,
            0.5,
        )]);
        let counter = |code: &str| match code {
            "Erithacus rubecula" => 3,
            "eurrob" => 7,
            _ => 0,
        };
        let rows = build_report(&aggregates, None, 0, &counter);
        assert_eq!(rows[0].observations_count, 3);
    }
}
