//! Per-species aggregation over the stored outcome corpus.
//!
//! Aggregates are rebuilt fresh on every report run; nothing here is
//! persisted. Each species key owns an explicit accumulator so partial
//! aggregates over disjoint outcome slices can be merged deterministically.

use crate::survey_store::{ClassificationOutcome, SegmentResult};
use std::collections::{HashMap, HashSet};

/// Accumulated statistics for one species key.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesAggregate {
    /// Display names, captured from the first segment seen for this key.
    pub scientific_name: String,
    pub common_name: String,
    pub label: String,
    /// Segments meeting the confidence threshold.
    pub positive_segments: u64,
    pub segments_total: u64,
    pub confidence_sum: f64,
    pub confidence_count: u64,
    pub max_confidence: f64,
    /// First non-null coordinate pair seen; a sample, not a centroid.
    pub sample_lat: Option<f64>,
    pub sample_lon: Option<f64>,
    /// Distinct recordings contributing at least one segment.
    pub recording_ids: HashSet<String>,
}

impl SpeciesAggregate {
    fn new(segment: &SegmentResult) -> Self {
        SpeciesAggregate {
            scientific_name: segment
                .scientific_name
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
            common_name: segment
                .common_name
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
            label: segment.label.as_deref().unwrap_or("").trim().to_string(),
            positive_segments: 0,
            segments_total: 0,
            confidence_sum: 0.0,
            confidence_count: 0,
            max_confidence: 0.0,
            sample_lat: None,
            sample_lon: None,
            recording_ids: HashSet::new(),
        }
    }

    /// Fold one segment with a usable confidence into the accumulator.
    fn observe(
        &mut self,
        confidence: f64,
        threshold: f64,
        recording_id: &str,
        lat: Option<f64>,
        lon: Option<f64>,
    ) {
        self.segments_total += 1;
        self.confidence_sum += confidence;
        self.confidence_count += 1;
        // Strict greater-than: the first value wins ties.
        if confidence > self.max_confidence {
            self.max_confidence = confidence;
        }
        // Inclusive boundary: exactly at the threshold counts as positive.
        if confidence >= threshold {
            self.positive_segments += 1;
        }
        if self.sample_lat.is_none() {
            if let Some(lat) = lat {
                self.sample_lat = Some(lat);
                self.sample_lon = lon;
            }
        }
        self.recording_ids.insert(recording_id.to_string());
    }

    /// Merge a partial aggregate built over a disjoint, later slice of the
    /// corpus: accumulators sum, max takes the strict maximum, and the
    /// earlier-seen sample coordinate (self's) is kept.
    pub fn merge(&mut self, other: SpeciesAggregate) {
        self.positive_segments += other.positive_segments;
        self.segments_total += other.segments_total;
        self.confidence_sum += other.confidence_sum;
        self.confidence_count += other.confidence_count;
        if other.max_confidence > self.max_confidence {
            self.max_confidence = other.max_confidence;
        }
        if self.sample_lat.is_none() {
            self.sample_lat = other.sample_lat;
            self.sample_lon = other.sample_lon;
        }
        self.recording_ids.extend(other.recording_ids);
    }

    /// Mean confidence, computed at read time from the running sum so no
    /// rounding compounds across observations.
    pub fn mean_confidence(&self) -> f64 {
        if self.confidence_count == 0 {
            return 0.0;
        }
        self.confidence_sum / self.confidence_count as f64
    }
}

/// Fold outcomes into per-species accumulators without filtering.
///
/// Used directly for partial aggregation; [`aggregate`] applies the
/// zero-positive exclusion on top.
pub fn fold(
    outcomes: &[ClassificationOutcome],
    threshold: f64,
) -> HashMap<String, SpeciesAggregate> {
    let mut aggregates: HashMap<String, SpeciesAggregate> = HashMap::new();
    for outcome in outcomes {
        for segment in &outcome.segments {
            // Confidence is mandatory for a segment to participate.
            let Some(confidence) = segment.confidence else {
                continue;
            };
            let key = segment.species_key();
            aggregates
                .entry(key)
                .or_insert_with(|| SpeciesAggregate::new(segment))
                .observe(
                    confidence,
                    threshold,
                    &outcome.recording_id,
                    outcome.lat,
                    outcome.lon,
                );
        }
    }
    aggregates
}

/// Merge two partial fold results; `earlier` keeps name and sample priority.
pub fn merge_partials(
    mut earlier: HashMap<String, SpeciesAggregate>,
    later: HashMap<String, SpeciesAggregate>,
) -> HashMap<String, SpeciesAggregate> {
    for (key, partial) in later {
        match earlier.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().merge(partial);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(partial);
            }
        }
    }
    earlier
}

/// Aggregate the full corpus at a threshold.
///
/// Species with zero positive segments are excluded entirely; the report
/// only discusses species with at least one qualifying detection.
pub fn aggregate(
    outcomes: &[ClassificationOutcome],
    threshold: f64,
) -> HashMap<String, SpeciesAggregate> {
    let mut aggregates = fold(outcomes, threshold);
    aggregates.retain(|_, agg| agg.positive_segments > 0);
    aggregates
}
