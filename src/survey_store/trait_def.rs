//! Store traits for the survey system of record.
//!
//! Uniqueness contracts live at this boundary, not in process memory:
//! multiple independent process instances may run against the same store, so
//! the unique indexes are the sole serialization point for idempotent
//! ingestion.

use super::models::{
    ClassificationOutcome, ObservationRecord, RecordingDescriptor, TaxonEntry, TaxonNames,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row already exists for this unique key. Expected under concurrent
    /// or re-run execution; callers treat it as "already done".
    #[error("a record already exists for key {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Registered recordings (owned by the upload step).
pub trait RecordingStore: Send + Sync {
    /// Register a new recording. Fails with [`StoreError::Conflict`] when
    /// the recording id is already registered.
    fn insert_recording(&self, recording: &RecordingDescriptor) -> Result<(), StoreError>;

    fn is_registered(&self, recording_id: &str) -> Result<bool, StoreError>;

    fn list_recordings(&self) -> Result<Vec<RecordingDescriptor>, StoreError>;
}

/// Classification outcomes, at most one per recording id.
pub trait OutcomeStore: Send + Sync {
    /// Ingestion guard check: has this recording been classified already?
    fn is_classified(&self, recording_id: &str) -> Result<bool, StoreError>;

    /// Commit an outcome. Atomic with respect to the unique index on
    /// recording id: a concurrent duplicate commit fails with
    /// [`StoreError::Conflict`] and never overwrites the stored outcome.
    fn insert_outcome(&self, outcome: &ClassificationOutcome) -> Result<(), StoreError>;

    fn get_outcome(&self, recording_id: &str)
        -> Result<Option<ClassificationOutcome>, StoreError>;

    /// The full stored corpus, for aggregation.
    fn list_outcomes(&self) -> Result<Vec<ClassificationOutcome>, StoreError>;
}

/// Field observations, deduplicated by `(source, seq)`.
pub trait ObservationStore: Send + Sync {
    /// Insert unless a row with the same `(source, seq)` already exists.
    /// Returns true when a new row was inserted, false on a duplicate, so
    /// re-running the same batch is safe.
    fn insert_observation_if_absent(
        &self,
        observation: &ObservationRecord,
    ) -> Result<bool, StoreError>;

    /// Number of observations corroborating a taxon code.
    fn count_by_taxon_code(&self, taxon_code: &str) -> Result<u64, StoreError>;
}

/// Taxonomy lookup from taxon code to canonical names.
pub trait TaxonomyStore: Send + Sync {
    fn upsert_taxon(&self, taxon: &TaxonEntry) -> Result<(), StoreError>;

    fn taxa_count(&self) -> Result<u64, StoreError>;

    /// Absent entries are not an error; the species stays nameless.
    fn lookup_taxon(&self, taxon_code: &str) -> Result<Option<TaxonNames>, StoreError>;
}
