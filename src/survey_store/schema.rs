//! Database schema for survey.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Registered recordings, keyed by the content hash of the audio bytes.
const AUDIO_FILES_TABLE_V1: Table = Table {
    name: "audio_files",
    columns: &[
        sqlite_column!("recording_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("object_key", &SqlType::Text, non_null = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!("lat", &SqlType::Real),
        sqlite_column!("lon", &SqlType::Real),
        sqlite_column!("uploaded_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Classification outcomes. The primary key on recording_id is the
/// ingestion guard's uniqueness constraint: at most one outcome per
/// recording, enforced by the store rather than in-process state.
const CLASSIFICATIONS_TABLE_V1: Table = Table {
    name: "classifications",
    columns: &[
        sqlite_column!("recording_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!("object_key", &SqlType::Text, non_null = true),
        sqlite_column!("lat", &SqlType::Real),
        sqlite_column!("lon", &SqlType::Real),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("log_key", &SqlType::Text, non_null = true),
        sqlite_column!("status_code", &SqlType::Integer),
        sqlite_column!("ok", &SqlType::Integer, non_null = true),
        sqlite_column!("requested_at", &SqlType::Text, non_null = true),
        sqlite_column!("received_at", &SqlType::Text, non_null = true),
        sqlite_column!("best_label", &SqlType::Text),
        sqlite_column!("best_score", &SqlType::Real),
        sqlite_column!("taxonomy", &SqlType::Text),
        sqlite_column!("segments", &SqlType::Text, non_null = true),
        sqlite_column!("raw", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_classifications_created_at", "created_at"),
        ("idx_classifications_best_label", "best_label"),
    ],
    unique_constraints: &[],
};

/// Field observations, deduplicated by (source, seq).
const FIELD_OBSERVATIONS_TABLE_V1: Table = Table {
    name: "field_observations",
    columns: &[
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("seq", &SqlType::Integer, non_null = true),
        sqlite_column!("taxon_code", &SqlType::Text),
        sqlite_column!("lat", &SqlType::Real),
        sqlite_column!("lon", &SqlType::Real),
        sqlite_column!("ingested_at", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_observations_taxon_code", "taxon_code"),
        ("idx_observations_ingested_at", "ingested_at"),
    ],
    unique_constraints: &[&["source", "seq"]],
};

/// Taxonomy rows, upserted by taxon code.
const TAXA_TABLE_V1: Table = Table {
    name: "taxa",
    columns: &[
        sqlite_column!("taxon_code", &SqlType::Text, is_primary_key = true),
        sqlite_column!("latin_name", &SqlType::Text, non_null = true),
        sqlite_column!("common_name", &SqlType::Text),
        sqlite_column!("family", &SqlType::Text),
        sqlite_column!("taxon_order", &SqlType::Text),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("seeded_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Healthcheck probe writes.
const HEALTHCHECKS_TABLE_V1: Table = Table {
    name: "healthchecks",
    columns: &[
        sqlite_column!("ts", &SqlType::Text, non_null = true),
        sqlite_column!("host", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const SURVEY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        AUDIO_FILES_TABLE_V1,
        CLASSIFICATIONS_TABLE_V1,
        FIELD_OBSERVATIONS_TABLE_V1,
        TAXA_TABLE_V1,
        HEALTHCHECKS_TABLE_V1,
    ],
    migration: None,
}];
