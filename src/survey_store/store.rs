//! SQLite-backed survey store.

use super::models::{
    ClassificationOutcome, ObservationRecord, RecordingDescriptor, ResponseMeta, TaxonEntry,
    TaxonNames,
};
use super::schema::SURVEY_VERSIONED_SCHEMAS;
use super::trait_def::{
    ObservationStore, OutcomeStore, RecordingStore, StoreError, TaxonomyStore,
};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// System of record for recordings, outcomes, observations and taxa.
///
/// All uniqueness contracts (one outcome per recording, one observation per
/// `(source, seq)`) are enforced by the database, so concurrent process
/// instances sharing the same file remain correct.
pub struct SqliteSurveyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSurveyStore {
    /// Open an existing database or create a new one with the current
    /// schema, then validate the live schema against the declaration.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            SURVEY_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new survey database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Survey database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = SURVEY_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Survey database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        SURVEY_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteSurveyStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SURVEY_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteSurveyStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = SURVEY_VERSIONED_SCHEMAS.len() - 1;
        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating survey database from version {} to {}",
            current_version, target_version
        );
        for schema in SURVEY_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!("Running survey migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!(
                "PRAGMA user_version = {}",
                BASE_DB_VERSION + target_version
            ),
            [],
        )?;
        Ok(())
    }

    /// Connectivity probe: one write that a broken database cannot absorb.
    pub fn probe(&self, host: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO healthchecks (ts, host) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), host],
        )?;
        Ok(())
    }

    /// Map a unique-constraint failure to [`StoreError::Conflict`].
    fn conflict_on_unique(err: rusqlite::Error, key: &str) -> StoreError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(key.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Raw row image of an outcome; JSON and timestamp columns still as text.
struct RawOutcomeRow {
    recording_id: String,
    filename: String,
    object_key: String,
    lat: Option<f64>,
    lon: Option<f64>,
    created_at: String,
    log_key: String,
    status_code: Option<i64>,
    ok: i64,
    requested_at: String,
    received_at: String,
    best_label: Option<String>,
    best_score: Option<f64>,
    taxonomy: Option<String>,
    segments: String,
    raw: String,
}

impl RawOutcomeRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(RawOutcomeRow {
            recording_id: row.get("recording_id")?,
            filename: row.get("filename")?,
            object_key: row.get("object_key")?,
            lat: row.get("lat")?,
            lon: row.get("lon")?,
            created_at: row.get("created_at")?,
            log_key: row.get("log_key")?,
            status_code: row.get("status_code")?,
            ok: row.get("ok")?,
            requested_at: row.get("requested_at")?,
            received_at: row.get("received_at")?,
            best_label: row.get("best_label")?,
            best_score: row.get("best_score")?,
            taxonomy: row.get("taxonomy")?,
            segments: row.get("segments")?,
            raw: row.get("raw")?,
        })
    }

    fn into_outcome(self) -> Result<ClassificationOutcome, StoreError> {
        Ok(ClassificationOutcome {
            recording_id: self.recording_id,
            filename: self.filename,
            object_key: self.object_key,
            lat: self.lat,
            lon: self.lon,
            created_at: parse_ts(&self.created_at)?,
            log_key: self.log_key,
            http: ResponseMeta {
                status_code: self.status_code.map(|c| c as u16),
                ok: self.ok != 0,
                requested_at: parse_ts(&self.requested_at)?,
                received_at: parse_ts(&self.received_at)?,
            },
            best_label: self.best_label,
            best_score: self.best_score,
            taxonomy: self
                .taxonomy
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            segments: serde_json::from_str(&self.segments)?,
            raw: serde_json::from_str(&self.raw)?,
        })
    }
}

const OUTCOME_COLUMNS: &str = "recording_id, filename, object_key, lat, lon, created_at, \
     log_key, status_code, ok, requested_at, received_at, best_label, best_score, \
     taxonomy, segments, raw";

impl RecordingStore for SqliteSurveyStore {
    fn insert_recording(&self, recording: &RecordingDescriptor) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audio_files (recording_id, object_key, filename, lat, lon, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recording.recording_id,
                recording.object_key,
                recording.filename,
                recording.lat,
                recording.lon,
                recording.uploaded_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::conflict_on_unique(e, &recording.recording_id))?;
        Ok(())
    }

    fn is_registered(&self, recording_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM audio_files WHERE recording_id = ?1",
                params![recording_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_recordings(&self) -> Result<Vec<RecordingDescriptor>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT recording_id, object_key, filename, lat, lon, uploaded_at \
             FROM audio_files ORDER BY uploaded_at, filename",
        )?;
        let rows: Vec<(String, String, String, Option<f64>, Option<f64>, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        rows.into_iter()
            .map(|(recording_id, object_key, filename, lat, lon, uploaded_at)| {
                Ok(RecordingDescriptor {
                    recording_id,
                    object_key,
                    filename,
                    lat,
                    lon,
                    uploaded_at: parse_ts(&uploaded_at)?,
                })
            })
            .collect()
    }
}

impl OutcomeStore for SqliteSurveyStore {
    fn is_classified(&self, recording_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM classifications WHERE recording_id = ?1",
                params![recording_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_outcome(&self, outcome: &ClassificationOutcome) -> Result<(), StoreError> {
        let taxonomy = outcome
            .taxonomy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let segments = serde_json::to_string(&outcome.segments)?;
        let raw = serde_json::to_string(&outcome.raw)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO classifications ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                OUTCOME_COLUMNS
            ),
            params![
                outcome.recording_id,
                outcome.filename,
                outcome.object_key,
                outcome.lat,
                outcome.lon,
                outcome.created_at.to_rfc3339(),
                outcome.log_key,
                outcome.http.status_code.map(|c| c as i64),
                outcome.http.ok as i64,
                outcome.http.requested_at.to_rfc3339(),
                outcome.http.received_at.to_rfc3339(),
                outcome.best_label,
                outcome.best_score,
                taxonomy,
                segments,
                raw,
            ],
        )
        .map_err(|e| Self::conflict_on_unique(e, &outcome.recording_id))?;
        Ok(())
    }

    fn get_outcome(
        &self,
        recording_id: &str,
    ) -> Result<Option<ClassificationOutcome>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM classifications WHERE recording_id = ?1",
                    OUTCOME_COLUMNS
                ),
                params![recording_id],
                RawOutcomeRow::from_row,
            )
            .optional()?;
        row.map(RawOutcomeRow::into_outcome).transpose()
    }

    fn list_outcomes(&self) -> Result<Vec<ClassificationOutcome>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM classifications ORDER BY created_at, recording_id",
            OUTCOME_COLUMNS
        ))?;
        let rows: Vec<RawOutcomeRow> = stmt
            .query_map([], RawOutcomeRow::from_row)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(RawOutcomeRow::into_outcome).collect()
    }
}

impl ObservationStore for SqliteSurveyStore {
    fn insert_observation_if_absent(
        &self,
        observation: &ObservationRecord,
    ) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(&observation.payload)?;
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO field_observations \
             (source, seq, taxon_code, lat, lon, ingested_at, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                observation.source,
                observation.seq,
                observation.taxon_code,
                observation.lat,
                observation.lon,
                observation.ingested_at.to_rfc3339(),
                payload,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn count_by_taxon_code(&self, taxon_code: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM field_observations WHERE taxon_code = ?1",
            params![taxon_code],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl TaxonomyStore for SqliteSurveyStore {
    fn upsert_taxon(&self, taxon: &TaxonEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO taxa \
             (taxon_code, latin_name, common_name, family, taxon_order, source, seeded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(taxon_code) DO UPDATE SET \
             latin_name = excluded.latin_name, common_name = excluded.common_name, \
             family = excluded.family, taxon_order = excluded.taxon_order, \
             source = excluded.source, seeded_at = excluded.seeded_at",
            params![
                taxon.taxon_code,
                taxon.latin_name,
                taxon.common_name,
                taxon.family,
                taxon.order,
                taxon.source,
                taxon.seeded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn taxa_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM taxa", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn lookup_taxon(&self, taxon_code: &str) -> Result<Option<TaxonNames>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT latin_name, common_name FROM taxa WHERE taxon_code = ?1",
                params![taxon_code],
                |row| {
                    Ok(TaxonNames {
                        latin_name: row.get(0)?,
                        common_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
