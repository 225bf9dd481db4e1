//! Batch jobs, one per CLI subcommand.
//!
//! Every job is a single pass over its inputs with per-item failure
//! isolation where the inputs are independent: one bad recording or one
//! malformed line never aborts the batch. Jobs report their outcome through
//! a [`RunSummary`] so reruns are easy to compare.

mod classify;
mod healthcheck;
mod observations;
mod report;
mod taxonomy;
mod upload;

pub use classify::run_classify;
pub use healthcheck::run_healthcheck;
pub use observations::run_ingest_observations;
pub use report::{run_report, ReportParams};
pub use taxonomy::run_seed_taxa;
pub use upload::run_upload;

use std::fmt;

/// Counters for one job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items handled to completion this run.
    pub processed: u64,
    /// Items already done in a previous run (idempotent skip).
    pub skipped: u64,
    /// Items that errored; the run continues past them.
    pub failed: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} failed={}",
            self.processed, self.skipped, self.failed
        )
    }
}
