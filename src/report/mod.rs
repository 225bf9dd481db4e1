//! Report generation: aggregation, ranking and CSV rendering.

mod aggregate;
mod builder;
mod render;

pub use aggregate::{aggregate, fold, merge_partials, SpeciesAggregate};
pub use builder::{build_report, ReportRow};
pub use render::{render_csv, report_filename, REPORT_COLUMNS};
