//! CSV rendering of report rows.

use super::builder::ReportRow;
use chrono::{DateTime, Utc};

/// Fixed output schema; column order is part of the report contract.
pub const REPORT_COLUMNS: [&str; 11] = [
    "scientific_name",
    "common_name",
    "label",
    "audio_files_count",
    "positive_segments",
    "segments_total",
    "max_confidence",
    "avg_confidence",
    "observations_count",
    "sample_lat",
    "sample_lon",
];

/// Report filename with the UTC generation timestamp embedded, so a new run
/// never overwrites a prior report. Colons are replaced to keep the name
/// filesystem-safe.
pub fn report_filename(generated_at: DateTime<Utc>) -> String {
    format!(
        "bird_report_{}.csv",
        generated_at.to_rfc3339().replace(':', "-")
    )
}

/// Quote a field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional_float(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render rows into CSV text with the fixed 11-column header.
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    out.push_str(&REPORT_COLUMNS.join(","));
    out.push('\n');
    for row in rows {
        let fields = [
            csv_field(&row.scientific_name),
            csv_field(&row.common_name),
            csv_field(&row.label),
            row.audio_files_count.to_string(),
            row.positive_segments.to_string(),
            row.segments_total.to_string(),
            row.max_confidence.to_string(),
            row.avg_confidence.to_string(),
            row.observations_count.to_string(),
            optional_float(row.sample_lat),
            optional_float(row.sample_lon),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}
