use serde::Serialize;

/// Per-pass diagnostics returned alongside the course list. Field defaults
/// are never silent: every degraded cell lands here as an explicit outcome.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ParseReport {
    pub rows_seen: usize,
    pub data_rows: usize,
    pub skipped: Vec<SkippedRow>,
    pub anomalies: Vec<FieldAnomaly>,
}

/// A row dropped whole: too few cells, no recoverable identifier.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub row_index: usize,
    pub reason: String,
}

/// A single cell that could not be converted and fell back to a default.
#[derive(Debug, Clone, Serialize)]
pub struct FieldAnomaly {
    pub row_index: usize,
    pub crn: Option<String>,
    pub field: &'static str,
    pub raw: String,
    pub note: String,
}

impl ParseReport {
    pub fn skip(&mut self, row_index: usize, reason: impl Into<String>) {
        self.skipped.push(SkippedRow { row_index, reason: reason.into() });
    }

    pub fn anomaly(
        &mut self,
        row_index: usize,
        crn: Option<&str>,
        field: &'static str,
        raw: &str,
        note: &str,
    ) {
        self.anomalies.push(FieldAnomaly {
            row_index,
            crn: crn.map(str::to_string),
            field,
            raw: raw.to_string(),
            note: note.to_string(),
        });
    }

    /// Fold another page's report into this one (multi-page collection).
    pub fn merge(&mut self, other: ParseReport) {
        self.rows_seen += other.rows_seen;
        self.data_rows += other.data_rows;
        self.skipped.extend(other.skipped);
        self.anomalies.extend(other.anomalies);
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.anomalies.is_empty()
    }

    /// One-line summary for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} rows, {} data rows, {} skipped, {} field anomalies",
            self.rows_seen,
            self.data_rows,
            self.skipped.len(),
            self.anomalies.len(),
        )
    }
}
