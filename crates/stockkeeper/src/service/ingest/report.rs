//! Per-upload error accumulation and the downloadable error artifacts.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Classification of a failed or skipped row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RowErrorKind {
    ValidationError,
    /// Foreign key not found. The row is dropped but the upload may still
    /// succeed.
    DependencySkipped,
    DuplicateError,
    SystemError,
}

impl RowErrorKind {
    /// Validation and duplicate errors abort the upload; skips do not.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            RowErrorKind::ValidationError | RowErrorKind::DuplicateError
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row_number: usize,
    /// Original row text, preserved as-is for the report.
    pub raw: String,
    pub kind: RowErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub counts: BTreeMap<String, usize>,
    pub top_errors: Vec<String>,
}

/// Names of the artifact files written for one upload, relative paths
/// stringified for the response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_rows: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_failed_rows: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
}

/// Collects per-row errors for one upload and renders the artifact files.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    entries: Vec<RowError>,
}

impl ErrorTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        row_number: usize,
        raw: impl Into<String>,
        kind: RowErrorKind,
        message: impl Into<String>,
    ) {
        self.entries.push(RowError {
            row_number,
            raw: raw.into(),
            kind,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[RowError] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn count(&self, kind: RowErrorKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Whether any entry aborts the upload.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|e| e.kind.is_fatal())
    }

    #[must_use]
    pub fn fatal_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind.is_fatal()).count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(RowErrorKind::DependencySkipped)
    }

    #[must_use]
    pub fn messages_of(&self, kind: RowErrorKind, limit: usize) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .take(limit)
            .map(|e| format!("Row {}: {}", e.row_number, e.message))
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> ErrorSummary {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind.to_string()).or_default() += 1;
        }
        let top_errors = self
            .entries
            .iter()
            .filter(|e| e.kind.is_fatal())
            .take(10)
            .map(|e| format!("Row {}: {}", e.row_number, e.message))
            .collect();
        ErrorSummary { counts, top_errors }
    }

    /// Writes the artifact files under `dir`, named `{key}_{artifact}.tsv`
    /// where `key` is `{fileType}_{taskId}_{ts}`. Files with no matching
    /// entries are not written.
    pub async fn write_artifacts(
        &self,
        dir: &Path,
        key: &str,
        header_line: &str,
    ) -> std::io::Result<ErrorArtifacts> {
        let mut artifacts = ErrorArtifacts::default();
        if self.entries.is_empty() {
            return Ok(artifacts);
        }
        tokio::fs::create_dir_all(dir).await?;

        let fatal: Vec<&RowError> = self.entries.iter().filter(|e| e.kind.is_fatal()).collect();
        if !fatal.is_empty() {
            let path = dir.join(format!("{key}_validation_errors.tsv"));
            let mut content = format!("{header_line}\n");
            for entry in &fatal {
                content.push_str(&entry.raw);
                content.push('\n');
            }
            tokio::fs::write(&path, content).await?;
            artifacts.validation_errors = Some(path_string(&path));
        }

        let skipped: Vec<&RowError> = self
            .entries
            .iter()
            .filter(|e| e.kind == RowErrorKind::DependencySkipped)
            .collect();
        if !skipped.is_empty() {
            let path = dir.join(format!("{key}_skipped_rows.tsv"));
            let mut content = format!("{header_line}\n");
            for entry in &skipped {
                content.push_str(&entry.raw);
                content.push('\n');
            }
            tokio::fs::write(&path, content).await?;
            artifacts.skipped_rows = Some(path_string(&path));
        }

        let path = dir.join(format!("{key}_all_failed_rows_with_errors.tsv"));
        let mut content = format!("{header_line}\tRow_Number\tError_Type\tError_Reason\n");
        for entry in &self.entries {
            content.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                entry.raw, entry.row_number, entry.kind, entry.message
            ));
        }
        tokio::fs::write(&path, content).await?;
        artifacts.all_failed_rows = Some(path_string(&path));

        let path = dir.join(format!("{key}_error_summary.tsv"));
        let mut content = String::from("Error_Type\tCount\n");
        for (kind, count) in self.summary().counts {
            content.push_str(&format!("{kind}\t{count}\n"));
        }
        tokio::fs::write(&path, content).await?;
        artifacts.error_summary = Some(path_string(&path));

        Ok(artifacts)
    }
}

fn path_string(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

/// Response payload for an upload, synchronous or async (where it is
/// summarised onto the task record).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub record_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<ErrorSummary>,
    #[serde(default)]
    pub error_files: ErrorArtifacts,
}

impl UploadResponse {
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: vec![message.clone()],
            message,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tracker_with_entries() -> ErrorTracker {
        let mut tracker = ErrorTracker::new();
        tracker.record(
            2,
            "STY1\tAcme\t",
            RowErrorKind::ValidationError,
            "category must not be empty",
        );
        tracker.record(
            3,
            "STY1\tAcme\tShirts",
            RowErrorKind::DuplicateError,
            "Duplicate style in file: STY1",
        );
        tracker.record(
            4,
            "STY9\tAcme\tShirts",
            RowErrorKind::DependencySkipped,
            "style STY9 not found",
        );
        tracker
    }

    #[test]
    fn test_counts_and_fatality() {
        let tracker = tracker_with_entries();
        assert_eq!(tracker.total(), 3);
        assert_eq!(tracker.fatal_count(), 2);
        assert_eq!(tracker.skipped_count(), 1);
        assert!(tracker.has_fatal());

        let mut skips_only = ErrorTracker::new();
        skips_only.record(2, "x", RowErrorKind::DependencySkipped, "missing");
        assert!(!skips_only.has_fatal());
    }

    #[test]
    fn test_summary_counts_by_kind() {
        let summary = tracker_with_entries().summary();
        assert_eq!(summary.counts["VALIDATION_ERROR"], 1);
        assert_eq!(summary.counts["DUPLICATE_ERROR"], 1);
        assert_eq!(summary.counts["DEPENDENCY_SKIPPED"], 1);
        assert_eq!(summary.top_errors.len(), 2);
        assert!(summary.top_errors[0].starts_with("Row 2:"));
    }

    #[tokio::test]
    async fn test_artifact_files() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker_with_entries();
        let artifacts = tracker
            .write_artifacts(dir.path(), "styles_7_20240101", "style\tbrand\tcategory")
            .await
            .unwrap();

        let validation =
            std::fs::read_to_string(artifacts.validation_errors.as_deref().unwrap()).unwrap();
        assert!(validation.contains("STY1\tAcme\tShirts"));
        assert!(!validation.contains("STY9"));

        let skipped = std::fs::read_to_string(artifacts.skipped_rows.as_deref().unwrap()).unwrap();
        assert!(skipped.contains("STY9"));

        let all = std::fs::read_to_string(artifacts.all_failed_rows.as_deref().unwrap()).unwrap();
        assert!(all.starts_with("style\tbrand\tcategory\tRow_Number\tError_Type\tError_Reason\n"));
        assert!(all.contains("\t3\tDUPLICATE_ERROR\t"));

        let summary = std::fs::read_to_string(artifacts.error_summary.as_deref().unwrap()).unwrap();
        assert!(summary.contains("DEPENDENCY_SKIPPED\t1"));
    }

    #[tokio::test]
    async fn test_no_entries_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ErrorTracker::new()
            .write_artifacts(dir.path(), "styles_1_x", "a\tb")
            .await
            .unwrap();
        assert_eq!(artifacts, ErrorArtifacts::default());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
