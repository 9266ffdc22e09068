//! Audit records (one row per evaluated project)
//!
//! Persisting records (CSV, database) is left to the consumer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::diagnostic::{Diagnostic, Severity};

/// Summary of one project evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Evaluation time (ISO 8601)
    pub timestamp: String,

    /// Project identifier
    pub project: String,

    /// Compliance score (0-100)
    pub score: u32,

    /// Active (unsuppressed) errors
    pub errors: usize,

    /// Active (unsuppressed) warnings
    pub warnings: usize,

    /// Sorted, unique codes of active errors and warnings, joined with `; `
    pub failed_rules: String,
}

impl AuditRecord {
    /// Build a record stamped with the current time
    pub fn new(project: impl Into<String>, score: u32, diagnostics: &[Diagnostic]) -> Self {
        Self::at(chrono::Utc::now().to_rfc3339(), project, score, diagnostics)
    }

    /// Build a record with an explicit timestamp
    pub fn at(
        timestamp: impl Into<String>,
        project: impl Into<String>,
        score: u32,
        diagnostics: &[Diagnostic],
    ) -> Self {
        let active = || diagnostics.iter().filter(|d| !d.suppressed);

        let failed: BTreeSet<&str> = active()
            .filter(|d| d.severity >= Severity::Warn)
            .map(|d| d.code.as_str())
            .collect();

        Self {
            timestamp: timestamp.into(),
            project: project.into(),
            score,
            errors: active().filter(|d| d.severity == Severity::Error).count(),
            warnings: active().filter(|d| d.severity == Severity::Warn).count(),
            failed_rules: failed.into_iter().collect::<Vec<_>>().join("; "),
        }
    }

    /// Whether the project met the pass mark
    pub fn passed(&self, pass_mark: u32) -> bool {
        self.score >= pass_mark
    }
}
