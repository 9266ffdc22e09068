//! Report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::{Diagnostic, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Diagnostic counts. Suppressed diagnostics are counted separately
/// and not included in the severity counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of diagnostics, suppressed included
    pub total: usize,

    /// Number of active errors
    pub errors: usize,

    /// Number of active warnings
    pub warnings: usize,

    /// Number of active info messages
    pub info: usize,

    /// Number of suppressed diagnostics
    pub suppressed: usize,
}

impl ReportSummary {
    /// Count a list of diagnostics
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = Self::default();
        for diagnostic in diagnostics {
            summary.add(diagnostic);
        }
        summary
    }

    fn add(&mut self, diagnostic: &Diagnostic) {
        self.total += 1;

        if diagnostic.suppressed {
            self.suppressed += 1;
            return;
        }

        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warn => self.warnings += 1,
            Severity::Info => self.info += 1,
        }
    }
}

/// A diagnostic with its stable fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub fingerprint: String,

    #[serde(flatten)]
    pub diagnostic: Diagnostic,
}

/// Results for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    /// Project name
    pub name: String,

    /// Compliance score (0-100)
    pub score: u32,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All diagnostics, suppressed ones included
    pub diagnostics: Vec<ReportEntry>,
}

impl ProjectReport {
    /// Create a project report from its diagnostics and score
    pub fn new(name: impl Into<String>, score: u32, diagnostics: Vec<Diagnostic>) -> Self {
        let summary = ReportSummary::from_diagnostics(&diagnostics);
        let diagnostics = diagnostics
            .into_iter()
            .map(|diagnostic| ReportEntry {
                fingerprint: diagnostic.fingerprint(),
                diagnostic,
            })
            .collect();

        Self {
            name: name.into(),
            score,
            summary,
            diagnostics,
        }
    }
}

/// Audit report (report.json v1)
///
/// This is the stable output format.
/// All fields are versioned and backward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics across all projects
    pub summary: ReportSummary,

    /// Per-project results, sorted by project name
    pub projects: Vec<ProjectReport>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            projects: Vec::new(),
            metadata: None,
        }
    }

    /// Create a report from project results
    pub fn from_projects(mut projects: Vec<ProjectReport>) -> Self {
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        let mut report = Self::new();
        for project in &projects {
            report.summary.total += project.summary.total;
            report.summary.errors += project.summary.errors;
            report.summary.warnings += project.summary.warnings;
            report.summary.info += project.summary.info;
            report.summary.suppressed += project.summary.suppressed;
        }
        report.projects = projects;
        report
    }

    /// Check if any project has active errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Lowest project score, if any project was audited
    pub fn min_score(&self) -> Option<u32> {
        self.projects.iter().map(|p| p.score).min()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, DiagnosticCode};

    #[test]
    fn empty_report() {
        let report = Report::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_errors());
        assert_eq!(report.min_score(), None);
    }

    #[test]
    fn suppressed_diagnostics_counted_apart() {
        let mut allowed = Diagnostic::for_code(DiagnosticCode::ManyToMany, "m2m");
        allowed.suppress("approved");
        let diagnostics = vec![
            Diagnostic::for_code(DiagnosticCode::BiDirectionalFilters, "bidi"),
            allowed,
            Diagnostic::for_code(DiagnosticCode::MeasureDescription, "no description"),
        ];

        let project = ProjectReport::new("Sales", 88, diagnostics);
        assert_eq!(project.summary.total, 3);
        assert_eq!(project.summary.errors, 1);
        assert_eq!(project.summary.warnings, 1);
        assert_eq!(project.summary.suppressed, 1);
        assert_eq!(project.diagnostics[0].fingerprint.len(), 16);
    }

    #[test]
    fn projects_sorted_by_name() {
        let report = Report::from_projects(vec![
            ProjectReport::new("Zeta", 100, Vec::new()),
            ProjectReport::new("Alpha", 90, vec![Diagnostic::for_code(DiagnosticCode::IoUnreadable, "gone")]),
        ]);

        let names: Vec<&str> = report.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert!(report.has_errors());
        assert_eq!(report.min_score(), Some(90));
    }

    #[test]
    fn report_serialization() {
        let report = Report::from_projects(vec![ProjectReport::new(
            "Sales",
            98,
            vec![Diagnostic::for_code(DiagnosticCode::UnusedMeasures, "unused")],
        )]);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"fingerprint\""));
        assert!(json.contains("\"unused_measures\""));
    }
}
