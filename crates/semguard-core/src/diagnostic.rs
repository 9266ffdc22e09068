//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API
//! (project override files and inline `SKIP_CHECK` directives refer to them).
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    // Governance rules
    /// Auto date/time is enabled or its hidden date tables are present
    AutoDateTime,

    /// Relationship filters in both directions
    BiDirectionalFilters,

    /// Relationship declared many-to-many
    ManyToMany,

    /// Measure has no description
    MeasureDescription,

    /// Table or column name breaks the naming convention
    NamingConvention,

    /// Measure is never referenced
    UnusedMeasures,

    /// Date table is not in import mode
    DateTableMode,

    /// Report visual overrides theme colours
    HardcodedColors,

    // Parse issues
    /// A block could not be parsed and was skipped
    ParseMalformedBlock,

    /// Indentation mixes tabs and spaces
    ParseMixedIndentation,

    /// An object name was declared twice in the same scope
    ParseDuplicateObject,

    // Reference issues
    /// A relationship names a table that was never declared
    ReferenceUnknownTable,

    /// An override or skip directive names an unknown rule
    OverrideUnknownRule,

    // I/O
    /// Project files could not be read
    IoUnreadable,
}

impl DiagnosticCode {
    /// Codes produced by governance rules, in registry order
    pub const RULES: [DiagnosticCode; 8] = [
        Self::AutoDateTime,
        Self::BiDirectionalFilters,
        Self::ManyToMany,
        Self::MeasureDescription,
        Self::NamingConvention,
        Self::UnusedMeasures,
        Self::DateTableMode,
        Self::HardcodedColors,
    ];

    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoDateTime => "auto_date_time",
            Self::BiDirectionalFilters => "bi_directional_filters",
            Self::ManyToMany => "many_to_many",
            Self::MeasureDescription => "measure_description",
            Self::NamingConvention => "naming_convention",
            Self::UnusedMeasures => "unused_measures",
            Self::DateTableMode => "date_table_mode",
            Self::HardcodedColors => "hardcoded_colors",
            Self::ParseMalformedBlock => "parse_malformed_block",
            Self::ParseMixedIndentation => "parse_mixed_indentation",
            Self::ParseDuplicateObject => "parse_duplicate_object",
            Self::ReferenceUnknownTable => "reference_unknown_table",
            Self::OverrideUnknownRule => "override_unknown_rule",
            Self::IoUnreadable => "io_unreadable",
        }
    }

    /// Severity a diagnostic with this code carries unless configured otherwise
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::AutoDateTime
            | Self::BiDirectionalFilters
            | Self::ManyToMany
            | Self::DateTableMode
            | Self::HardcodedColors
            | Self::IoUnreadable => Severity::Error,
            Self::MeasureDescription
            | Self::NamingConvention
            | Self::UnusedMeasures
            | Self::ParseMalformedBlock
            | Self::ParseMixedIndentation
            | Self::ParseDuplicateObject
            | Self::ReferenceUnknownTable
            | Self::OverrideUnknownRule => Severity::Warn,
        }
    }

    /// Whether this code is produced by a governance rule
    pub fn is_rule(&self) -> bool {
        Self::RULES.contains(self)
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that should fail CI
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to project root
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
        }
    }

    /// Create a location with file and line number
    pub fn with_line(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Model object the finding is about, e.g. `Sales[Total Sales]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Set when an override allowed this finding
    #[serde(default)]
    pub suppressed: bool,

    /// Why the finding was suppressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            object: None,
            suppressed: false,
            suppression_reason: None,
        }
    }

    /// Create a diagnostic carrying the code's default severity
    pub fn for_code(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, code.default_severity(), message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the model object
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Mark as suppressed, keeping the diagnostic for traceability
    pub fn suppress(&mut self, reason: impl Into<String>) {
        self.suppressed = true;
        self.suppression_reason = Some(reason.into());
    }

    /// File the diagnostic points at, if any
    pub fn file(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.file.as_str())
    }

    /// Stable identifier across runs: 16 hex chars of
    /// SHA-256 over `code:file:object:message`.
    ///
    /// Line numbers are left out so edits elsewhere in a file do not
    /// change the fingerprint.
    pub fn fingerprint(&self) -> String {
        let input = format!(
            "{}:{}:{}:{}",
            self.code,
            self.file().unwrap_or(""),
            self.object.as_deref().unwrap_or(""),
            self.message
        );
        let hash = Sha256::digest(input.as_bytes());
        hex::encode(&hash[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::BiDirectionalFilters.as_str(), "bi_directional_filters");
        assert_eq!(DiagnosticCode::UnusedMeasures.as_str(), "unused_measures");
        assert_eq!(DiagnosticCode::ParseMalformedBlock.as_str(), "parse_malformed_block");
    }

    #[test]
    fn serde_name_matches_as_str() {
        for code in DiagnosticCode::RULES {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::for_code(
            DiagnosticCode::BiDirectionalFilters,
            "Relationship 'Sales -> Date' filters in both directions",
        )
        .with_location(Location::with_line("relationships.tmdl", 3));

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("bi_directional_filters"));
        assert!(json.contains("error"));
        assert!(!json.contains("suppression_reason"));
    }

    #[test]
    fn suppress_keeps_diagnostic() {
        let mut diag = Diagnostic::for_code(DiagnosticCode::ManyToMany, "m2m");
        diag.suppress("approved");
        assert!(diag.suppressed);
        assert_eq!(diag.suppression_reason.as_deref(), Some("approved"));
    }

    #[test]
    fn fingerprint_ignores_line() {
        let a = Diagnostic::for_code(DiagnosticCode::MeasureDescription, "missing")
            .with_location(Location::with_line("tables/Sales.tmdl", 4))
            .with_object("Sales[Total]");
        let mut b = a.clone();
        b.location = Some(Location::with_line("tables/Sales.tmdl", 40));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }
}
