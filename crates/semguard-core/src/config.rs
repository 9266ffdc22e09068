//! Configuration schema (semguard.toml) and project overrides (project_config.json)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Per-rule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetting {
    /// Whether the rule runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Severity override for findings of this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Default for RuleSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            severity: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Extra alias groups for rule codes used in overrides and skip directives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Each group lists names that all mean the same rule
    #[serde(default)]
    pub groups: Vec<Vec<String>>,
}

/// Model-building options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Utility tables kept in the model but flagged hidden (glob patterns)
    #[serde(default = "default_utility_tables")]
    pub utility_tables: Vec<String>,

    /// Names treated as the model's date table (case-insensitive)
    #[serde(default = "default_date_tables")]
    pub date_tables: Vec<String>,
}

fn default_utility_tables() -> Vec<String> {
    vec!["LocalDateTable_*".to_string(), "DateTableTemplate_*".to_string()]
}

fn default_date_tables() -> Vec<String> {
    vec!["Date".to_string(), "Calendar".to_string()]
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            utility_tables: default_utility_tables(),
            date_tables: default_date_tables(),
        }
    }
}

impl ModelConfig {
    /// Check if a table name matches a utility pattern
    pub fn is_utility_table(&self, name: &str) -> bool {
        matches_pattern(name, &self.utility_tables)
    }

    /// Check if a table name is a configured date table
    pub fn is_date_table(&self, name: &str) -> bool {
        self.date_tables.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

/// Score thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Projects scoring below this fail the run
    #[serde(default = "default_pass_mark")]
    pub pass_mark: u32,
}

fn default_pass_mark() -> u32 {
    70
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pass_mark: default_pass_mark(),
        }
    }
}

/// One entry of a project allow-list.
///
/// Accepts both `allow_bi_directional_filters = true` and
/// `bi_directional_filters = { allowed = true }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowEntry {
    Flag(bool),
    Table { allowed: bool },
}

impl AllowEntry {
    pub fn is_allowed(&self) -> bool {
        match self {
            Self::Flag(allowed) | Self::Table { allowed } => *allowed,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Per-rule settings keyed by rule code
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSetting>,

    /// Alias groups
    #[serde(default)]
    pub aliases: AliasConfig,

    /// Model-building options
    #[serde(default)]
    pub model: ModelConfig,

    /// Allow-list applied to every project
    #[serde(default)]
    pub overrides: BTreeMap<String, AllowEntry>,

    /// Score thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Whether a rule is enabled (rules are enabled unless configured off)
    pub fn is_rule_enabled(&self, code: DiagnosticCode) -> bool {
        self.rules
            .get(code.as_str())
            .map(|r| r.enabled)
            .unwrap_or(true)
    }

    /// Get severity for a diagnostic code, or default
    pub fn severity_for(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.rules
            .get(code.as_str())
            .and_then(|r| r.severity)
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_severity(&mut self, code: DiagnosticCode, severity: Severity) {
        self.rules
            .entry(code.as_str().to_string())
            .or_default()
            .severity = Some(severity);
    }

    /// Enable or disable a rule
    pub fn set_enabled(&mut self, code: DiagnosticCode, enabled: bool) {
        self.rules
            .entry(code.as_str().to_string())
            .or_default()
            .enabled = enabled;
    }
}

/// Per-project overrides (project_config.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Allow-list keyed by rule code, alias or `allow_<code>`
    #[serde(default)]
    pub overrides: BTreeMap<String, AllowEntry>,
}

impl ProjectConfig {
    /// Parse project overrides from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let json = json.trim_start_matches('\u{feff}');
        serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load project overrides from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&contents)
    }
}

/// Check if a name matches any pattern in the list
pub fn matches_pattern(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        // Simple glob matching (* and **)
        if pattern.contains('*') {
            glob_match(pattern, name)
        } else {
            pattern == name
        }
    })
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.is_rule_enabled(DiagnosticCode::UnusedMeasures));
        assert_eq!(config.scoring.pass_mark, 70);
        assert!(config.model.is_utility_table("LocalDateTable_1f2e"));
    }

    #[test]
    fn severity_override() {
        let mut config = Config::default();
        config.set_severity(DiagnosticCode::NamingConvention, Severity::Info);

        assert_eq!(
            config.severity_for(DiagnosticCode::NamingConvention, Severity::Warn),
            Severity::Info
        );
        assert_eq!(
            config.severity_for(DiagnosticCode::ManyToMany, Severity::Error),
            Severity::Error
        );
    }

    #[test]
    fn saved_config_loads_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("semguard.toml");

        let mut config = Config::default();
        config.set_severity(DiagnosticCode::HardcodedColors, Severity::Warn);
        config.model.utility_tables.push("Scratch_*".to_string());
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
        assert!(Config::from_file(&temp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn rules_from_toml() {
        let config = Config::from_toml(
            r#"
            [rules.naming_convention]
            enabled = false

            [rules.unused_measures]
            severity = "info"

            [aliases]
            groups = [["date_table_mode", "datemode"]]

            [overrides]
            allow_many_to_many = true
            "#,
        )
        .unwrap();

        assert!(!config.is_rule_enabled(DiagnosticCode::NamingConvention));
        assert!(config.is_rule_enabled(DiagnosticCode::UnusedMeasures));
        assert_eq!(
            config.severity_for(DiagnosticCode::UnusedMeasures, Severity::Warn),
            Severity::Info
        );
        assert_eq!(config.aliases.groups.len(), 1);
        assert!(config.overrides["allow_many_to_many"].is_allowed());
    }

    #[test]
    fn project_config_accepts_both_forms() {
        let project = ProjectConfig::from_json(
            r#"{"overrides": {
                "allow_bi_directional_filters": true,
                "many_to_many": {"allowed": false}
            }}"#,
        )
        .unwrap();

        assert!(project.overrides["allow_bi_directional_filters"].is_allowed());
        assert!(!project.overrides["many_to_many"].is_allowed());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config::default();
        config.set_enabled(DiagnosticCode::DateTableMode, false);
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.rules, parsed.rules);
        assert_eq!(config.model, parsed.model);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("LocalDateTable_*", "LocalDateTable_abc"));
        assert!(glob_match("*_Helper", "Dates_Helper"));
        assert!(!glob_match("LocalDateTable_*", "Sales"));
        assert!(!glob_match("ab*ba", "aba"));
    }
}
