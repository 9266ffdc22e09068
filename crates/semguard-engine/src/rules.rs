//! Governance rules and the registry that evaluates them
//!
//! Each rule is a pure function over the finished model. Rules are
//! independent of each other and skip items they cannot judge (for
//! example relationships whose endpoints could not be read).

use regex::Regex;
use semguard_core::config::ModelConfig;
use semguard_core::{
    Cardinality, Config, CrossFilterDirection, Diagnostic, DiagnosticCode, Location, Measure,
    Model, Relationship, Severity, StorageMode, Table,
};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Rule check function
pub type CheckFn = fn(&Model, &ModelConfig) -> Vec<Diagnostic>;

/// A governance rule
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub code: DiagnosticCode,

    /// Human-readable name
    pub name: &'static str,

    pub default_severity: Severity,
    pub check: CheckFn,
}

/// Ordered set of rules
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// The built-in rule set, in evaluation order
    pub fn builtin() -> Self {
        let rule = |code: DiagnosticCode, name: &'static str, check: CheckFn| Rule {
            code,
            name,
            default_severity: code.default_severity(),
            check,
        };

        Self {
            rules: vec![
                rule(DiagnosticCode::AutoDateTime, "Auto date/time disabled", check_auto_date_time),
                rule(DiagnosticCode::BiDirectionalFilters, "No bi-directional filters", check_bi_directional_filters),
                rule(DiagnosticCode::ManyToMany, "No many-to-many relationships", check_many_to_many),
                rule(DiagnosticCode::MeasureDescription, "Measures are described", check_measure_description),
                rule(DiagnosticCode::NamingConvention, "Naming conventions", check_naming_convention),
                rule(DiagnosticCode::UnusedMeasures, "No unused measures", check_unused_measures),
                rule(DiagnosticCode::DateTableMode, "Date tables use import mode", check_date_table_mode),
                rule(DiagnosticCode::HardcodedColors, "Visuals use theme colours", check_hardcoded_colors),
            ],
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, code: DiagnosticCode) -> Option<&Rule> {
        self.rules.iter().find(|r| r.code == code)
    }

    /// Run every enabled rule and apply configured severities
    pub fn evaluate(&self, model: &Model, config: &Config) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for rule in &self.rules {
            if !config.is_rule_enabled(rule.code) {
                tracing::debug!(rule = %rule.code, "Rule disabled");
                continue;
            }

            let severity = config.severity_for(rule.code, rule.default_severity);
            let findings = (rule.check)(model, &config.model);
            tracing::debug!(rule = %rule.code, findings = findings.len(), "Evaluated rule");

            diagnostics.extend(findings.into_iter().map(|mut d| {
                d.severity = severity;
                d
            }));
        }

        diagnostics
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Visual properties that pin a colour instead of following the theme
const COLOR_PROPERTIES: &[&str] = &["dataColors", "fill", "fillColor", "defaultColor"];

fn measure_object(table: &Table, measure: &Measure) -> String {
    format!("{}[{}]", table.name, measure.name)
}

fn located(diagnostic: Diagnostic, source: &Option<Location>) -> Diagnostic {
    match source {
        Some(location) => diagnostic.with_location(location.clone()),
        None => diagnostic,
    }
}

/// Generated date tables are the configured utility tables
fn check_auto_date_time(model: &Model, config: &ModelConfig) -> Vec<Diagnostic> {
    let generated: Vec<&Table> = model
        .tables
        .iter()
        .filter(|t| config.is_utility_table(&t.name))
        .collect();

    if generated.is_empty() && model.auto_date_time != Some(true) {
        return Vec::new();
    }

    let message = if generated.is_empty() {
        "Auto date/time is enabled on the model".to_string()
    } else {
        format!(
            "Auto date/time is enabled ({} auto-generated date tables)",
            generated.len()
        )
    };

    // The file stating the setting wins over generated tables
    let stated = model
        .auto_date_time
        .filter(|enabled| *enabled)
        .and(model.auto_date_time_source.clone());
    let source = stated
        .or_else(|| generated.first().and_then(|t| t.source.clone()))
        .or_else(|| model.source.clone());

    vec![located(Diagnostic::for_code(DiagnosticCode::AutoDateTime, message), &source)]
}

fn relationship_findings(
    model: &Model,
    code: DiagnosticCode,
    matches: impl Fn(&Relationship) -> bool,
    describe: &str,
) -> Vec<Diagnostic> {
    model
        .relationships
        .iter()
        .filter(|r| r.has_endpoints() && matches(r))
        .map(|r| {
            let message = format!("Relationship {} {}", r.label(), describe);
            located(Diagnostic::for_code(code, message).with_object(r.label()), &r.source)
        })
        .collect()
}

fn check_bi_directional_filters(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    relationship_findings(
        model,
        DiagnosticCode::BiDirectionalFilters,
        |r| r.cross_filter == CrossFilterDirection::Both,
        "filters in both directions",
    )
}

fn check_many_to_many(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    relationship_findings(
        model,
        DiagnosticCode::ManyToMany,
        |r| r.cardinality == Cardinality::ManyToMany,
        "is many-to-many",
    )
}

fn check_measure_description(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    model
        .measures()
        .filter(|(table, measure)| {
            !table.is_utility
                && measure
                    .description
                    .as_deref()
                    .map_or(true, |d| d.trim().is_empty())
        })
        .map(|(table, measure)| {
            let object = measure_object(table, measure);
            let message = format!("Measure {} has no description", object);
            located(
                Diagnostic::for_code(DiagnosticCode::MeasureDescription, message).with_object(object),
                &measure.source,
            )
        })
        .collect()
}

fn default_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(Table|Query|Column)\s*\d+$").expect("valid regex")
    })
}

/// Naming problems of one table or column name
fn naming_issues(name: &str) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if name.contains('_') {
        issues.push("contains an underscore");
    }
    if name.chars().next().is_some_and(char::is_lowercase) {
        issues.push("starts with a lowercase letter");
    }
    if default_name_pattern().is_match(name) {
        issues.push("is a default name");
    }
    issues
}

fn check_naming_convention(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for table in model.tables.iter().filter(|t| !t.is_utility) {
        let issues = naming_issues(&table.name);
        if !issues.is_empty() {
            let message = format!("Table '{}' {}", table.name, issues.join(", "));
            diagnostics.push(located(
                Diagnostic::for_code(DiagnosticCode::NamingConvention, message).with_object(table.name.clone()),
                &table.source,
            ));
        }

        for column in &table.columns {
            let issues = naming_issues(&column.name);
            if !issues.is_empty() {
                let object = format!("{}[{}]", table.name, column.name);
                let message = format!("Column {} {}", object, issues.join(", "));
                diagnostics.push(located(
                    Diagnostic::for_code(DiagnosticCode::NamingConvention, message).with_object(object),
                    &column.source,
                ));
            }
        }
    }

    diagnostics
}

fn check_unused_measures(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    model
        .measures()
        .filter(|(table, measure)| {
            !table.is_utility && measure.reference_count == 0 && !measure.is_internal()
        })
        .map(|(table, measure)| {
            let object = measure_object(table, measure);
            let message = format!("Measure {} is never referenced", object);
            located(
                Diagnostic::for_code(DiagnosticCode::UnusedMeasures, message).with_object(object),
                &measure.source,
            )
        })
        .collect()
}

fn check_date_table_mode(model: &Model, config: &ModelConfig) -> Vec<Diagnostic> {
    model
        .tables
        .iter()
        .filter(|t| config.is_date_table(&t.name))
        .filter_map(|table| {
            let mode = table.storage_mode.unwrap_or(StorageMode::Import);
            if mode == StorageMode::Import {
                return None;
            }
            let message = format!(
                "Date table '{}' uses {} storage mode; use import",
                table.name, mode
            );
            Some(located(
                Diagnostic::for_code(DiagnosticCode::DateTableMode, message).with_object(table.name.clone()),
                &table.source,
            ))
        })
        .collect()
}

/// Colour properties anywhere in a visual definition, sorted
fn color_properties(value: &serde_json::Value, found: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                if COLOR_PROPERTIES.contains(&key.as_str()) {
                    found.insert(key.clone());
                } else {
                    color_properties(value, found);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                color_properties(item, found);
            }
        }
        _ => {}
    }
}

fn check_hardcoded_colors(model: &Model, _config: &ModelConfig) -> Vec<Diagnostic> {
    model
        .visuals
        .iter()
        .filter_map(|visual| {
            let mut found = BTreeSet::new();
            color_properties(&visual.definition, &mut found);
            if found.is_empty() {
                return None;
            }
            let properties: Vec<String> = found.into_iter().collect();
            let message = format!(
                "Visual '{}' hardcodes colours ({}); they will not follow the theme",
                visual.name,
                properties.join(", ")
            );
            Some(located(
                Diagnostic::for_code(DiagnosticCode::HardcodedColors, message).with_object(visual.name.clone()),
                &visual.source,
            ))
        })
        .collect()
}
