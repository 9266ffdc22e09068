//! Audit pipeline
//!
//! One project runs tokenize -> build -> evaluate -> resolve overrides ->
//! score, strictly in that order. Projects are independent and run in
//! parallel; the only shared state is the audit sink.

use rayon::prelude::*;
use semguard_core::{AuditRecord, Config, Diagnostic, DiagnosticCode, Location, Model, ProjectReport};
use semguard_tmdl::{BuilderOptions, ModelBuilder};
use std::path::{Path, PathBuf};

use crate::audit::AuditSink;
use crate::loader::{self, ProjectInput};
use crate::overrides::{self, AliasIndex, OverrideSet};
use crate::rules::RuleRegistry;
use crate::score::score;

/// Outcome of auditing one project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectResult {
    pub name: String,

    /// All diagnostics, suppressed ones included
    pub diagnostics: Vec<Diagnostic>,

    pub score: u32,

    model: Model,
}

impl ProjectResult {
    /// The model the rules ran against
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Diagnostics no override allowed
    pub fn active(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.suppressed)
    }

    pub fn passed(&self, pass_mark: u32) -> bool {
        self.score >= pass_mark
    }

    pub fn to_report(&self) -> ProjectReport {
        ProjectReport::new(self.name.clone(), self.score, self.diagnostics.clone())
    }

    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord::new(self.name.clone(), self.score, &self.diagnostics)
    }

    fn unreadable(name: String, location: &Path, message: String) -> Self {
        let diagnostic = Diagnostic::for_code(DiagnosticCode::IoUnreadable, message)
            .with_location(Location::new(location.display().to_string()));
        Self {
            name,
            diagnostics: vec![diagnostic],
            score: 0,
            model: Model::default(),
        }
    }
}

/// Audits projects against one configuration
#[derive(Debug, Clone)]
pub struct Auditor {
    config: Config,
    registry: RuleRegistry,
    aliases: AliasIndex,
}

impl Auditor {
    pub fn new(config: Config) -> Self {
        Self {
            aliases: AliasIndex::from_config(&config.aliases),
            registry: RuleRegistry::builtin(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Audit a project already loaded into memory
    pub fn audit_project(&self, input: &ProjectInput) -> ProjectResult {
        let mut builder = ModelBuilder::new(BuilderOptions::from_config(&self.config.model));
        let mut overrides = OverrideSet::new();
        overrides.allow_entries(&self.config.overrides);
        overrides.allow_entries(&input.project_config.overrides);

        for file in &input.files {
            builder.add_file(&file.path, &file.text);
            overrides.add_file(&file.path, &file.text);
        }
        for visual in &input.visuals {
            builder.add_visual(&visual.path, &visual.text);
        }

        let output = builder.build(&input.external_references);
        let mut diagnostics = output.diagnostics;
        diagnostics.extend(self.registry.evaluate(&output.model, &self.config));
        diagnostics.extend(overrides.validate(&self.aliases));

        overrides::resolve(&mut diagnostics, &overrides, &self.aliases);
        let score = score(&diagnostics);

        tracing::debug!(
            project = %input.name,
            diagnostics = diagnostics.len(),
            score,
            "Audited project"
        );

        ProjectResult {
            name: input.name.clone(),
            diagnostics,
            score,
            model: output.model,
        }
    }

    /// Load and audit one project directory.
    ///
    /// A project that cannot be read scores 0 with a single `io_unreadable` error.
    pub fn audit_dir(&self, dir: &Path) -> ProjectResult {
        match loader::load_project(dir) {
            Ok(input) => self.audit_project(&input),
            Err(e) => {
                tracing::warn!(project = %dir.display(), error = %e, "Project unreadable");
                ProjectResult::unreadable(loader::project_name(dir), dir, e.to_string())
            }
        }
    }

    /// Audit project directories in parallel, recording each result in
    /// `sink`. Results are sorted by project name.
    pub fn audit_batch(&self, dirs: &[PathBuf], sink: &dyn AuditSink) -> Vec<ProjectResult> {
        let mut results: Vec<ProjectResult> = dirs
            .par_iter()
            .map(|dir| {
                let result = self.audit_dir(dir);
                sink.record(result.audit_record());
                result
            })
            .collect();

        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Audit in-memory projects in parallel
    pub fn audit_inputs(&self, inputs: &[ProjectInput], sink: &dyn AuditSink) -> Vec<ProjectResult> {
        let mut results: Vec<ProjectResult> = inputs
            .par_iter()
            .map(|input| {
                let result = self.audit_project(input);
                sink.record(result.audit_record());
                result
            })
            .collect();

        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use pretty_assertions::assert_eq;

    const MODEL: &str = "table Sales\n\tmeasure Total = 1\n\t\tdescription: Sum\n\tmeasure Count = [Total]\n\t\tdescription: Rows\n";

    #[test]
    fn stages_run_in_order() {
        let input = ProjectInput::new("Sales").with_file("sales.tmdl", MODEL);
        let result = Auditor::default().audit_project(&input);

        let codes: Vec<DiagnosticCode> = result.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::UnusedMeasures]);
        assert_eq!(result.score, 98);
        assert_eq!(result.model().tables[0].measures[0].reference_count, 1);
    }

    #[test]
    fn unreadable_project_scores_zero() {
        let result = Auditor::default().audit_dir(Path::new("/nonexistent/Gone.SemanticModel"));

        assert_eq!(result.name, "Gone");
        assert_eq!(result.score, 0);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, DiagnosticCode::IoUnreadable);
    }

    #[test]
    fn batch_results_are_sorted_and_recorded() {
        let inputs = vec![
            ProjectInput::new("Zeta").with_file("m.tmdl", MODEL),
            ProjectInput::new("Alpha").with_file("m.tmdl", MODEL),
            ProjectInput::new("Mid").with_file("m.tmdl", "table t_bad\n"),
        ];
        let sink = MemorySink::new();
        let results = Auditor::default().audit_inputs(&inputs, &sink);

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);

        let records = sink.into_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].project, "Mid");
        assert_eq!(records[1].failed_rules, "naming_convention");
    }
}
