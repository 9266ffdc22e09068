//! Model builder
//!
//! Folds the block streams of one project's files into a typed [`Model`],
//! then runs two derivation passes over the finished model: table kind
//! from relationship topology, and measure reference counts.

use semguard_core::config::ModelConfig;
use semguard_core::{
    CalculationGroup, CalculationItem, Cardinality, Column, CrossFilterDirection, Diagnostic,
    DiagnosticCode, Hierarchy, Location, Measure, Model, Partition, Relationship, Role,
    StorageMode, Table, TableKind, TablePermission, Visual,
};
use std::collections::HashSet;

use crate::references::{count_references, split_column_ref};
use crate::tokenizer::{unquote, Block, BodyLine, Keyword, LexIssueKind, Tokenizer};

/// Annotation carrying the auto date/time switch
const TIME_INTELLIGENCE_ANNOTATION: &str = "__PBI_TimeIntelligenceEnabled";

/// Builder options
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderOptions {
    /// Utility-table patterns (kept, flagged hidden)
    pub config: ModelConfig,
}

impl BuilderOptions {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

/// Result of building one project
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub model: Model,

    /// Parse and reference diagnostics, in file order
    pub diagnostics: Vec<Diagnostic>,
}

/// Model object a block's properties apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Model,
    Table(usize),
    Column(usize, usize),
    Measure(usize, usize),
    Partition(usize, usize),
    Hierarchy(usize, usize),
    CalculationGroup(usize),
    CalculationItem(usize, usize),
    Relationship(usize),
    Role(usize),
    TablePermission(usize, usize),

    /// Duplicates, misplaced blocks and objects the model does not keep
    Ignored,
}

/// Relationship plus the cardinality parts it was declared with
#[derive(Debug, Default)]
struct RelationshipDraft {
    relationship: Relationship,
    from_cardinality: Option<String>,
    to_cardinality: Option<String>,
    cardinality: Option<Cardinality>,
}

impl RelationshipDraft {
    fn finish(mut self) -> Relationship {
        self.relationship.cardinality = self.cardinality.unwrap_or_else(|| {
            let from = self.from_cardinality.as_deref().unwrap_or("many");
            let to = self.to_cardinality.as_deref().unwrap_or("one");
            match (from.eq_ignore_ascii_case("many"), to.eq_ignore_ascii_case("many")) {
                (true, true) => Cardinality::ManyToMany,
                (false, false) => Cardinality::OneToOne,
                _ => Cardinality::OneToMany,
            }
        });
        self.relationship
    }
}

/// Builds a [`Model`] from the TMDL files of one project
#[derive(Debug)]
pub struct ModelBuilder {
    options: BuilderOptions,
    model: Model,
    relationships: Vec<RelationshipDraft>,
    diagnostics: Vec<Diagnostic>,

    /// Raw visual definitions, scanned for measure references
    visual_texts: Vec<String>,

    /// Where the time-intelligence annotation was declared
    annotation_source: Option<Location>,
}

impl ModelBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        Self {
            options,
            model: Model::new(),
            relationships: Vec::new(),
            diagnostics: Vec::new(),
            visual_texts: Vec::new(),
            annotation_source: None,
        }
    }

    /// Add one report visual definition. Text that is not valid JSON still
    /// counts for measure references.
    pub fn add_visual(&mut self, path: &str, text: &str) {
        let definition = match serde_json::from_str(text.trim_start_matches('\u{feff}')) {
            Ok(definition) => definition,
            Err(e) => {
                tracing::debug!(file = path, error = %e, "Visual is not valid JSON");
                serde_json::Value::Null
            }
        };

        self.model.visuals.push(Visual {
            name: visual_name(path),
            definition,
            source: Some(Location::new(path)),
        });
        self.visual_texts.push(text.to_string());
    }

    /// Add one file of the project. `path` is used in diagnostics.
    pub fn add_file(&mut self, path: &str, text: &str) {
        let mut stack: Vec<(usize, Target)> = Vec::new();
        let mut blocks = 0usize;

        for block in Tokenizer::new(text) {
            blocks += 1;
            self.report_issues(path, &block);

            match block.keyword {
                Keyword::Malformed => {
                    stack.retain(|(depth, _)| *depth < block.depth);
                }
                Keyword::Continuation => {
                    stack.retain(|(depth, _)| *depth <= block.depth);
                    if let Some(&(depth, target)) = stack.last() {
                        if depth == block.depth {
                            self.apply(target, &block.body_lines);
                        }
                    }
                }
                _ => {
                    stack.retain(|(depth, _)| *depth < block.depth);
                    let parent = stack.last().map(|&(_, target)| target);
                    let target = self.open(path, parent, &block);
                    self.apply(target, &block.body_lines);
                    stack.push((block.depth, target));
                }
            }
        }

        tracing::debug!(file = path, blocks, "Folded TMDL file into model");
    }

    /// Finish the model: resolve relationships and run the derivation passes
    pub fn build(mut self, external_references: &[String]) -> BuildOutput {
        let drafts = std::mem::take(&mut self.relationships);
        self.model.relationships = drafts.into_iter().map(RelationshipDraft::finish).collect();

        self.resolve_relationships();
        self.derive_storage_modes();
        self.derive_auto_date_time();
        self.derive_table_kinds();
        self.count_measure_references(external_references);

        tracing::debug!(
            tables = self.model.tables.len(),
            relationships = self.model.relationships.len(),
            diagnostics = self.diagnostics.len(),
            "Built model"
        );

        BuildOutput {
            model: self.model,
            diagnostics: self.diagnostics,
        }
    }

    fn report_issues(&mut self, path: &str, block: &Block) {
        for issue in &block.issues {
            let location = Location::with_line(path, issue.line);
            let diagnostic = match &issue.kind {
                LexIssueKind::MixedIndentation => Diagnostic::for_code(
                    DiagnosticCode::ParseMixedIndentation,
                    "Indentation mixes tabs and spaces",
                ),
                LexIssueKind::Malformed(reason) => Diagnostic::for_code(
                    DiagnosticCode::ParseMalformedBlock,
                    format!("Malformed block skipped: {}", reason),
                ),
            };
            let diagnostic = match &block.identifier {
                Some(name) => diagnostic.with_object(name.clone()),
                None => diagnostic,
            };
            self.diagnostics.push(diagnostic.with_location(location));
        }
    }

    fn duplicate(&mut self, path: &str, block: &Block, object: String) -> Target {
        self.diagnostics.push(
            Diagnostic::for_code(
                DiagnosticCode::ParseDuplicateObject,
                format!("Duplicate {} '{}' ignored", block.keyword, object),
            )
            .with_location(Location::with_line(path, block.start_line))
            .with_object(object),
        );
        Target::Ignored
    }

    /// Create the object a header block declares
    fn open(&mut self, path: &str, parent: Option<Target>, block: &Block) -> Target {
        let name = block.identifier.clone().unwrap_or_default();
        let source = Some(Location::with_line(path, block.start_line));
        let description = block.doc_text();

        match (block.keyword, parent) {
            (Keyword::Table, None) => {
                if self.model.has_table(&name) {
                    return self.duplicate(path, block, name);
                }
                let is_utility = self.options.config.is_utility_table(&name);
                self.model.tables.push(Table {
                    is_hidden: is_utility,
                    is_utility,
                    description,
                    source,
                    ..Table::new(name)
                });
                Target::Table(self.model.tables.len() - 1)
            }

            (Keyword::Column, Some(Target::Table(t))) => {
                let table = &self.model.tables[t];
                if table.find_column(&name).is_some() {
                    let object = format!("{}[{}]", table.name, name);
                    return self.duplicate(path, block, object);
                }
                let table = &mut self.model.tables[t];
                table.columns.push(Column {
                    expression: block.expression.clone(),
                    description,
                    source,
                    ..Column::new(name)
                });
                Target::Column(t, table.columns.len() - 1)
            }

            (Keyword::Measure, Some(Target::Table(t))) => {
                let table = &self.model.tables[t];
                if table.find_measure(&name).is_some() {
                    let object = format!("{}[{}]", table.name, name);
                    return self.duplicate(path, block, object);
                }
                let table = &mut self.model.tables[t];
                table.measures.push(Measure {
                    description,
                    source,
                    ..Measure::new(name, block.expression.clone().unwrap_or_default())
                });
                Target::Measure(t, table.measures.len() - 1)
            }

            (Keyword::Partition, Some(Target::Table(t))) => {
                let table = &mut self.model.tables[t];
                table.partitions.push(Partition {
                    name,
                    kind: block.header_value.clone(),
                    ..Partition::default()
                });
                Target::Partition(t, table.partitions.len() - 1)
            }

            (Keyword::Hierarchy, Some(Target::Table(t))) => {
                let table = &mut self.model.tables[t];
                table.hierarchies.push(Hierarchy {
                    name,
                    levels: Vec::new(),
                });
                Target::Hierarchy(t, table.hierarchies.len() - 1)
            }

            (Keyword::Level, Some(Target::Hierarchy(t, h))) => {
                self.model.tables[t].hierarchies[h].levels.push(name);
                Target::Ignored
            }

            (Keyword::CalculationGroup, Some(Target::Table(t))) => {
                self.model.calculation_groups.push(CalculationGroup {
                    table: self.model.tables[t].name.clone(),
                    items: Vec::new(),
                });
                Target::CalculationGroup(self.model.calculation_groups.len() - 1)
            }

            (Keyword::CalculationItem, Some(Target::CalculationGroup(g))) => {
                let group = &mut self.model.calculation_groups[g];
                group.items.push(CalculationItem {
                    name,
                    expression: block.expression.clone().unwrap_or_default(),
                    format_string: None,
                });
                Target::CalculationItem(g, group.items.len() - 1)
            }

            (Keyword::Relationship, None) => {
                self.relationships.push(RelationshipDraft {
                    relationship: Relationship {
                        name,
                        is_active: true,
                        source,
                        ..Relationship::default()
                    },
                    ..RelationshipDraft::default()
                });
                Target::Relationship(self.relationships.len() - 1)
            }

            (Keyword::Role, None) => {
                self.model.roles.push(Role {
                    name,
                    source,
                    ..Role::default()
                });
                Target::Role(self.model.roles.len() - 1)
            }

            (Keyword::TablePermission, Some(Target::Role(r))) => {
                let role = &mut self.model.roles[r];
                role.table_permissions.push(TablePermission {
                    table: name,
                    filter_expression: block.expression.clone().unwrap_or_default(),
                });
                Target::TablePermission(r, role.table_permissions.len() - 1)
            }

            (Keyword::Model, None) => {
                self.model.display_name = Some(name);
                self.model.source = source;
                Target::Model
            }

            (Keyword::Annotation, None | Some(Target::Model)) => {
                let value = block.header_value.as_deref().map(unquote).unwrap_or_default();
                if name == TIME_INTELLIGENCE_ANNOTATION {
                    self.annotation_source = source;
                }
                self.model.annotations.insert(name, value.to_string());
                Target::Ignored
            }

            (keyword, parent) => {
                tracing::trace!(%keyword, ?parent, line = block.start_line, "Block not kept in model");
                Target::Ignored
            }
        }
    }

    /// Apply property lines to an object
    fn apply(&mut self, target: Target, properties: &[BodyLine]) {
        for property in properties {
            let value = property.value.as_deref().map(unquote);
            let text = || value.map(str::to_string);

            match target {
                Target::Model => match property.key.as_str() {
                    "culture" => self.model.culture = text(),
                    "autoDateTime" => {
                        self.model.auto_date_time = Some(flag(property));
                        self.model.auto_date_time_source = self
                            .model
                            .source
                            .as_ref()
                            .map(|source| Location::with_line(source.file.clone(), property.line));
                    }
                    _ => {}
                },

                Target::Table(t) => {
                    let table = &mut self.model.tables[t];
                    match property.key.as_str() {
                        "isHidden" => table.is_hidden = table.is_utility || flag(property),
                        "description" => table.description = text(),
                        _ => {}
                    }
                }

                Target::Column(t, c) => {
                    let column = &mut self.model.tables[t].columns[c];
                    match property.key.as_str() {
                        "dataType" => column.data_type = text(),
                        "isHidden" => column.is_hidden = flag(property),
                        "displayFolder" => column.display_folder = text(),
                        "description" => column.description = text(),
                        "expression" => column.expression = text(),
                        _ => {}
                    }
                }

                Target::Measure(t, m) => {
                    let measure = &mut self.model.tables[t].measures[m];
                    match property.key.as_str() {
                        "description" => measure.description = text(),
                        "displayFolder" => measure.display_folder = text(),
                        "formatString" => measure.format_string = text(),
                        "isHidden" => measure.is_hidden = flag(property),
                        _ => {}
                    }
                }

                Target::Partition(t, p) => {
                    let partition = &mut self.model.tables[t].partitions[p];
                    match property.key.as_str() {
                        "mode" => partition.mode = value.and_then(StorageMode::parse),
                        "source" => partition.source_expression = text(),
                        _ => {}
                    }
                }

                Target::CalculationItem(g, i) => {
                    if property.key == "formatStringDefinition" {
                        self.model.calculation_groups[g].items[i].format_string = text();
                    }
                }

                Target::Relationship(r) => {
                    self.apply_relationship(r, property, value);
                }

                Target::Role(r) => {
                    if property.key == "modelPermission" {
                        self.model.roles[r].model_permission = text();
                    }
                }

                Target::Hierarchy(..)
                | Target::CalculationGroup(_)
                | Target::TablePermission(..)
                | Target::Ignored => {}
            }
        }
    }

    fn apply_relationship(&mut self, index: usize, property: &BodyLine, value: Option<&str>) {
        let draft = &mut self.relationships[index];
        let relationship = &mut draft.relationship;

        match property.key.as_str() {
            "fromColumn" | "toColumn" => {
                let (table, column) = value
                    .and_then(split_column_ref)
                    .unwrap_or_default();
                if property.key == "fromColumn" {
                    relationship.from_table = table;
                    relationship.from_column = column;
                } else {
                    relationship.to_table = table;
                    relationship.to_column = column;
                }
            }
            "crossFilteringBehavior" => {
                relationship.cross_filter = match value {
                    Some(v) if v.eq_ignore_ascii_case("bothDirections") => CrossFilterDirection::Both,
                    _ => CrossFilterDirection::Single,
                };
            }
            "isActive" => relationship.is_active = flag(property),
            "fromCardinality" => draft.from_cardinality = value.map(str::to_string),
            "toCardinality" => draft.to_cardinality = value.map(str::to_string),
            "cardinality" => {
                draft.cardinality = value.and_then(|v| match v.to_ascii_lowercase().as_str() {
                    "manytomany" => Some(Cardinality::ManyToMany),
                    "onetoone" => Some(Cardinality::OneToOne),
                    "onetomany" | "manytoone" => Some(Cardinality::OneToMany),
                    _ => None,
                });
            }
            _ => {}
        }
    }

    /// Flag relationships whose ends name undeclared tables
    fn resolve_relationships(&mut self) {
        let declared: HashSet<&str> = self.model.tables.iter().map(|t| t.name.as_str()).collect();
        let mut findings = Vec::new();

        for (index, relationship) in self.model.relationships.iter().enumerate() {
            let missing: Vec<&str> = [relationship.from_table.as_str(), relationship.to_table.as_str()]
                .into_iter()
                .filter(|table| !declared.contains(table))
                .collect();

            if missing.is_empty() {
                findings.push((index, None));
                continue;
            }

            let message = if missing.iter().any(|t| t.is_empty()) {
                format!("Relationship '{}' has an unreadable endpoint", relationship.name)
            } else {
                format!(
                    "Relationship '{}' references unknown table '{}'",
                    relationship.name,
                    missing.join("', '")
                )
            };
            let mut diagnostic = Diagnostic::for_code(DiagnosticCode::ReferenceUnknownTable, message)
                .with_object(relationship.label());
            if let Some(location) = &relationship.source {
                diagnostic = diagnostic.with_location(location.clone());
            }
            findings.push((index, Some(diagnostic)));
        }

        for (index, diagnostic) in findings {
            let relationship = &mut self.model.relationships[index];
            relationship.resolved = diagnostic.is_none();
            self.diagnostics.extend(diagnostic);
        }
    }

    /// Table storage mode comes from its first partition declaring one
    fn derive_storage_modes(&mut self) {
        for table in &mut self.model.tables {
            table.storage_mode = table.partitions.iter().find_map(|p| p.mode);
        }
    }

    fn derive_auto_date_time(&mut self) {
        if self.model.auto_date_time.is_none() {
            self.model.auto_date_time = self
                .model
                .annotations
                .get(TIME_INTELLIGENCE_ANNOTATION)
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"));
            if self.model.auto_date_time.is_some() {
                self.model.auto_date_time_source = self.annotation_source.take();
            }
        }
    }

    /// Fact tables filter from the many side; dimensions only appear as targets
    fn derive_table_kinds(&mut self) {
        let from: HashSet<&str> = self.model.relationships.iter().map(|r| r.from_table.as_str()).collect();
        let to: HashSet<&str> = self.model.relationships.iter().map(|r| r.to_table.as_str()).collect();

        let kinds: Vec<TableKind> = self
            .model
            .tables
            .iter()
            .map(|table| {
                if from.contains(table.name.as_str()) {
                    TableKind::Fact
                } else if to.contains(table.name.as_str()) {
                    TableKind::Dimension
                } else {
                    TableKind::Unknown
                }
            })
            .collect();

        for (table, kind) in self.model.tables.iter_mut().zip(kinds) {
            table.kind = kind;
        }
    }

    fn count_measure_references(&mut self, external_references: &[String]) {
        let counts: Vec<Vec<usize>> = {
            let model = &self.model;
            let texts: Vec<&str> = model
                .tables
                .iter()
                .flat_map(|t| {
                    t.measures
                        .iter()
                        .map(|m| m.expression.as_str())
                        .chain(t.columns.iter().filter_map(|c| c.expression.as_deref()))
                })
                .chain(
                    model
                        .calculation_groups
                        .iter()
                        .flat_map(|g| g.items.iter().map(|i| i.expression.as_str())),
                )
                .chain(self.visual_texts.iter().map(String::as_str))
                .chain(external_references.iter().map(String::as_str))
                .collect();

            model
                .tables
                .iter()
                .map(|t| {
                    t.measures
                        .iter()
                        .map(|m| count_references(&m.name, texts.iter().copied()))
                        .collect()
                })
                .collect()
        };

        for (table, table_counts) in self.model.tables.iter_mut().zip(counts) {
            for (measure, count) in table.measures.iter_mut().zip(table_counts) {
                measure.reference_count = count;
            }
        }
    }
}

/// Folder holding a `visual.json`, or the path itself
fn visual_name(path: &str) -> String {
    let mut parts = path.rsplit('/');
    let file = parts.next().unwrap_or(path);
    parts.next().unwrap_or(file).to_string()
}

/// Bare flags are true; `flag: false` is false
fn flag(property: &BodyLine) -> bool {
    property
        .value
        .as_deref()
        .map(|value| unquote(value).eq_ignore_ascii_case("true"))
        .unwrap_or(true)
}
