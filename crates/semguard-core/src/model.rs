//! Typed semantic model
//!
//! Built once per project by the TMDL builder and read by rules,
//! the score calculator and documentation generators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostic::Location;

/// Derived table classification based on relationship topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Many side of at least one relationship
    Fact,

    /// Only ever referenced by other tables
    Dimension,

    /// No relationships at all
    Unknown,
}

impl Default for TableKind {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Partition storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageMode {
    Import,
    DirectQuery,
    Dual,
}

impl StorageMode {
    /// Parse a TMDL `mode:` value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "import" => Some(Self::Import),
            "directquery" => Some(Self::DirectQuery),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::DirectQuery => write!(f, "directQuery"),
            Self::Dual => write!(f, "dual"),
        }
    }
}

/// Relationship filter propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossFilterDirection {
    Single,
    Both,
}

impl Default for CrossFilterDirection {
    fn default() -> Self {
        Self::Single
    }
}

/// Declared relationship multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    OneToMany,
    ManyToMany,
    OneToOne,
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::OneToMany
    }
}

/// A column of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: Option<String>,
    pub is_hidden: bool,
    pub display_folder: Option<String>,
    pub description: Option<String>,

    /// DAX expression for calculated columns
    pub expression: Option<String>,

    pub source: Option<Location>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A named scalar calculation attached to a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,

    /// Full expression text, verbatim
    pub expression: String,

    pub description: Option<String>,
    pub display_folder: Option<String>,
    pub format_string: Option<String>,
    pub is_hidden: bool,

    /// Number of `[Name]` occurrences across the project.
    /// Written only by the builder's reference pass.
    pub reference_count: usize,

    pub source: Option<Location>,
}

impl Measure {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            ..Self::default()
        }
    }

    /// Measures kept on purpose for other measures or tooling.
    ///
    /// Hidden measures, names starting with `_`, and measures in a display
    /// folder starting with `_` or `internal` count as internal.
    pub fn is_internal(&self) -> bool {
        if self.is_hidden || self.name.starts_with('_') {
            return true;
        }
        self.display_folder.as_deref().is_some_and(|folder| {
            let folder = folder.trim();
            folder.starts_with('_') || folder.to_ascii_lowercase().starts_with("internal")
        })
    }
}

/// A table partition (data source definition)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,

    /// Partition type written after `=`, e.g. `m` or `calculated`
    pub kind: Option<String>,

    pub mode: Option<StorageMode>,

    /// M or DAX source, verbatim
    pub source_expression: Option<String>,
}

/// A user hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    pub levels: Vec<String>,
}

/// A table of the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub is_hidden: bool,

    /// Matched a utility-table pattern (e.g. auto date tables)
    pub is_utility: bool,

    pub kind: TableKind,
    pub columns: Vec<Column>,
    pub measures: Vec<Measure>,
    pub partitions: Vec<Partition>,
    pub hierarchies: Vec<Hierarchy>,
    pub storage_mode: Option<StorageMode>,
    pub description: Option<String>,
    pub source: Option<Location>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }
}

/// A relationship between two tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship identifier (usually a GUID)
    pub name: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub is_active: bool,
    pub cross_filter: CrossFilterDirection,
    pub cardinality: Cardinality,

    /// False when either end names a table the model does not declare
    pub resolved: bool,

    pub source: Option<Location>,
}

impl Relationship {
    /// `From -> To` label used in messages
    pub fn label(&self) -> String {
        format!("{} -> {}", self.from_table, self.to_table)
    }

    /// Whether both ends carry a table name
    pub fn has_endpoints(&self) -> bool {
        !self.from_table.is_empty() && !self.to_table.is_empty()
    }
}

/// Row-level security filter for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePermission {
    pub table: String,
    pub filter_expression: String,
}

/// A security role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub model_permission: Option<String>,
    pub table_permissions: Vec<TablePermission>,
    pub source: Option<Location>,
}

/// One item of a calculation group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationItem {
    pub name: String,
    pub expression: String,
    pub format_string: Option<String>,
}

/// A calculation group and the table hosting it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationGroup {
    pub table: String,
    pub items: Vec<CalculationItem>,
}

/// A report visual definition (`visual.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    /// Name of the folder holding the definition
    pub name: String,

    /// Parsed definition; `Null` when the file is not valid JSON
    #[serde(skip)]
    pub definition: serde_json::Value,

    pub source: Option<Location>,
}

/// Root aggregate of one semantic model unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub culture: Option<String>,
    pub display_name: Option<String>,
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    pub roles: Vec<Role>,
    pub calculation_groups: Vec<CalculationGroup>,

    /// Model-level annotations (name -> value)
    pub annotations: BTreeMap<String, String>,

    /// Auto date/time setting when the model states it explicitly
    pub auto_date_time: Option<bool>,

    /// Where the auto date/time setting is stated
    pub auto_date_time_source: Option<Location>,

    /// Report visuals bound to this model
    pub visuals: Vec<Visual>,

    /// File holding the `model` block, if seen
    pub source: Option<Location>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.find_table(name).is_some()
    }

    /// Get table names in declaration order
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Every measure with its owning table
    pub fn measures(&self) -> impl Iterator<Item = (&Table, &Measure)> {
        self.tables
            .iter()
            .flat_map(|t| t.measures.iter().map(move |m| (t, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_mode_parsing() {
        assert_eq!(StorageMode::parse("import"), Some(StorageMode::Import));
        assert_eq!(StorageMode::parse("directQuery"), Some(StorageMode::DirectQuery));
        assert_eq!(StorageMode::parse(" Dual "), Some(StorageMode::Dual));
        assert_eq!(StorageMode::parse("push"), None);
    }

    #[test]
    fn internal_measures() {
        let mut m = Measure::new("Total", "1");
        assert!(!m.is_internal());

        m.display_folder = Some("Internal\\Helpers".to_string());
        assert!(m.is_internal());

        let helper = Measure::new("_Base", "1");
        assert!(helper.is_internal());

        let mut hidden = Measure::new("Hidden", "1");
        hidden.is_hidden = true;
        assert!(hidden.is_internal());
    }

    #[test]
    fn model_lookup() {
        let mut model = Model::new();
        let mut sales = Table::new("Sales");
        sales.measures.push(Measure::new("Total", "SUM(Sales[Amount])"));
        model.tables.push(sales);
        model.tables.push(Table::new("Date"));

        assert_eq!(model.table_names(), vec!["Sales", "Date"]);
        assert!(model.has_table("Date"));
        assert!(!model.has_table("date"));
        assert_eq!(model.measures().count(), 1);
    }
}
