//! SemGuard Core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod model;
pub mod report;
pub mod config;
pub mod audit;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use model::{
    CalculationGroup, CalculationItem, Cardinality, Column, CrossFilterDirection, Hierarchy,
    Measure, Model, Partition, Relationship, Role, StorageMode, Table, TableKind, TablePermission,
    Visual,
};
pub use report::{Report, ReportVersion, ReportSummary, ProjectReport, ReportEntry};
pub use config::{Config, ConfigError, ModelConfig, ProjectConfig, AllowEntry, RuleSetting};
pub use audit::AuditRecord;
