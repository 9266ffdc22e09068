//! SemGuard engine - governance checks over semantic models
//!
//! This crate implements the audit logic for SemGuard:
//! - Rule registry and the built-in governance rules
//! - Project allow-lists and inline skip directives
//! - Compliance scoring
//! - Project loading and the parallel audit pipeline

pub mod rules;
pub mod overrides;
pub mod score;
pub mod loader;
pub mod audit;
pub mod pipeline;

pub use rules::{Rule, RuleRegistry};
pub use overrides::{resolve, scan_skip_directives, AliasIndex, OverrideSet, SkipDirective};
pub use score::score;
pub use loader::{discover_projects, load_project, LoadError, ProjectInput, SourceFile};
pub use audit::{AuditSink, MemorySink, NullSink};
pub use pipeline::{Auditor, ProjectResult};
