//! Audit sinks
//!
//! The pipeline hands one [`AuditRecord`] per project to a sink. Sinks are
//! shared across worker threads and must serialize writes themselves.

use semguard_core::AuditRecord;
use std::sync::{Mutex, PoisonError};

/// Append-only destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records collected so far, in arrival order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the records, sorted by project
    pub fn into_records(self) -> Vec<AuditRecord> {
        let mut records = self
            .records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        records.sort_by(|a, b| a.project.cmp(&b.project));
        records
    }
}

impl AuditSink for MemorySink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

/// Drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _record: AuditRecord) {}
}
