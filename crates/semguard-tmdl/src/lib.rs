//! SemGuard TMDL
//!
//! Block tokenizer and model builder for TMDL semantic-model files.

pub mod tokenizer;
pub mod references;
pub mod builder;

pub use tokenizer::{tokenize, Block, BodyLine, Keyword, LexIssue, LexIssueKind, Tokenizer};
pub use references::{count_references, split_column_ref};
pub use builder::{BuildOutput, BuilderOptions, ModelBuilder};
