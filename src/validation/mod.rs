pub mod issue;

pub use issue::{ValidationIssue, ValidationSeverity};
