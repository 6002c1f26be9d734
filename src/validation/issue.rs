use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub code: String,
    pub message: String,
    pub path: Option<String>,
    /// Bundle entry indices the issue is about.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_indices: Vec<usize>,
    pub reference: Option<String>,
}

impl ValidationIssue {
    fn new(severity: ValidationSeverity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            path: None,
            entry_indices: Vec::new(),
            reference: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, code, message)
    }

    pub fn information(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Information, code, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_entries(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.entry_indices = indices.into_iter().collect();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}
