use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Invalid profile: {message}")]
    InvalidProfile { message: String },

    #[error("Invalid version: {message}")]
    InvalidVersion { message: String },

    #[error("Invalid canonical URL: {message}")]
    InvalidCanonical { message: String },

    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Package error: {message}")]
    Package { message: String },

    #[error("Source '{source_name}' timed out after {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl ResolverError {
    pub fn invalid_profile(message: impl Into<String>) -> Self {
        Self::InvalidProfile {
            message: message.into(),
        }
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn package(message: impl Into<String>) -> Self {
        Self::Package {
            message: message.into(),
        }
    }

    /// Whether this error only means a single source could not answer.
    ///
    /// Such errors are logged and the resolution pipeline moves on to the
    /// next source. Input-shape errors are not misses.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            ResolverError::Registry { .. }
                | ResolverError::Storage { .. }
                | ResolverError::Package { .. }
                | ResolverError::Timeout { .. }
                | ResolverError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_failures_are_misses() {
        assert!(ResolverError::registry("connection refused").is_miss());
        assert!(ResolverError::storage("db down").is_miss());
        assert!(
            ResolverError::Timeout {
                source_name: "registry".to_string(),
                timeout_ms: 100
            }
            .is_miss()
        );
    }

    #[test]
    fn input_errors_are_not_misses() {
        assert!(!ResolverError::invalid_profile("not a StructureDefinition").is_miss());
        let err = ResolverError::InvalidVersion {
            message: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid version: abc");
        assert!(!err.is_miss());
    }
}
