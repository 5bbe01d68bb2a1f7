use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("execution profile {namespace}/{name} not found")]
    ProfileNotFound { namespace: String, name: String },

    #[error("reusable context {namespace}/{name} not found")]
    ContextNotFound { namespace: String, name: String },

    #[error("config object {namespace}/{name} not found")]
    ConfigMapNotFound { namespace: String, name: String },

    #[error("key {key:?} not found in config object {namespace}/{name}")]
    KeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("context source type {0:?} is not supported")]
    UnsupportedSource(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Configuration errors need an operator fix; retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        match self {
            CoreError::Store(e) => !e.is_transient(),
            _ => true,
        }
    }

    /// Short machine-readable reason for status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::ProfileNotFound { .. } => "ProfileNotFound",
            CoreError::ContextNotFound { .. } => "ContextNotFound",
            CoreError::ConfigMapNotFound { .. } => "ConfigMapNotFound",
            CoreError::KeyNotFound { .. } => "KeyNotFound",
            CoreError::UnsupportedSource(_) => "UnsupportedSource",
            CoreError::InvalidSpec(_) => "InvalidSpec",
            CoreError::Store(_) => "StoreError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_store_errors_are_retryable() {
        assert!(CoreError::UnsupportedSource("s3".into()).is_permanent());
        assert!(!CoreError::Store(StoreError::Conflict("x".into())).is_permanent());
        assert!(!CoreError::Store(StoreError::Unavailable("down".into())).is_permanent());
        assert!(
            CoreError::Store(StoreError::Serialization("bad".into())).is_permanent()
        );
    }
}
