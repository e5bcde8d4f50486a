//! Error types for minification and settings persistence.

use std::path::PathBuf;

/// Errors returned by the minification pipeline and the settings store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An injected minifier rejected its input or failed internally.
    #[error(transparent)]
    Minify(#[from] MinifyError),

    /// The persisted config store could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The OS entropy source failed while drawing a placeholder nonce.
    #[error("entropy source unavailable: {0}")]
    Entropy(#[from] getrandom::Error),
}

/// A failure reported by one of the HTML/CSS/JS engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{engine} minifier failed: {message}")]
pub struct MinifyError {
    /// Short name of the engine that failed (`"html"`, `"css"`, `"js"`, ...)
    pub engine: &'static str,
    /// Human readable description
    pub message: String,
}

impl MinifyError {
    /// Failure of `engine` with a human readable `message`.
    pub fn new(engine: &'static str, message: impl Into<String>) -> Self {
        Self {
            engine,
            message: message.into(),
        }
    }
}

/// Errors from a [`ConfigStore`](crate::ConfigStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the config file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored line exists but does not hold a boolean.
    #[error("config key `{key}` has non-boolean value `{value}`")]
    InvalidValue { key: String, value: String },

    /// The rewritten file could not be moved over the original.
    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store-specific failure for custom backends.
    #[error("config store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_entropy_error_keeps_its_source() {
        let err = Error::from(getrandom::Error::UNSUPPORTED);

        assert!(matches!(err, Error::Entropy(_)));
        assert!(err.to_string().starts_with("entropy source unavailable"));
        assert!(err.source().is_some());
    }
}
