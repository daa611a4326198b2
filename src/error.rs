use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::scheduler::ApiError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Unexpected response from shop: {0}")]
    InvalidResponse(String),

    #[error("Invalid theme cache {}: line {line}: {content:?}", path.display())]
    CacheCorrupt {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Unsafe asset key: {0}")]
    UnsafeKey(String),

    #[error("No theme id given and none is associated with the current git branch")]
    MissingThemeId,

    #[error("{0}")]
    TransferFailed(TransferFailures),
}

impl SyncError {
    /// HTTP status of the underlying API error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Api(err) => err.status(),
            _ => None,
        }
    }
}

/// Every per-asset failure collected during one sync pass.
#[derive(Debug, Default)]
pub struct TransferFailures {
    failures: Vec<AssetFailure>,
}

#[derive(Debug)]
pub struct AssetFailure {
    pub key: String,
    pub error: SyncError,
}

impl TransferFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, error: SyncError) {
        self.failures.push(AssetFailure {
            key: key.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetFailure> {
        self.failures.iter()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }

    /// Sort by key so reports are stable regardless of completion order.
    pub fn sorted(mut self) -> Self {
        self.failures.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }
}

impl fmt::Display for TransferFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} asset transfer(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.key, failure.error)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_failures_display_lists_every_key() {
        let mut failures = TransferFailures::new();
        failures.push(
            "snippets/b.liquid",
            SyncError::InvalidResponse("missing asset".into()),
        );
        failures.push(
            "assets/a.css",
            SyncError::Api(ApiError::Status {
                status: 422,
                message: "invalid".into(),
            }),
        );

        let failures = failures.sorted();
        assert_eq!(failures.keys(), vec!["assets/a.css", "snippets/b.liquid"]);

        let text = failures.to_string();
        assert!(text.starts_with("2 asset transfer(s) failed"));
        assert!(text.contains("assets/a.css: API error: HTTP 422: invalid"));
    }

    #[test]
    fn test_status_passthrough() {
        let err = SyncError::Api(ApiError::Status {
            status: 404,
            message: "Not Found".into(),
        });
        assert_eq!(err.status(), Some(404));
        assert_eq!(SyncError::MissingThemeId.status(), None);
    }
}
