use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("browser session error: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {cause}")]
    Navigation { url: String, cause: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("could not persist {path:?}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("file I/O error: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    pub fn navigation(url: impl Into<String>, cause: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Persist {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Worth another navigation attempt against the same session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Timeout(_))
    }

    /// Fatal to a whole aggregate run.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ScraperError::navigation("http://x", "net::ERR").is_retryable());
        assert!(ScraperError::Timeout("slow".into()).is_retryable());
        assert!(!ScraperError::Session("gone".into()).is_retryable());
        assert!(!ScraperError::persist("/tmp/a.xlsx", "locked").is_retryable());
    }

    #[test]
    fn test_navigation_message_carries_url() {
        let err = ScraperError::navigation("https://example.test/avd/3", "net::ERR_TIMED_OUT");
        let msg = err.to_string();
        assert!(msg.contains("https://example.test/avd/3"));
        assert!(msg.contains("net::ERR_TIMED_OUT"));
    }
}
