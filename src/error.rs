use thiserror::Error;

/// Errors surfaced across the library boundary.
///
/// Everything else (missing uids mid-traversal, per-column SQL parse
/// failures) is recovered locally with a log entry and never reaches
/// the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Artifact files missing or unreadable, project directory not found.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The requested model cannot serve the operation (e.g. no compiled
    /// code for CTE decomposition).
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Config {
            message: message.into(),
            source: Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
