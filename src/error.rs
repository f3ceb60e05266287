//! Error types shared by the transcript client

use thiserror::Error;

/// Result type for chat client operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by the REST client, the stores and the live channel.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Transport-level HTTP failure (DNS, connect, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Session expired or caller is not a participant of the chatroom
    #[error("Unauthorized: session expired or access denied")]
    Unauthorized,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page index or page size outside the accepted range
    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    /// Publish attempted while the live channel is down
    #[error("Live channel is not connected")]
    Disconnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChatError {
    pub fn invalid_page(msg: impl Into<String>) -> Self {
        Self::InvalidPage(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Authorization failures end the screen instead of being retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::Status { status: 500, body: "boom".into() };
        assert_eq!(err.to_string(), "Request failed (500): boom");

        let err = ChatError::invalid_page("size must be positive");
        assert!(err.to_string().contains("size must be positive"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: ChatError = json_err.into();
        assert!(matches!(err, ChatError::Json(_)));
    }

    #[test]
    fn test_only_unauthorized_is_terminal() {
        assert!(ChatError::Unauthorized.is_terminal());
        assert!(!ChatError::Disconnected.is_terminal());
        assert!(!ChatError::transport("reset").is_terminal());
    }
}
