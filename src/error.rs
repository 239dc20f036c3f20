//! Error types for the StackRox MCP server
//!
//! Application-level failures use [`McpError`] wrapped in `anyhow`. The
//! classified Central RPC error lives in [`crate::central::error`] and the
//! credential errors in [`crate::central::auth`], since callers inspect
//! those directly.

use thiserror::Error;

/// Main error type for StackRox MCP operations
#[derive(Error, Debug)]
pub enum McpError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential provider could not be set up
    #[error("Auth error: {0}")]
    Auth(String),

    /// Pagination cursor could not be built or decoded
    #[error("Cursor error: {0}")]
    Cursor(String),

    /// Tool arguments failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Dial or wire-level transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for StackRox MCP operations
///
/// Uses `anyhow::Error` so callers can attach context while propagating.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = McpError::Config("central.url is required".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: central.url is required"
        );
    }

    #[test]
    fn test_cursor_error_display() {
        let error = McpError::Cursor("offset must be non-negative".to_string());
        assert_eq!(error.to_string(), "Cursor error: offset must be non-negative");
    }

    #[test]
    fn test_invalid_params_display() {
        let error = McpError::InvalidParams("missing required field cveName".to_string());
        assert!(error.to_string().contains("cveName"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: McpError = io_error.into();
        assert!(matches!(error, McpError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let error: McpError = json_error.into();
        assert!(error.to_string().starts_with("Serialization error"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<McpError>();
    }
}
