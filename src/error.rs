//! Error types for prun_sync

use thiserror::Error;

/// Unified error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Failed to parse a JSON response
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// HTTP error status code
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Spreadsheet could not be opened (missing, or key lacks access)
    #[error("Failed to open spreadsheet: {0}")]
    SpreadsheetOpen(String),
    /// Named worksheet is absent from the spreadsheet
    #[error("Worksheet not found: {0}")]
    WorksheetNotFound(String),
    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
