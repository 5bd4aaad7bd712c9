//! Error types for the deployment registry

use thiserror::Error;

/// Deployment registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// No record for the package
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// No record for the application
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    /// Package archive does not have the expected layout
    #[error("{0}")]
    InvalidPackage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage engine error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
