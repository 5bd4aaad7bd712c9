//! # Deployment orchestration
//!
//! Lifecycle orchestration for packages and applications on a
//! Hadoop-ecosystem platform.
//!
//! The [`DeploymentManager`] owns the package and application state
//! machines. Every lifecycle operation checks its precondition and records a
//! transitional state under one lock ([`ProgressTracker`]), then hands the
//! long-running work to an [`async_dispatch::AsyncDispatcher`] and returns a
//! [`async_dispatch::ScheduledTask`]. The work drives the
//! [`ApplicationCreator`], which in turn drives one [`ComponentCreator`] per
//! component type found in the package.
//!
//! ## Example
//!
//! ```no_run
//! use deployment_orchestration::{DeployerConfig, DeploymentContext, DeploymentManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeployerConfig::from_file("deployer.yaml")?;
//! let context = DeploymentContext::from_config(config).await?;
//! let manager = DeploymentManager::new(context);
//!
//! let task = manager.deploy_package("hello-1.0.0", "alice").await?;
//! task.get_result().await?;
//! println!("{:?}", manager.get_package_info("hello-1.0.0", Some("alice")).await?);
//! # Ok(())
//! # }
//! ```

mod application;
mod authorizer;
mod config;
mod context;
pub mod creators;
mod http;
mod manager;
mod progress;
mod repository;
mod users;
mod webhook;

pub use application::ApplicationCreator;
pub use authorizer::{Action, AllowAll, Authorizer, GrantRule, Identity, LocalAuthorizer, Resource};
pub use config::{
    AuthorizationConfig, DeployerConfig, JupyterConfig, OozieConfig, ProvisioningConfig,
    RepositoryConfig,
};
pub use context::{ContextBuilder, DeploymentContext};
pub use creators::{
    ClusterProvisioner, ComponentCreator, CreateRequest, CreatorHost, CreatorRegistry,
    Properties, ResourceProvisioner,
};
pub use manager::{
    ApplicationDetail, ApplicationInfo, DeploymentManager, LifecycleTask, PackageInfo,
};
pub use progress::{ProgressGuard, ProgressTracker};
pub use repository::{FsRepository, HttpRepository, PackageVersion, Repository, RepositoryPackage};
pub use users::{StaticUserDirectory, SystemUserDirectory, UserDirectory};
pub use webhook::{HttpWebhook, NullWebhook, StateChangeEvent, WebhookSink};

use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Structured detail of a failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidationReport {
    /// A single problem not tied to a component
    Message(String),
    /// Component type to component name to problems
    Components(BTreeMap<String, BTreeMap<String, Vec<String>>>),
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReport::Message(message) => f.write_str(message),
            ValidationReport::Components(components) => match serde_json::to_string(components) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{:?}", components),
            },
        }
    }
}

/// Caller-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Entity does not exist
    NotFound,
    /// Entity is in the wrong state for the operation
    ConflictingState,
    /// Input did not pass validation
    FailedValidation,
    /// Caller is not authorized
    Forbidden,
    /// Creating or changing an entity failed
    FailedCreation,
    /// A collaborator could not be reached
    FailedConnection,
}

impl ErrorKind {
    /// Name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ConflictingState => "ConflictingState",
            ErrorKind::FailedValidation => "FailedValidation",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::FailedCreation => "FailedCreation",
            ErrorKind::FailedConnection => "FailedConnection",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for deployment operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Entity is in the wrong state for the operation
    #[error("{0}")]
    ConflictingState(String),

    /// Input did not pass validation
    #[error("{0}")]
    FailedValidation(ValidationReport),

    /// Caller is not authorized
    #[error("{0}")]
    Forbidden(String),

    /// Creating or changing an entity failed
    #[error("{0}")]
    FailedCreation(String),

    /// A collaborator could not be reached
    #[error("{0}")]
    FailedConnection(String),

    /// Registrar errors
    #[error("Registry error: {0}")]
    Registry(#[from] deployment_registry::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Operator configuration problems
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Validation failure with a single message
    pub fn validation(message: impl Into<String>) -> Self {
        Error::FailedValidation(ValidationReport::Message(message.into()))
    }

    /// Precondition failure for an entity observed in `status`
    ///
    /// The absent state yields `NotFound`, anything else `ConflictingState`.
    pub fn unexpected_status(status: impl fmt::Display, absent: bool) -> Self {
        let payload = serde_json::json!({ "status": status.to_string() }).to_string();
        if absent {
            Error::NotFound(payload)
        } else {
            Error::ConflictingState(payload)
        }
    }

    /// Failure for work that panicked instead of returning an error
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        Error::FailedCreation(format!(
            "Unexpected failure: {}",
            async_dispatch::panic_message(panic.as_ref())
        ))
    }

    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ConflictingState(_) => ErrorKind::ConflictingState,
            Error::FailedValidation(_) | Error::Config(_) => ErrorKind::FailedValidation,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::FailedCreation(_) | Error::Io(_) | Error::Json(_) | Error::Yaml(_) => {
                ErrorKind::FailedCreation
            }
            Error::FailedConnection(_) => ErrorKind::FailedConnection,
            Error::Registry(err) => match err {
                deployment_registry::Error::PackageNotFound(_)
                | deployment_registry::Error::ApplicationNotFound(_) => ErrorKind::NotFound,
                deployment_registry::Error::InvalidPackage(_) => ErrorKind::FailedValidation,
                deployment_registry::Error::Io(_) | deployment_registry::Error::Json(_) => {
                    ErrorKind::FailedCreation
                }
                deployment_registry::Error::Database(_) => ErrorKind::FailedConnection,
            },
        }
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, Error>;
