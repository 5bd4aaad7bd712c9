//! Registrar contracts and backends

pub mod memory;
pub mod sled;

use crate::{error::Result, models::*};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Durable store for deployed packages
#[async_trait]
pub trait PackageRegistrar: Send + Sync {
    /// Store a package's descriptor and artifact
    ///
    /// `metadata.user` names the deploying user.
    async fn set_package(&self, package: &str, artifact: &Path, metadata: PackageMetadata)
    -> Result<()>;

    /// Stored descriptor of a package
    async fn get_package_metadata(&self, package: &str) -> Result<Option<PackageRecord>>;

    /// Record the outcome of a deploy or undeploy
    async fn set_package_deploy_status(&self, package: &str, status: DeployStatus) -> Result<()>;

    /// Last recorded deploy outcome
    async fn get_package_deploy_status(&self, package: &str) -> Result<Option<DeployStatus>>;

    /// Remove the package, its artifact and its deploy status
    async fn delete_package(&self, package: &str) -> Result<()>;

    /// Whether a descriptor is stored for the package
    async fn package_exists(&self, package: &str) -> Result<bool>;

    /// Names of all stored packages
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// Local path of the stored artifact
    async fn get_package_data(&self, package: &str) -> Result<Option<PathBuf>>;
}

/// Durable store for applications
#[async_trait]
pub trait ApplicationRegistrar: Send + Sync {
    /// Store a new application record in the `NOTCREATED` state
    async fn create_application(
        &self,
        package: &str,
        application: &str,
        overrides: Overrides,
        defaults: PackageDefaults,
    ) -> Result<()>;

    /// Update the persisted status and diagnostic
    async fn set_application_status(
        &self,
        application: &str,
        status: ApplicationState,
        information: Option<String>,
    ) -> Result<()>;

    /// Store the creation artifacts
    async fn set_create_data(&self, application: &str, create_data: CreateData) -> Result<()>;

    /// Creation artifacts stored for the application
    async fn get_create_data(&self, application: &str) -> Result<CreateData>;

    /// Remove the application record
    async fn delete_application(&self, application: &str) -> Result<()>;

    /// Full application record
    async fn get_application(&self, application: &str) -> Result<Option<ApplicationRecord>>;

    /// Whether any record exists for the application
    async fn application_has_record(&self, application: &str) -> Result<bool>;

    /// Names of applications that are not `NOTCREATED`
    async fn list_applications(&self) -> Result<Vec<String>>;

    /// Names of applications of `package` that are not `NOTCREATED`
    async fn list_applications_for_package(&self, package: &str) -> Result<Vec<String>>;
}

pub(crate) fn listed(record: &ApplicationRecord) -> bool {
    record.status != ApplicationState::NotCreated
}

pub(crate) fn package_record(metadata: PackageMetadata) -> PackageRecord {
    let (name, version) = crate::split_package_name(&metadata.package_name)
        .map(|(name, version)| (name.to_string(), version.to_string()))
        .unwrap_or_else(|| (metadata.package_name.clone(), String::new()));

    PackageRecord {
        name,
        version,
        metadata,
        deployed_at: chrono::Utc::now(),
    }
}
