//! Sled database backend for packages and applications

use super::{ApplicationRegistrar, PackageRegistrar, listed, package_record};
use crate::{
    error::{Error, Result},
    models::*,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sled-based registrar for both packages and applications
///
/// Package artifacts are copied next to the database under `packages/`.
pub struct SledRegistrar {
    /// Database instance
    db: sled::Db,
    /// Package descriptors
    packages: sled::Tree,
    /// Last deploy outcome per package
    deploy_status: sled::Tree,
    /// Application records
    applications: sled::Tree,
    /// Where package artifacts are kept
    artifact_dir: PathBuf,
    /// Keeps the scratch directory of an in-memory registrar alive
    _scratch: Option<tempfile::TempDir>,
}

impl SledRegistrar {
    /// Open (or create) a registrar rooted at `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let artifact_dir = data_dir.join("packages");
        async_fs::create_dir_all(&artifact_dir).await?;

        let db_path = data_dir.join("registry.db");
        info!("Opening sled database at {:?}", db_path);
        let db = sled::open(db_path)?;

        Self::from_db(db, artifact_dir, None)
    }

    /// Create a registrar backed by a temporary database (for testing)
    pub async fn in_memory() -> Result<Self> {
        info!("Creating in-memory sled database");

        let scratch = tempfile::TempDir::new()?;
        let db = sled::Config::new().temporary(true).open()?;

        Self::from_db(db, scratch.path().to_path_buf(), Some(scratch))
    }

    fn from_db(
        db: sled::Db,
        artifact_dir: PathBuf,
        scratch: Option<tempfile::TempDir>,
    ) -> Result<Self> {
        let packages = db.open_tree("packages")?;
        let deploy_status = db.open_tree("deploy_status")?;
        let applications = db.open_tree("applications")?;

        Ok(Self {
            db,
            packages,
            deploy_status,
            applications,
            artifact_dir,
            _scratch: scratch,
        })
    }

    fn artifact_path(&self, package: &str) -> PathBuf {
        self.artifact_dir.join(package)
    }

    async fn put<T: Serialize + Sync>(tree: &sled::Tree, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        tree.flush_async().await?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_applications(&self) -> Result<Vec<ApplicationRecord>> {
        let mut records = Vec::new();
        for entry in self.applications.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    async fn update_application(
        &self,
        application: &str,
        update: impl FnOnce(&mut ApplicationRecord),
    ) -> Result<()> {
        let mut record: ApplicationRecord = Self::read(&self.applications, application)?
            .ok_or_else(|| Error::ApplicationNotFound(application.to_string()))?;
        update(&mut record);
        Self::put(&self.applications, application, &record).await
    }
}

#[async_trait]
impl PackageRegistrar for SledRegistrar {
    async fn set_package(
        &self,
        package: &str,
        artifact: &Path,
        metadata: PackageMetadata,
    ) -> Result<()> {
        debug!("Storing package {}", package);

        async_fs::copy(artifact, self.artifact_path(package)).await?;
        Self::put(&self.packages, package, &package_record(metadata)).await
    }

    async fn get_package_metadata(&self, package: &str) -> Result<Option<PackageRecord>> {
        debug!("Reading package {}", package);
        Self::read(&self.packages, package)
    }

    async fn set_package_deploy_status(&self, package: &str, status: DeployStatus) -> Result<()> {
        debug!("Storing deploy status for {}: {:?}", package, status);
        Self::put(&self.deploy_status, package, &status).await
    }

    async fn get_package_deploy_status(&self, package: &str) -> Result<Option<DeployStatus>> {
        debug!("Reading deploy status for {}", package);
        Self::read(&self.deploy_status, package)
    }

    async fn delete_package(&self, package: &str) -> Result<()> {
        debug!("Deleting package {}", package);

        if let Err(err) = async_fs::remove_file(self.artifact_path(package)).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(err.into());
            }
            warn!("Artifact for {} was already gone", package);
        }

        self.packages.remove(package.as_bytes())?;
        self.deploy_status.remove(package.as_bytes())?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn package_exists(&self, package: &str) -> Result<bool> {
        Ok(self.packages.contains_key(package.as_bytes())?)
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        debug!("Listing all packages");

        let mut names = Vec::new();
        for key in self.packages.iter().keys() {
            names.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(names)
    }

    async fn get_package_data(&self, package: &str) -> Result<Option<PathBuf>> {
        if !self.package_exists(package).await? {
            return Ok(None);
        }
        Ok(Some(self.artifact_path(package)))
    }
}

#[async_trait]
impl ApplicationRegistrar for SledRegistrar {
    async fn create_application(
        &self,
        package: &str,
        application: &str,
        overrides: Overrides,
        defaults: PackageDefaults,
    ) -> Result<()> {
        debug!("Creating application record {}", application);
        let record = ApplicationRecord::new(application, package, overrides, defaults);
        Self::put(&self.applications, application, &record).await
    }

    async fn set_application_status(
        &self,
        application: &str,
        status: ApplicationState,
        information: Option<String>,
    ) -> Result<()> {
        debug!("Setting status {} = {}", application, status);
        self.update_application(application, |record| {
            record.status = status;
            record.information = information;
        })
        .await
    }

    async fn set_create_data(&self, application: &str, create_data: CreateData) -> Result<()> {
        debug!("Saving create data for {}", application);
        self.update_application(application, |record| {
            record.create_data = Some(create_data);
        })
        .await
    }

    async fn get_create_data(&self, application: &str) -> Result<CreateData> {
        let record: ApplicationRecord = Self::read(&self.applications, application)?
            .ok_or_else(|| Error::ApplicationNotFound(application.to_string()))?;
        Ok(record.create_data.unwrap_or_default())
    }

    async fn delete_application(&self, application: &str) -> Result<()> {
        debug!("Deleting application record {}", application);
        self.applications.remove(application.as_bytes())?;
        self.applications.flush_async().await?;
        Ok(())
    }

    async fn get_application(&self, application: &str) -> Result<Option<ApplicationRecord>> {
        Self::read(&self.applications, application)
    }

    async fn application_has_record(&self, application: &str) -> Result<bool> {
        Ok(self.applications.contains_key(application.as_bytes())?)
    }

    async fn list_applications(&self) -> Result<Vec<String>> {
        Ok(self
            .scan_applications()?
            .into_iter()
            .filter(listed)
            .map(|record| record.name)
            .collect())
    }

    async fn list_applications_for_package(&self, package: &str) -> Result<Vec<String>> {
        Ok(self
            .scan_applications()?
            .into_iter()
            .filter(|record| record.package_name == package && listed(record))
            .map(|record| record.name)
            .collect())
    }
}

impl Drop for SledRegistrar {
    fn drop(&mut self) {
        if let Err(err) = self.db.flush() {
            warn!("Failed to flush registrar database: {}", err);
        }
    }
}
