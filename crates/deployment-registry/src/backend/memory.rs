//! In-memory registrar
//!
//! Keeps records in process memory. Artifacts are copied into a scratch
//! directory that lives as long as the registrar.

use super::{ApplicationRegistrar, PackageRegistrar, listed, package_record};
use crate::{
    error::{Error, Result},
    models::*,
};
use async_trait::async_trait;
use futures::lock::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct Tables {
    packages: BTreeMap<String, (PackageRecord, PathBuf)>,
    deploy_status: BTreeMap<String, DeployStatus>,
    applications: BTreeMap<String, ApplicationRecord>,
    scratch: Option<tempfile::TempDir>,
}

impl Tables {
    fn artifact_dir(&mut self) -> Result<PathBuf> {
        if self.scratch.is_none() {
            self.scratch = Some(tempfile::TempDir::new()?);
        }
        Ok(self
            .scratch
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_default())
    }
}

/// Registrar that keeps records in memory
#[derive(Default)]
pub struct MemoryRegistrar {
    tables: Mutex<Tables>,
}

impl MemoryRegistrar {
    /// Create an empty registrar
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageRegistrar for MemoryRegistrar {
    async fn set_package(
        &self,
        package: &str,
        artifact: &Path,
        metadata: PackageMetadata,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let stored = tables.artifact_dir()?.join(package);
        async_fs::copy(artifact, &stored).await?;
        tables
            .packages
            .insert(package.to_string(), (package_record(metadata), stored));
        Ok(())
    }

    async fn get_package_metadata(&self, package: &str) -> Result<Option<PackageRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.packages.get(package).map(|(record, _)| record.clone()))
    }

    async fn set_package_deploy_status(&self, package: &str, status: DeployStatus) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.deploy_status.insert(package.to_string(), status);
        Ok(())
    }

    async fn get_package_deploy_status(&self, package: &str) -> Result<Option<DeployStatus>> {
        let tables = self.tables.lock().await;
        Ok(tables.deploy_status.get(package).cloned())
    }

    async fn delete_package(&self, package: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some((_, stored)) = tables.packages.remove(package) {
            let _ = async_fs::remove_file(stored).await;
        }
        tables.deploy_status.remove(package);
        Ok(())
    }

    async fn package_exists(&self, package: &str) -> Result<bool> {
        Ok(self.tables.lock().await.packages.contains_key(package))
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().await.packages.keys().cloned().collect())
    }

    async fn get_package_data(&self, package: &str) -> Result<Option<PathBuf>> {
        let tables = self.tables.lock().await;
        Ok(tables.packages.get(package).map(|(_, path)| path.clone()))
    }
}

#[async_trait]
impl ApplicationRegistrar for MemoryRegistrar {
    async fn create_application(
        &self,
        package: &str,
        application: &str,
        overrides: Overrides,
        defaults: PackageDefaults,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.applications.insert(
            application.to_string(),
            ApplicationRecord::new(application, package, overrides, defaults),
        );
        Ok(())
    }

    async fn set_application_status(
        &self,
        application: &str,
        status: ApplicationState,
        information: Option<String>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .applications
            .get_mut(application)
            .ok_or_else(|| Error::ApplicationNotFound(application.to_string()))?;
        record.status = status;
        record.information = information;
        Ok(())
    }

    async fn set_create_data(&self, application: &str, create_data: CreateData) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .applications
            .get_mut(application)
            .ok_or_else(|| Error::ApplicationNotFound(application.to_string()))?;
        record.create_data = Some(create_data);
        Ok(())
    }

    async fn get_create_data(&self, application: &str) -> Result<CreateData> {
        let tables = self.tables.lock().await;
        tables
            .applications
            .get(application)
            .map(|record| record.create_data.clone().unwrap_or_default())
            .ok_or_else(|| Error::ApplicationNotFound(application.to_string()))
    }

    async fn delete_application(&self, application: &str) -> Result<()> {
        self.tables.lock().await.applications.remove(application);
        Ok(())
    }

    async fn get_application(&self, application: &str) -> Result<Option<ApplicationRecord>> {
        Ok(self.tables.lock().await.applications.get(application).cloned())
    }

    async fn application_has_record(&self, application: &str) -> Result<bool> {
        Ok(self.tables.lock().await.applications.contains_key(application))
    }

    async fn list_applications(&self) -> Result<Vec<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .applications
            .values()
            .filter(|record| listed(record))
            .map(|record| record.name.clone())
            .collect())
    }

    async fn list_applications_for_package(&self, package: &str) -> Result<Vec<String>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .applications
            .values()
            .filter(|record| record.package_name == package && listed(record))
            .map(|record| record.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_notcreated_applications_are_not_listed() {
        let registrar = MemoryRegistrar::new();
        registrar
            .create_application("p-1.0.0", "pending", Overrides::new(), PackageDefaults::new())
            .await
            .unwrap();
        registrar
            .create_application("p-1.0.0", "running", Overrides::new(), PackageDefaults::new())
            .await
            .unwrap();
        registrar
            .set_application_status("running", ApplicationState::Started, None)
            .await
            .unwrap();

        assert_eq!(registrar.list_applications().await.unwrap(), vec!["running"]);
        assert!(registrar.application_has_record("pending").await.unwrap());
    }

    #[smol_potat::test]
    async fn test_missing_create_data_is_not_found() {
        let registrar = MemoryRegistrar::new();
        assert!(matches!(
            registrar.get_create_data("ghost").await,
            Err(Error::ApplicationNotFound(_))
        ));
    }

    #[smol_potat::test]
    async fn test_artifact_outlives_source() {
        let registrar = MemoryRegistrar::new();
        let source = tempfile::TempDir::new().unwrap();
        let artifact = source.path().join("hello-1.0.0.tar.gz");
        std::fs::write(&artifact, b"archive").unwrap();
        let metadata = PackageMetadata {
            package_name: "hello-1.0.0".into(),
            component_types: Default::default(),
            user: None,
        };

        registrar
            .set_package("hello-1.0.0", &artifact, metadata)
            .await
            .unwrap();
        drop(source);

        let stored = registrar.get_package_data("hello-1.0.0").await.unwrap().unwrap();
        assert_eq!(std::fs::read(&stored).unwrap(), b"archive");

        registrar.delete_package("hello-1.0.0").await.unwrap();
        assert!(!stored.exists());
        assert!(registrar.get_package_data("hello-1.0.0").await.unwrap().is_none());
    }
}
