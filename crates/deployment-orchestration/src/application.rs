//! Multi-component application orchestration
//!
//! The [`ApplicationCreator`] validates packages and application properties
//! against every component type they contain, and drives creation and the
//! later lifecycle calls across all types of an application.

use crate::creators::{ComponentCreator, CreatorHost, CreatorRegistry};
use crate::users::UserDirectory;
use crate::{Error, Result, ValidationReport};
use deployment_registry::{CreateData, Overrides, PackageDefaults, PackageMetadata};
use flate2::read::GzDecoder;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

static APPLICATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("application name pattern is valid"));

/// Creates, controls and destroys applications across component types
pub struct ApplicationCreator {
    host: CreatorHost,
    creators: Arc<CreatorRegistry>,
    users: Arc<dyn UserDirectory>,
    stage_root: PathBuf,
}

impl ApplicationCreator {
    /// Creator staging packages under `stage_root`
    pub fn new(
        host: CreatorHost,
        creators: Arc<CreatorRegistry>,
        users: Arc<dyn UserDirectory>,
        stage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host,
            creators,
            users,
            stage_root: stage_root.into(),
        }
    }

    fn creator(&self, component_type: &str) -> Result<Arc<dyn ComponentCreator>> {
        self.creators.get(component_type).ok_or_else(|| {
            Error::FailedCreation(format!(
                "No component creator is registered for component type {}",
                component_type
            ))
        })
    }

    /// Check overrides against package defaults for every component type
    pub fn assert_application_properties(
        &self,
        overrides: &Overrides,
        defaults: &PackageDefaults,
    ) -> Result<()> {
        let empty = Map::new();
        let mut report = BTreeMap::new();
        for (component_type, type_defaults) in defaults {
            let creator = self.creator(component_type)?;
            let type_overrides = overrides
                .get(component_type)
                .and_then(Value::as_object)
                .unwrap_or(&empty);
            let problems = creator.validate_properties(type_overrides, type_defaults);
            if !problems.is_empty() {
                report.insert(component_type.clone(), problems);
            }
        }

        if report.is_empty() {
            Ok(())
        } else {
            Err(Error::FailedValidation(ValidationReport::Components(report)))
        }
    }

    /// Check a package's name and every component it contains
    pub fn validate_package(&self, package: &str, metadata: &PackageMetadata) -> Result<()> {
        debug!("validate_package: {}", package);
        validate_name(package, metadata)?;

        let mut report = BTreeMap::new();
        for (component_type, components) in &metadata.component_types {
            let problems = match self.creators.get(component_type) {
                Some(creator) => self.host.validate_components(creator.as_ref(), components),
                None => components
                    .keys()
                    .map(|name| {
                        (
                            name.clone(),
                            vec![format!("unknown component type {}", component_type)],
                        )
                    })
                    .collect(),
            };
            if !problems.is_empty() {
                report.insert(component_type.clone(), problems);
            }
        }

        if report.is_empty() {
            Ok(())
        } else {
            Err(Error::FailedValidation(ValidationReport::Components(report)))
        }
    }

    /// Create every component of the package for `application`
    ///
    /// Component types created before a failing type are left in place.
    pub async fn create_application(
        &self,
        package_path: &Path,
        metadata: &PackageMetadata,
        application: &str,
        overrides: &Overrides,
    ) -> Result<CreateData> {
        debug!("create_application: {}", application);
        if !APPLICATION_NAME.is_match(application) {
            return Err(Error::FailedCreation(format!(
                "Application name {} may only contain a-z A-Z 0-9 - _",
                application
            )));
        }

        let user = overrides
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !self.users.user_exists(user) {
            return Err(Error::FailedCreation(format!(
                "User {} does not exist. Verify that this user account exists on the machine running the deployment manager.",
                user
            )));
        }

        let stage_path = self.stage_package(package_path).await?;
        let created = self
            .create_components(&stage_path, metadata, application, user, overrides)
            .await;

        if let Err(err) = async_fs::remove_dir_all(&stage_path).await {
            warn!("Failed to clean up staged package {:?}: {}", stage_path, err);
        }
        created
    }

    async fn create_components(
        &self,
        stage_path: &Path,
        metadata: &PackageMetadata,
        application: &str,
        user: &str,
        overrides: &Overrides,
    ) -> Result<CreateData> {
        let mut create_data = CreateData::new();
        for (component_type, components) in &metadata.component_types {
            let creator = self.creator(component_type)?;
            let results = self
                .host
                .create_components(
                    creator.as_ref(),
                    stage_path,
                    application,
                    user,
                    components,
                    overrides.get(component_type).and_then(Value::as_object),
                )
                .await?;
            create_data.insert(component_type.clone(), results);
        }
        info!("Created {} component types for {}", create_data.len(), application);
        Ok(create_data)
    }

    /// Destroy every component recorded in `create_data`
    pub async fn destroy_application(
        &self,
        application: &str,
        create_data: &CreateData,
    ) -> Result<()> {
        debug!("destroy_application: {}", application);
        let mut application_root = None;
        for (component_type, components) in create_data {
            let creator = self.creator(component_type)?;
            self.host
                .destroy_components(creator.as_ref(), application, components)
                .await?;
            if let Some(root) = components
                .first()
                .and_then(|c| c.get("application_hdfs_root"))
                .and_then(Value::as_str)
            {
                application_root = Some(root.to_string());
            }
        }

        if let Some(root) = application_root {
            if let Err(err) = self.host.provisioner().remove(&root, false).await {
                warn!("Failed to remove application root {}: {}", root, err);
            }
        }
        Ok(())
    }

    /// Start every component recorded in `create_data`
    pub async fn start_application(&self, application: &str, create_data: &CreateData) -> Result<()> {
        debug!("start_application: {}", application);
        for (component_type, components) in create_data {
            let creator = self.creator(component_type)?;
            self.host
                .start_components(creator.as_ref(), application, components)
                .await?;
        }
        Ok(())
    }

    /// Stop every component recorded in `create_data`
    pub async fn stop_application(&self, application: &str, create_data: &CreateData) -> Result<()> {
        debug!("stop_application: {}", application);
        for (component_type, components) in create_data {
            let creator = self.creator(component_type)?;
            self.host
                .stop_components(creator.as_ref(), application, components)
                .await?;
        }
        Ok(())
    }

    /// Runtime details of every component
    pub async fn runtime_details(
        &self,
        application: &str,
        create_data: &CreateData,
    ) -> Result<Vec<Value>> {
        let mut details = Vec::new();
        for (component_type, components) in create_data {
            let creator = self.creator(component_type)?;
            details.extend(
                self.host
                    .runtime_details(creator.as_ref(), application, components)
                    .await?,
            );
        }
        Ok(details)
    }

    async fn stage_package(&self, package_path: &Path) -> Result<PathBuf> {
        let stage_path = self.stage_root.join(Uuid::new_v4().to_string());
        debug!("Staging {:?} to {:?}", package_path, stage_path);
        async_fs::create_dir_all(&stage_path).await?;

        let archive = package_path.to_path_buf();
        let dest = stage_path.clone();
        smol::unblock(move || -> std::io::Result<()> {
            tar::Archive::new(open_archive(&archive)?).unpack(&dest)
        })
        .await?;
        Ok(stage_path)
    }
}

fn open_archive(path: &Path) -> std::io::Result<Box<dyn Read + Send>> {
    let mut magic = [0u8; 2];
    let compressed = File::open(path)?.read(&mut magic)? == 2 && magic == [0x1f, 0x8b];
    let file = BufReader::new(File::open(path)?);
    Ok(if compressed {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

fn validate_name(package: &str, metadata: &PackageMetadata) -> Result<()> {
    let Some((_, version)) = package.rsplit_once('-') else {
        return Err(Error::validation(format!(
            "package name must be of the form name-version e.g. name-version.1.2.3 but found {}",
            package
        )));
    };
    if version.split('.').count() < 3 {
        return Err(Error::validation(format!(
            "version must be a three part major.minor.patch e.g. 1.2.3 but found {}",
            version
        )));
    }
    if package != metadata.package_name {
        return Err(Error::validation(format!(
            "package name must match name of enclosed folder but found {} and {}",
            package, metadata.package_name
        )));
    }
    Ok(())
}
