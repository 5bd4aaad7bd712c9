//! Behaviour shared by every component type
//!
//! [`CreatorHost`] drives a [`ComponentCreator`] over all components of one
//! type: it merges properties, provisions descriptors, fills in
//! `application.properties`, calls the creator's hooks and records the
//! bookkeeping fields the later lifecycle calls rely on.

use super::descriptors::{
    HBASE_DESCRIPTOR, HDFS_DESCRIPTOR, HdfsEntry, MetricEntry, OPENTSDB_DESCRIPTOR,
    ResourceProvisioner, TableEntry,
};
use super::template::fill_file;
use super::{ComponentCreator, CreateRequest, Properties};
use crate::Result;
use deployment_registry::{ComponentCreateData, ComponentMetadata};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File appended with the merged properties
pub const APPLICATION_PROPERTIES: &str = "application.properties";

/// Property that turns off `application.properties` auto-fill
pub const NO_AUTO_PROPS: &str = "component_no_auto_props";

/// Render a JSON property value the way it appears in templates
pub fn property_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shared component creation machinery
pub struct CreatorHost {
    environment: BTreeMap<String, String>,
    provisioner: Arc<dyn ResourceProvisioner>,
}

impl CreatorHost {
    /// Host merging `environment` into every component's properties
    pub fn new(
        environment: BTreeMap<String, String>,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Self {
        Self {
            environment,
            provisioner,
        }
    }

    /// Provisioner used for descriptors
    pub fn provisioner(&self) -> &Arc<dyn ResourceProvisioner> {
        &self.provisioner
    }

    /// Merge environment, component defaults and overrides
    ///
    /// Later sources win. Fixed keys derived from the application and
    /// component names are set last.
    pub fn instantiate_properties(
        &self,
        application: &str,
        user: &str,
        component: &ComponentMetadata,
        overrides: &Map<String, Value>,
    ) -> Properties {
        let mut properties = Properties::new();
        for (key, value) in &self.environment {
            properties.insert(format!("environment_{}", key), value.clone());
        }
        for (key, value) in &component.properties() {
            properties.insert(format!("component_{}", key), property_value(value));
        }
        for (key, value) in overrides {
            properties.insert(format!("component_{}", key), property_value(value));
        }

        let name = &component.component_name;
        properties.insert("component_application".into(), application.to_string());
        properties.insert("component_name".into(), name.clone());
        properties.insert(
            "component_job_name".into(),
            format!("{}-{}-job", application, name),
        );
        properties.insert(
            "component_hdfs_root".into(),
            format!("/user/{}/{}", application, name),
        );
        properties.insert("application_user".into(), user.to_string());
        properties
    }

    /// Append the merged properties to the staged `application.properties`
    ///
    /// Each key has its first `_` turned into `.`. Skipped when
    /// `component_no_auto_props` is set.
    pub async fn auto_fill_app_properties(
        &self,
        staged_component: &Path,
        properties: &Properties,
    ) -> Result<()> {
        let path = staged_component.join(APPLICATION_PROPERTIES);
        let mut contents = match async_fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        if !properties.contains_key(NO_AUTO_PROPS) {
            contents.push('\n');
            for (key, value) in properties {
                contents.push_str(&format!("{}={}\n", key.replacen('_', ".", 1), value));
            }
        }
        async_fs::write(&path, contents).await?;
        Ok(())
    }

    async fn read_descriptor<T: DeserializeOwned>(
        staged_component: &Path,
        file: &str,
        properties: &Properties,
    ) -> Result<T> {
        let path = staged_component.join(file);
        fill_file(&path, properties).await?;
        let contents = async_fs::read(&path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Provision the descriptors the component ships
    ///
    /// Returns what destroy needs, keyed by descriptor file. `hdfs.json`
    /// entries are added to `properties` as `hdfspath_<name>`.
    pub async fn create_optional_descriptors(
        &self,
        staged_component: &Path,
        component: &ComponentMetadata,
        properties: &mut Properties,
    ) -> Result<Map<String, Value>> {
        let mut result = Map::new();

        if component.has_file(HBASE_DESCRIPTOR) {
            debug!("creating {}", HBASE_DESCRIPTOR);
            let tables: Vec<TableEntry> =
                Self::read_descriptor(staged_component, HBASE_DESCRIPTOR, properties).await?;
            for entry in &tables {
                if let (Some(table), Some(family)) = (&entry.table, &entry.col_family) {
                    self.provisioner.create_table(table, family).await?;
                    if !entry.hive_schema.is_empty() {
                        warn!(
                            "Skipping {} warehouse statements for table {}",
                            entry.hive_schema.len(),
                            table
                        );
                    }
                }
            }
        }

        if component.has_file(HDFS_DESCRIPTOR) {
            debug!("creating {}", HDFS_DESCRIPTOR);
            let entries: Vec<HdfsEntry> =
                Self::read_descriptor(staged_component, HDFS_DESCRIPTOR, properties).await?;
            for entry in &entries {
                properties.insert(format!("hdfspath_{}", entry.name), entry.path.clone());
                self.provisioner.make_dir(&entry.path).await?;
            }
            result.insert(HDFS_DESCRIPTOR.to_string(), serde_json::to_value(&entries)?);
        }

        if component.has_file(OPENTSDB_DESCRIPTOR) {
            debug!("creating {}", OPENTSDB_DESCRIPTOR);
            let metrics: Vec<MetricEntry> =
                Self::read_descriptor(staged_component, OPENTSDB_DESCRIPTOR, properties).await?;
            for name in metrics.iter().filter_map(|m| m.name.as_deref()) {
                self.provisioner.create_metric(name).await?;
            }
        }

        Ok(result)
    }

    /// Remove what `create_optional_descriptors` provisioned
    pub async fn destroy_optional_descriptors(&self, descriptors: Option<&Value>) -> Result<()> {
        let Some(entries) = descriptors.and_then(|d| d.get(HDFS_DESCRIPTOR)) else {
            return Ok(());
        };
        debug!("destroying {}", HDFS_DESCRIPTOR);
        let entries: Vec<HdfsEntry> = serde_json::from_value(entries.clone())?;
        for path in entries.iter().filter_map(HdfsEntry::removal_path) {
            self.provisioner.remove(&path, true).await?;
        }
        Ok(())
    }

    /// Create every component of one type
    pub async fn create_components(
        &self,
        creator: &dyn ComponentCreator,
        stage_path: &Path,
        application: &str,
        user: &str,
        components: &BTreeMap<String, ComponentMetadata>,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<Vec<ComponentCreateData>> {
        let mut results = Vec::with_capacity(components.len());
        let empty = Map::new();

        for (name, component) in components {
            info!(
                "Creating {} component {} of {}",
                creator.component_type(),
                name,
                application
            );
            let staged_component = stage_path.join(&component.component_path);
            let component_overrides = overrides
                .and_then(|o| o.get(name))
                .and_then(Value::as_object)
                .unwrap_or(&empty);

            let mut properties =
                self.instantiate_properties(application, user, component, component_overrides);
            let descriptors = self
                .create_optional_descriptors(&staged_component, component, &mut properties)
                .await?;
            self.auto_fill_app_properties(&staged_component, &properties)
                .await?;

            let request = CreateRequest {
                staged_path: &staged_component,
                application,
                user,
                component,
            };
            let job_name = properties
                .get("component_job_name")
                .cloned()
                .unwrap_or_default();
            let mut result = creator.create_component(request, &mut properties).await?;
            result.insert("component_name".into(), Value::String(name.clone()));
            result.insert("component_job_name".into(), Value::String(job_name));
            result.insert("descriptors".into(), Value::Object(descriptors));
            results.push(result);
        }
        Ok(results)
    }

    /// Destroy every component of one type
    pub async fn destroy_components(
        &self,
        creator: &dyn ComponentCreator,
        application: &str,
        create_data: &[ComponentCreateData],
    ) -> Result<()> {
        for component in create_data {
            self.destroy_optional_descriptors(component.get("descriptors"))
                .await?;
            creator.destroy_component(application, component).await?;
        }
        Ok(())
    }

    /// Start every component of one type
    pub async fn start_components(
        &self,
        creator: &dyn ComponentCreator,
        application: &str,
        create_data: &[ComponentCreateData],
    ) -> Result<()> {
        for component in create_data {
            creator.start_component(application, component).await?;
        }
        Ok(())
    }

    /// Stop every component of one type
    pub async fn stop_components(
        &self,
        creator: &dyn ComponentCreator,
        application: &str,
        create_data: &[ComponentCreateData],
    ) -> Result<()> {
        for component in create_data {
            creator.stop_component(application, component).await?;
        }
        Ok(())
    }

    /// Component name to problems, for components with problems
    pub fn validate_components(
        &self,
        creator: &dyn ComponentCreator,
        components: &BTreeMap<String, ComponentMetadata>,
    ) -> BTreeMap<String, Vec<String>> {
        components
            .iter()
            .filter_map(|(name, component)| {
                let errors = creator.validate_component(component);
                (!errors.is_empty()).then(|| (name.clone(), errors))
            })
            .collect()
    }

    /// Runtime details of every component of one type
    pub async fn runtime_details(
        &self,
        creator: &dyn ComponentCreator,
        application: &str,
        create_data: &[ComponentCreateData],
    ) -> Result<Vec<Value>> {
        let mut details = Vec::with_capacity(create_data.len());
        for component in create_data {
            details.push(serde_json::json!({
                "type": creator.component_type(),
                "component": component.get("component_name").cloned().unwrap_or(Value::Null),
                "details": creator.runtime_details(application, component).await?,
            }));
        }
        Ok(details)
    }
}
