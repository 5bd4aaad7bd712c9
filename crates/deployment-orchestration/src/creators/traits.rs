//! Component creator contract

use crate::Result;
use async_trait::async_trait;
use deployment_registry::{ComponentCreateData, ComponentMetadata};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;

/// Merged component properties, in merge order
pub type Properties = IndexMap<String, String>;

/// Everything a creator needs to create one component
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    /// Staged copy of the component directory, already templated
    pub staged_path: &'a Path,
    /// Application name
    pub application: &'a str,
    /// OS user the application runs as
    pub user: &'a str,
    /// Component descriptor from the package
    pub component: &'a ComponentMetadata,
}

/// Handler for one component type
///
/// Implementations supply the engine-specific calls. Property merging,
/// templating and descriptor provisioning are done by
/// [`CreatorHost`](super::CreatorHost) before `create_component` runs.
#[async_trait]
pub trait ComponentCreator: Send + Sync {
    /// Component type handled, e.g. `oozie`
    fn component_type(&self) -> &str;

    /// Problems with one component of a package being deployed
    fn validate_component(&self, component: &ComponentMetadata) -> Vec<String>;

    /// Problems with application properties, keyed by component name
    ///
    /// `defaults` are the package's property defaults for this type and
    /// `overrides` the application's overrides for this type.
    fn validate_properties(
        &self,
        _overrides: &Map<String, Value>,
        _defaults: &BTreeMap<String, Map<String, Value>>,
    ) -> BTreeMap<String, Vec<String>> {
        BTreeMap::new()
    }

    /// Create one component
    ///
    /// The returned data is persisted and handed back unchanged to the
    /// other lifecycle hooks, so it must hold everything they need.
    async fn create_component(
        &self,
        request: CreateRequest<'_>,
        properties: &mut Properties,
    ) -> Result<ComponentCreateData>;

    /// Remove everything `create_component` made
    async fn destroy_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()>;

    /// Start a created component
    async fn start_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()>;

    /// Stop a started component
    async fn stop_component(&self, application: &str, create_data: &ComponentCreateData)
    -> Result<()>;

    /// Engine-specific runtime view of a component
    async fn runtime_details(
        &self,
        _application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<Value> {
        Ok(json!({
            "job_name": create_data.get("component_job_name").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// String field of create data
pub(crate) fn create_field<'a>(
    create_data: &'a ComponentCreateData,
    field: &str,
) -> Result<&'a str> {
    create_data
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::Error::FailedCreation(format!("create data is missing '{}'", field)))
}
