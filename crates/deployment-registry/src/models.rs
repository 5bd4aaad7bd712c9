//! Data models for packages and applications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageState {
    /// Not present on the platform
    NotDeployed,
    /// Deploy in progress
    Deploying,
    /// Deployed and usable by applications
    Deployed,
    /// Undeploy in progress
    Undeploying,
}

impl PackageState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageState::NotDeployed => "NOTDEPLOYED",
            PackageState::Deploying => "DEPLOYING",
            PackageState::Deployed => "DEPLOYED",
            PackageState::Undeploying => "UNDEPLOYING",
        }
    }

    /// Whether the state only exists while an operation is in flight
    pub fn is_transitional(&self) -> bool {
        matches!(self, PackageState::Deploying | PackageState::Undeploying)
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationState {
    /// No components exist
    NotCreated,
    /// Create in progress
    Creating,
    /// Components exist but are not running
    Created,
    /// Start in progress
    Starting,
    /// Components are running
    Started,
    /// Stop in progress
    Stopping,
    /// Destroy in progress
    Destroying,
}

impl ApplicationState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationState::NotCreated => "NOTCREATED",
            ApplicationState::Creating => "CREATING",
            ApplicationState::Created => "CREATED",
            ApplicationState::Starting => "STARTING",
            ApplicationState::Started => "STARTED",
            ApplicationState::Stopping => "STOPPING",
            ApplicationState::Destroying => "DESTROYING",
        }
    }

    /// Whether the state only exists while an operation is in flight
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ApplicationState::Creating
                | ApplicationState::Starting
                | ApplicationState::Stopping
                | ApplicationState::Destroying
        )
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component inside a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Component name (directory name inside the type directory)
    pub component_name: String,

    /// Path of the component directory inside the archive
    pub component_path: String,

    /// Relative file path to contents; only `properties.json` carries data
    pub component_detail: BTreeMap<String, Value>,
}

impl ComponentMetadata {
    /// Declared property defaults of the component
    pub fn properties(&self) -> Map<String, Value> {
        match self.component_detail.get(PROPERTIES_FILE) {
            Some(Value::Object(properties)) => properties.clone(),
            _ => Map::new(),
        }
    }

    /// Whether the component ships a file at `relative_path`
    pub fn has_file(&self, relative_path: &str) -> bool {
        self.component_detail.contains_key(relative_path)
    }
}

/// Name of the per-component property defaults file
pub const PROPERTIES_FILE: &str = "properties.json";

/// Component type name to component name to component
pub type ComponentTypes = BTreeMap<String, BTreeMap<String, ComponentMetadata>>;

/// Component type name to component name to property defaults
pub type PackageDefaults = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

/// Parsed package descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// `name-version` of the package
    pub package_name: String,

    /// Components grouped by type
    pub component_types: ComponentTypes,

    /// User who deployed the package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl PackageMetadata {
    /// Property defaults of every component, grouped by type
    pub fn properties(&self) -> PackageDefaults {
        self.component_types
            .iter()
            .map(|(component_type, components)| {
                let defaults = components
                    .iter()
                    .map(|(name, component)| (name.clone(), component.properties()))
                    .collect();
                (component_type.clone(), defaults)
            })
            .collect()
    }
}

/// Persisted package row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name without the version
    pub name: String,

    /// Package version
    pub version: String,

    /// Parsed descriptor
    pub metadata: PackageMetadata,

    /// When the package was stored
    pub deployed_at: DateTime<Utc>,
}

/// Last reported outcome of a deploy or undeploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployStatus {
    /// Persisted state
    pub state: PackageState,

    /// Diagnostic or success message
    pub information: Option<String>,
}

/// Opaque data a component creator returned for one component
pub type ComponentCreateData = Map<String, Value>;

/// Component type name to creation artifacts, in creation order
pub type CreateData = BTreeMap<String, Vec<ComponentCreateData>>;

/// Application property overrides
///
/// Keys are component type names mapping to component name to property map,
/// plus `user` naming the OS user the application runs as.
pub type Overrides = Map<String, Value>;

/// Persisted application row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Application name
    pub name: String,

    /// Package the application was created from
    pub package_name: String,

    /// Overrides supplied at creation
    pub overrides: Overrides,

    /// Package defaults at creation
    pub defaults: PackageDefaults,

    /// Persisted state
    pub status: ApplicationState,

    /// Diagnostic of the last failed operation
    pub information: Option<String>,

    /// Creation artifacts, set once creation succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_data: Option<CreateData>,
}

impl ApplicationRecord {
    /// New record in the `NOTCREATED` state
    pub fn new(
        name: impl Into<String>,
        package_name: impl Into<String>,
        overrides: Overrides,
        defaults: PackageDefaults,
    ) -> Self {
        Self {
            name: name.into(),
            package_name: package_name.into(),
            overrides,
            defaults,
            status: ApplicationState::NotCreated,
            information: None,
            create_data: None,
        }
    }

    /// OS user named in the overrides
    pub fn owner(&self) -> Option<&str> {
        self.overrides.get("user").and_then(Value::as_str)
    }
}
