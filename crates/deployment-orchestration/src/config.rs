//! Deployer configuration
//!
//! Loaded once at startup from a YAML file. Every field has a default so a
//! minimal file only needs to name what differs from a single-node setup.

use crate::authorizer::GrantRule;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration of the deployment manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Workers in the background dispatcher pool
    #[serde(default = "default_thread_limit")]
    pub deployer_thread_limit: usize,

    /// Where package archives are downloaded and extracted
    #[serde(default = "default_stage_root")]
    pub stage_root: PathBuf,

    /// Where registrar state and stored artifacts live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Fallback log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// URL notified on package state changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_callback: Option<String>,

    /// URL notified on application state changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_callback: Option<String>,

    /// Timeout applied to every outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Component types that must have a registered creator
    #[serde(default = "default_component_types")]
    pub component_types: Vec<String>,

    /// Platform environment descriptor
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Package repository
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Authorization rules
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    /// Oozie component creator settings
    #[serde(default)]
    pub oozie: OozieConfig,

    /// Jupyter component creator settings
    #[serde(default)]
    pub jupyter: JupyterConfig,

    /// Declarative descriptor provisioning
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

/// Where packages are fetched from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepositoryConfig {
    /// Directory of `<name>-<version>.tar.gz` files
    Fs {
        /// Directory holding the archives
        path: PathBuf,
    },
    /// Package repository REST service
    Http {
        /// Base URL of the service
        url: String,
    },
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig::Fs {
            path: PathBuf::from("packages"),
        }
    }
}

/// Authorization settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Skip authorization entirely
    #[serde(default)]
    pub allow_all: bool,

    /// Grant rules evaluated in order
    #[serde(default)]
    pub rules: Vec<GrantRule>,
}

/// Oozie creator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OozieConfig {
    /// Base URL of the Oozie server
    #[serde(default = "default_oozie_uri")]
    pub uri: String,

    /// Spark major version installed for Oozie
    #[serde(default = "default_spark_version")]
    pub spark_version: String,

    /// Shared platform library path
    #[serde(default = "default_oozie_libpath")]
    pub libpath: String,

    /// Name node URI used to build application paths
    #[serde(default = "default_name_node")]
    pub name_node: String,
}

impl Default for OozieConfig {
    fn default() -> Self {
        Self {
            uri: default_oozie_uri(),
            spark_version: default_spark_version(),
            libpath: default_oozie_libpath(),
            name_node: default_name_node(),
        }
    }
}

/// Jupyter creator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupyterConfig {
    /// Root under which per-user notebook directories are created
    #[serde(default = "default_notebooks_root")]
    pub notebooks_root: PathBuf,
}

impl Default for JupyterConfig {
    fn default() -> Self {
        Self {
            notebooks_root: default_notebooks_root(),
        }
    }
}

/// Descriptor provisioning endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Local mount of the distributed filesystem
    #[serde(default = "default_filesystem_root")]
    pub filesystem_root: PathBuf,

    /// OpenTSDB HTTP API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opentsdb_url: Option<String>,

    /// HBase REST gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hbase_rest_url: Option<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            filesystem_root: default_filesystem_root(),
            opentsdb_url: None,
            hbase_rest_url: None,
        }
    }
}

fn default_thread_limit() -> usize {
    4
}

fn default_stage_root() -> PathBuf {
    std::env::temp_dir().join("deployment-manager").join("stage")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("deployment-manager")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_secs() -> u64 {
    120
}

fn default_component_types() -> Vec<String> {
    vec!["oozie".to_string(), "jupyter".to_string()]
}

fn default_oozie_uri() -> String {
    "http://localhost:11000/oozie".to_string()
}

fn default_spark_version() -> String {
    "2".to_string()
}

fn default_oozie_libpath() -> String {
    "/pnda/deployment/platform".to_string()
}

fn default_name_node() -> String {
    "hdfs://localhost:8020".to_string()
}

fn default_notebooks_root() -> PathBuf {
    PathBuf::from("/data/jupyter")
}

fn default_filesystem_root() -> PathBuf {
    std::env::temp_dir().join("deployment-manager").join("dfs")
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            deployer_thread_limit: default_thread_limit(),
            stage_root: default_stage_root(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            package_callback: None,
            application_callback: None,
            http_timeout_secs: default_http_timeout_secs(),
            component_types: default_component_types(),
            environment: BTreeMap::new(),
            repository: RepositoryConfig::default(),
            authorization: AuthorizationConfig::default(),
            oozie: OozieConfig::default(),
            jupyter: JupyterConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl DeployerConfig {
    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: DeployerConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.deployer_thread_limit == 0 {
            return Err(Error::Config(
                "deployer_thread_limit must be greater than zero".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Config(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(duplicate) = self
            .component_types
            .iter()
            .enumerate()
            .find(|(i, name)| self.component_types[..*i].contains(name))
            .map(|(_, name)| name)
        {
            return Err(Error::Config(format!(
                "component type '{}' is listed more than once",
                duplicate
            )));
        }
        Ok(())
    }

    /// Timeout for outbound HTTP calls
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
