//! Declarative descriptors and the cluster resources they provision
//!
//! A component may ship `hdfs.json`, `opentsdb.json` or `hbase.json`. Each
//! lists resources to create alongside the component; the work is done by a
//! [`ResourceProvisioner`].

use crate::config::ProvisioningConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Filesystem descriptor file
pub const HDFS_DESCRIPTOR: &str = "hdfs.json";
/// Metrics descriptor file
pub const OPENTSDB_DESCRIPTOR: &str = "opentsdb.json";
/// Tables descriptor file
pub const HBASE_DESCRIPTOR: &str = "hbase.json";

/// One directory in `hdfs.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdfsEntry {
    /// Exposed to templates as `hdfspath_<name>`
    pub name: String,
    /// Directory to create
    pub path: String,
    /// Trailing path segments to strip before removing on destroy; zero keeps
    /// the directory
    #[serde(default)]
    pub delete_on_undeploy: usize,
}

impl HdfsEntry {
    /// Directory removed on destroy, if any
    pub fn removal_path(&self) -> Option<String> {
        if self.delete_on_undeploy == 0 {
            return None;
        }
        let mut path = self.path.as_str();
        for _ in 0..self.delete_on_undeploy {
            path = path.rfind('/').map_or("", |index| &path[..index]);
        }
        Some(path.to_string())
    }
}

/// One metric in `opentsdb.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Metric name
    #[serde(default)]
    pub name: Option<String>,
}

/// One table in `hbase.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Table name
    #[serde(default)]
    pub table: Option<String>,
    /// Column family created with the table
    #[serde(default)]
    pub col_family: Option<String>,
    /// Warehouse statements to run against the table
    #[serde(default)]
    pub hive_schema: Vec<String>,
}

/// Side effects on cluster services
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Create a directory and its parents
    async fn make_dir(&self, path: &str) -> Result<()>;

    /// Remove a file or directory
    async fn remove(&self, path: &str, recursive: bool) -> Result<()>;

    /// Copy a local directory tree, skipping top-level entries named in
    /// `exclude`
    async fn upload_dir(&self, local: &Path, remote: &str, exclude: &[&str]) -> Result<()>;

    /// Write a file
    async fn write_file(&self, remote: &str, contents: &str) -> Result<()>;

    /// Register a metric name
    async fn create_metric(&self, name: &str) -> Result<()>;

    /// Create a table with one column family
    async fn create_table(&self, table: &str, column_family: &str) -> Result<()>;
}

/// Provisioner for a cluster reachable through a local filesystem mount and
/// the OpenTSDB and HBase REST APIs
#[derive(Debug, Clone)]
pub struct ClusterProvisioner {
    filesystem_root: PathBuf,
    opentsdb_url: Option<String>,
    hbase_rest_url: Option<String>,
    client: reqwest::Client,
}

impl ClusterProvisioner {
    /// Provisioner from configuration
    pub fn new(config: &ProvisioningConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            filesystem_root: config.filesystem_root.clone(),
            opentsdb_url: config.opentsdb_url.clone(),
            hbase_rest_url: config.hbase_rest_url.clone(),
            client,
        })
    }

    fn local(&self, remote: &str) -> PathBuf {
        self.filesystem_root.join(remote.trim_start_matches('/'))
    }

    fn endpoint<'a>(url: &'a Option<String>, service: &str) -> Result<&'a str> {
        url.as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or_else(|| Error::FailedCreation(format!("No {} endpoint is configured", service)))
    }

    async fn send(&self, request: reqwest::RequestBuilder, service: &str) -> Result<()> {
        let service = service.to_string();
        crate::http::run(async move {
            let response = request.send().await.map_err(|e| {
                Error::FailedConnection(format!("Unable to connect to {}: {}", service, e))
            })?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(Error::FailedCreation(format!(
                "{} returned {}: {}",
                service, status, body
            )))
        })
        .await
    }
}

fn copy_tree(source: &Path, dest: &Path, exclude: &[String]) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|skip| *skip == *name.to_string_lossy()) {
            continue;
        }
        let target = dest.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target, &[])?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl ResourceProvisioner for ClusterProvisioner {
    async fn make_dir(&self, path: &str) -> Result<()> {
        debug!("make_dir: {}", path);
        async_fs::create_dir_all(self.local(path)).await?;
        Ok(())
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        debug!("remove: {} (recursive = {})", path, recursive);
        let local = self.local(path);
        let Ok(metadata) = async_fs::metadata(&local).await else {
            return Ok(());
        };
        if metadata.is_dir() {
            if recursive {
                async_fs::remove_dir_all(&local).await?;
            } else {
                async_fs::remove_dir(&local).await?;
            }
        } else {
            async_fs::remove_file(&local).await?;
        }
        Ok(())
    }

    async fn upload_dir(&self, local: &Path, remote: &str, exclude: &[&str]) -> Result<()> {
        debug!("upload_dir: {:?} -> {}", local, remote);
        let source = local.to_path_buf();
        let dest = self.local(remote);
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        smol::unblock(move || copy_tree(&source, &dest, &exclude)).await?;
        Ok(())
    }

    async fn write_file(&self, remote: &str, contents: &str) -> Result<()> {
        debug!("write_file: {}", remote);
        let local = self.local(remote);
        if let Some(parent) = local.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::write(local, contents).await?;
        Ok(())
    }

    async fn create_metric(&self, name: &str) -> Result<()> {
        let base = Self::endpoint(&self.opentsdb_url, "OpenTSDB")?;
        debug!("create_metric: {}", name);
        let request = self
            .client
            .post(format!("{}/api/uid/assign", base))
            .query(&[("metric", name)]);
        self.send(request, "OpenTSDB").await
    }

    async fn create_table(&self, table: &str, column_family: &str) -> Result<()> {
        let base = Self::endpoint(&self.hbase_rest_url, "HBase REST")?;
        debug!("create_table: {} ({})", table, column_family);
        let schema = serde_json::json!({
            "name": table,
            "ColumnSchema": [{ "name": column_family }],
        });
        let request = self
            .client
            .put(format!("{}/{}/schema", base, table))
            .header("Accept", "application/json")
            .json(&schema);
        self.send(request, "HBase REST").await
    }
}
