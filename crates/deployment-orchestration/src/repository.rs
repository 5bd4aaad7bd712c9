//! Package repositories
//!
//! Deploy fetches package archives named `<package>.tar.gz` from a
//! [`Repository`]. [`FsRepository`] serves them from a local directory,
//! [`HttpRepository`] from the package repository REST service.

use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static PACKAGE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)-(\d+\.\d+\.\d+)\.tar\.gz$").expect("package file pattern is valid")
});

/// One available version of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// `major.minor.patch`
    pub version: String,
    /// Archive file name in the repository
    pub file: String,
}

/// A package and its newest versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackage {
    /// Package name without version
    pub name: String,
    /// Newest versions first
    pub latest_versions: Vec<PackageVersion>,
}

/// Source of package archives
#[async_trait]
pub trait Repository: Send + Sync {
    /// Download `file` into `dest_dir` and return the local path
    async fn get_package(&self, file: &str, user: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Available packages, keeping the `recency` newest versions of each
    async fn get_package_list(&self, user: &str, recency: usize) -> Result<Vec<RepositoryPackage>>;
}

/// Repository backed by a local directory of archives
#[derive(Debug, Clone)]
pub struct FsRepository {
    root: PathBuf,
}

impl FsRepository {
    /// Serve archives from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// Group archive file names into packages with their newest versions
pub fn group_package_files<'a>(
    files: impl IntoIterator<Item = &'a str>,
    recency: usize,
) -> Vec<RepositoryPackage> {
    let mut grouped: BTreeMap<String, Vec<PackageVersion>> = BTreeMap::new();
    for file in files {
        let Some(captures) = PACKAGE_FILE.captures(file) else {
            continue;
        };
        grouped
            .entry(captures[1].to_string())
            .or_default()
            .push(PackageVersion {
                version: captures[2].to_string(),
                file: file.to_string(),
            });
    }

    grouped
        .into_iter()
        .map(|(name, mut versions)| {
            versions.sort_by_key(|v| Reverse(version_key(&v.version)));
            versions.truncate(recency);
            RepositoryPackage {
                name,
                latest_versions: versions,
            }
        })
        .collect()
}

#[async_trait]
impl Repository for FsRepository {
    async fn get_package(&self, file: &str, user: &str, dest_dir: &Path) -> Result<PathBuf> {
        let mut components = Path::new(file).components();
        let plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let source = self.root.join(file);
        debug!("Fetching {:?} for {}", source, user);
        if !plain_name || !async_fs::metadata(&source).await.is_ok_and(|m| m.is_file()) {
            return Err(Error::NotFound(format!(
                "Package {} not found in repository",
                file
            )));
        }

        async_fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(file);
        async_fs::copy(&source, &dest).await?;
        Ok(dest)
    }

    async fn get_package_list(&self, user: &str, recency: usize) -> Result<Vec<RepositoryPackage>> {
        debug!("Listing {:?} for {}", self.root, user);
        let root = self.root.clone();
        let files = smol::unblock(move || -> std::io::Result<Vec<String>> {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(root)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| {
            Error::FailedConnection(format!("Unable to read package repository: {}", e))
        })?;

        Ok(group_package_files(files.iter().map(String::as_str), recency))
    }
}

/// Client of the package repository REST service
#[derive(Debug, Clone)]
pub struct HttpRepository {
    base_url: String,
    client: reqwest::Client,
}

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.+?)<.*/title>").expect("title pattern is valid"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/][^>]*>").expect("tag pattern is valid"));

/// Cause of a repository error page, the `<title>` when there is one
fn error_cause(body: &str) -> String {
    match TITLE.find(body) {
        Some(title) => TAG.replace_all(title.as_str(), "").into_owned(),
        None => body.to_string(),
    }
}

impl HttpRepository {
    /// Client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Body of a successful GET of `path`
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();
        let path = path.to_string();
        debug!("GET: {}", url);

        crate::http::run(async move {
            let response = client.get(&url).send().await.map_err(|e| {
                debug!("Request error: {}", e);
                Error::FailedConnection(
                    "Unable to connect to the Package Repository Manager".to_string(),
                )
            })?;
            debug!("response code: {}", response.status());

            let status = response.status();
            if status.is_success() {
                let body = response.bytes().await.map_err(|e| {
                    Error::FailedConnection(format!(
                        "Unable to read the Package Repository Manager response: {}",
                        e
                    ))
                })?;
                return Ok(body.to_vec());
            }

            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "Package Repository Manager - {} (request path = {})",
                error_cause(&body),
                path
            );
            warn!("{}", message);
            if status == reqwest::StatusCode::NOT_FOUND {
                Err(Error::NotFound(message))
            } else {
                Err(Error::FailedCreation(message))
            }
        })
        .await
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn get_package(&self, file: &str, user: &str, dest_dir: &Path) -> Result<PathBuf> {
        let content = self
            .get(&format!("/packages/{}?user.name={}", file, user))
            .await?;

        async_fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(file);
        async_fs::write(&dest, &content).await?;
        Ok(dest)
    }

    async fn get_package_list(&self, user: &str, recency: usize) -> Result<Vec<RepositoryPackage>> {
        let body = self
            .get(&format!("/packages?user.name={}&recency={}", user, recency))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
