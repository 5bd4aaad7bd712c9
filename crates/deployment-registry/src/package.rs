//! Package archive parsing
//!
//! A package is a (optionally gzip compressed) tar archive laid out as
//! `<package>/<component type>/<component>/<files...>`. Parsing records every
//! component file by relative path and loads each `properties.json`.

use crate::error::{Error, Result};
use crate::models::{ComponentMetadata, PROPERTIES_FILE, PackageMetadata};
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};
use tracing::{debug, error};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Split `name-version` at the last dash
pub fn split_package_name(package: &str) -> Option<(&str, &str)> {
    package.rsplit_once('-')
}

/// Parses package archives into [`PackageMetadata`]
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageParser;

impl PackageParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Parse the archive at `path`
    ///
    /// Layout problems are reported with a specific message; anything else
    /// (unreadable archive, bad JSON) becomes a generic parse failure.
    pub fn get_package_metadata(&self, path: &Path) -> Result<PackageMetadata> {
        debug!("Parsing package archive {:?}", path);

        match read_entries(path) {
            Ok(entries) => build_metadata(entries),
            Err(err) => {
                error!("Failed to read package archive {:?}: {:?}", path, err);
                Err(Error::InvalidPackage(
                    "Unexpected error parsing the package contents".to_string(),
                ))
            }
        }
    }
}

struct ArchiveEntry {
    parts: Vec<String>,
    contents: Option<Value>,
}

fn read_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut magic = [0u8; 2];
    let compressed = {
        let mut file = File::open(path)?;
        file.read(&mut magic)? == 2 && magic == GZIP_MAGIC
    };

    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let parts: Vec<String> = entry
            .path()?
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            continue;
        }

        let contents = if parts.len() == 4 && parts[3] == PROPERTIES_FILE {
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw)?;
            Some(serde_json::from_slice(&raw)?)
        } else {
            None
        };

        entries.push(ArchiveEntry { parts, contents });
    }

    entries.sort_by(|a, b| a.parts.cmp(&b.parts));
    Ok(entries)
}

fn build_metadata(entries: Vec<ArchiveEntry>) -> Result<PackageMetadata> {
    let top_level: BTreeSet<&str> = entries.iter().map(|e| e.parts[0].as_str()).collect();
    if top_level.len() > 1 {
        return Err(Error::InvalidPackage(
            "Expected to find a single directory inside the archive, but found more than one item at the top level"
                .to_string(),
        ));
    }
    let Some(package_name) = top_level.into_iter().next().map(str::to_string) else {
        return Err(Error::InvalidPackage(
            "Expected to find a single package directory inside the archive, but found none"
                .to_string(),
        ));
    };

    let mut component_types: BTreeMap<String, BTreeMap<String, ComponentMetadata>> =
        BTreeMap::new();

    for entry in entries {
        if entry.parts.len() < 4 {
            continue;
        }
        let component_type = &entry.parts[1];
        let component_name = &entry.parts[2];
        let file_name = entry.parts[3..].join("/");

        let component = component_types
            .entry(component_type.clone())
            .or_default()
            .entry(component_name.clone())
            .or_insert_with(|| ComponentMetadata {
                component_name: component_name.clone(),
                component_path: format!("{}/{}/{}", package_name, component_type, component_name),
                component_detail: BTreeMap::new(),
            });

        let contents = entry
            .contents
            .unwrap_or_else(|| Value::Object(Default::default()));
        component.component_detail.insert(file_name, contents);
    }

    if component_types.is_empty() {
        return Err(Error::InvalidPackage(
            "Expected to find at least one component within the package directory".to_string(),
        ));
    }

    for components in component_types.values_mut() {
        for component in components.values_mut() {
            component
                .component_detail
                .entry(PROPERTIES_FILE.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
    }

    Ok(PackageMetadata {
        package_name,
        component_types,
        user: None,
    })
}
