//! Jupyter notebook components
//!
//! Notebooks are copied into the application user's notebook directory.
//! There is nothing to run, so start and stop do nothing.

use super::template::fill_file;
use super::traits::create_field;
use super::{ComponentCreator, CreateRequest, Properties};
use crate::config::JupyterConfig;
use crate::Result;
use async_trait::async_trait;
use deployment_registry::{ComponentCreateData, ComponentMetadata, PROPERTIES_FILE};
use serde_json::{Map, Value};
use tracing::debug;

/// Creator for the `jupyter` component type
#[derive(Debug, Clone)]
pub struct JupyterCreator {
    config: JupyterConfig,
}

impl JupyterCreator {
    /// Creator installing under `config.notebooks_root`
    pub fn new(config: JupyterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ComponentCreator for JupyterCreator {
    fn component_type(&self) -> &str {
        "jupyter"
    }

    fn validate_component(&self, component: &ComponentMetadata) -> Vec<String> {
        let has_notebook = component
            .component_detail
            .keys()
            .any(|file| file.ends_with(".ipynb"));
        if has_notebook {
            Vec::new()
        } else {
            vec!["missing ipynb file".to_string()]
        }
    }

    async fn create_component(
        &self,
        request: CreateRequest<'_>,
        properties: &mut Properties,
    ) -> Result<ComponentCreateData> {
        let install_path = self
            .config
            .notebooks_root
            .join(request.user)
            .join(request.application);
        debug!(
            "create_component: {} {} -> {:?}",
            request.application, request.component.component_name, install_path
        );
        async_fs::create_dir_all(&install_path).await?;

        for file in request.component.component_detail.keys() {
            if file == PROPERTIES_FILE {
                continue;
            }
            let source = request.staged_path.join(file);
            let target = install_path.join(file);
            if async_fs::metadata(&source).await.is_ok_and(|m| m.is_file()) {
                fill_file(&source, properties).await?;
                if let Some(parent) = target.parent() {
                    async_fs::create_dir_all(parent).await?;
                }
                debug!("Copying {} to {:?}", file, install_path);
                async_fs::copy(&source, &target).await?;
            } else {
                async_fs::create_dir_all(&target).await?;
            }
        }

        let notebook_properties: Map<String, Value> = properties
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("component_")
                    .map(|name| (name.to_string(), Value::String(value.clone())))
            })
            .collect();
        async_fs::write(
            install_path.join(PROPERTIES_FILE),
            serde_json::to_vec(&notebook_properties)?,
        )
        .await?;

        let mut data = Map::new();
        data.insert(
            "notebook_path".into(),
            Value::String(install_path.to_string_lossy().into_owned()),
        );
        Ok(data)
    }

    async fn destroy_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("destroy_component: {} {:?}", application, create_data);
        let path = create_field(create_data, "notebook_path")?;
        match async_fs::remove_dir_all(path).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    async fn start_component(
        &self,
        application: &str,
        _create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("start_component (nothing to do for jupyter): {}", application);
        Ok(())
    }

    async fn stop_component(
        &self,
        application: &str,
        _create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("stop_component (nothing to do for jupyter): {}", application);
        Ok(())
    }
}
