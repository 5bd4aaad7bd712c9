//! Oozie workflow and coordinator components
//!
//! A component is uploaded to the cluster filesystem, submitted to Oozie and
//! immediately suspended, so every application starts out paused. Start
//! resumes the job, stop suspends it and destroy kills it.

use super::base::APPLICATION_PROPERTIES;
use super::descriptors::{HBASE_DESCRIPTOR, HDFS_DESCRIPTOR, ResourceProvisioner};
use super::traits::create_field;
use super::{ComponentCreator, CreateRequest, Properties};
use crate::config::OozieConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use deployment_registry::{ComponentCreateData, ComponentMetadata, PROPERTIES_FILE};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Creator for the `oozie` component type
pub struct OozieCreator {
    config: OozieConfig,
    provisioner: Arc<dyn ResourceProvisioner>,
    client: reqwest::Client,
}

/// Render properties as a Hadoop XML configuration document
pub fn properties_to_xml(properties: &Properties) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" ?><configuration>"#);
    for (name, value) in properties {
        xml.push_str(&format!(
            "<property><name>{}</name><value>{}</value></property>",
            escape_xml(name),
            escape_xml(value)
        ));
    }
    xml.push_str("</configuration>");
    xml
}

/// Render properties as `key=value` lines
pub fn properties_to_text(properties: &Properties) -> String {
    properties
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl OozieCreator {
    /// Creator talking to the Oozie server in `config`
    pub fn new(
        config: OozieConfig,
        provisioner: Arc<dyn ResourceProvisioner>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            provisioner,
            client,
        })
    }

    fn base_url(&self) -> &str {
        self.config.uri.trim_end_matches('/')
    }

    async fn submit(&self, properties: &Properties) -> Result<String> {
        debug!("Submitting Oozie job (submit only)");
        let url = format!("{}/v1/jobs", self.base_url());
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/xml")
            .body(properties_to_xml(properties));

        let body: Value = crate::http::run(async move {
            let response = request.send().await.map_err(|e| {
                Error::FailedConnection(format!("Unable to connect to Oozie: {}", e))
            })?;

            if !response.status().is_success() {
                let message = response
                    .headers()
                    .get("oozie-error-message")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Oozie returned {}", response.status()));
                error!("{}", message);
                return Err(Error::FailedCreation(message));
            }

            response.json().await.map_err(|e| {
                Error::FailedCreation(format!("Unexpected response from Oozie: {}", e))
            })
        })
        .await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::FailedCreation("Oozie did not return a job id".to_string()))
    }

    async fn job_action(&self, job_id: &str, user: &str, action: &str) -> Result<()> {
        debug!("Oozie {} {}", action, job_id);
        let url = format!("{}/v1/job/{}", self.base_url(), job_id);
        let request = self
            .client
            .put(&url)
            .query(&[("action", action), ("user.name", user)]);

        let status = crate::http::run(async move {
            let response = request.send().await.map_err(|e| {
                Error::FailedConnection(format!("Unable to connect to Oozie: {}", e))
            })?;
            Ok(response.status())
        })
        .await?;
        if !status.is_success() {
            return Err(Error::FailedCreation(format!(
                "Oozie {} of job {} returned {}",
                action, job_id, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentCreator for OozieCreator {
    fn component_type(&self) -> &str {
        "oozie"
    }

    fn validate_component(&self, component: &ComponentMetadata) -> Vec<String> {
        if component.has_file("workflow.xml") {
            Vec::new()
        } else {
            vec!["missing file workflow.xml".to_string()]
        }
    }

    fn validate_properties(
        &self,
        overrides: &Map<String, Value>,
        defaults: &BTreeMap<String, Map<String, Value>>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut problems = BTreeMap::new();
        for (component, component_defaults) in defaults {
            let requested = overrides
                .get(component)
                .and_then(|o| o.get("spark_version"))
                .or_else(|| component_defaults.get("spark_version"));
            let Some(requested) = requested else {
                continue;
            };
            if super::base::property_value(requested) != self.config.spark_version {
                let information = format!(
                    "Mismatch between cluster's oozie spark version (version = {}) and requested spark version",
                    self.config.spark_version
                );
                problems.insert(
                    component.clone(),
                    vec![json!({ "information": information }).to_string()],
                );
            }
        }
        problems
    }

    async fn create_component(
        &self,
        request: CreateRequest<'_>,
        properties: &mut Properties,
    ) -> Result<ComponentCreateData> {
        debug!(
            "create_component: {} {} {}",
            request.application, request.user, request.component.component_name
        );
        let hdfs_root = properties
            .get("component_hdfs_root")
            .cloned()
            .unwrap_or_else(|| {
                format!(
                    "/user/{}/{}",
                    request.application, request.component.component_name
                )
            });
        let remote_path = hdfs_root.trim_start_matches('/').to_string();

        // Coordinators must not fire before the job is suspended
        let start = Utc::now() + ChronoDuration::minutes(2);
        let end = start + ChronoDuration::weeks(1);
        properties.insert(
            "deployment_start".into(),
            start.format("%Y-%m-%dT%H:%MZ").to_string(),
        );
        properties.insert(
            "deployment_end".into(),
            end.format("%Y-%m-%dT%H:%MZ").to_string(),
        );

        properties.insert("user.name".into(), request.user.to_string());
        properties.insert("oozie.use.system.libpath".into(), "true".into());
        properties.insert("oozie.libpath".into(), self.config.libpath.clone());
        if self.config.spark_version == "2" {
            properties.insert("oozie.action.sharelib.for.spark".into(), "spark2".into());
        }
        let definition = if request.component.has_file("coordinator.xml") {
            "oozie.coord.application.path"
        } else {
            "oozie.wf.application.path"
        };
        properties.insert(
            definition.into(),
            format!(
                "{}/{}",
                self.config.name_node.trim_end_matches('/'),
                remote_path
            ),
        );

        self.provisioner
            .upload_dir(
                request.staged_path,
                &remote_path,
                &[
                    HDFS_DESCRIPTOR,
                    HBASE_DESCRIPTOR,
                    PROPERTIES_FILE,
                    APPLICATION_PROPERTIES,
                ],
            )
            .await?;
        self.provisioner
            .write_file(
                &format!("{}/{}", remote_path, APPLICATION_PROPERTIES),
                &properties_to_text(properties),
            )
            .await?;

        let job_id = self.submit(properties).await?;
        self.job_action(&job_id, request.user, "suspend").await?;

        let mut data = Map::new();
        data.insert("job_handle".into(), Value::String(job_id));
        data.insert("component_hdfs_root".into(), Value::String(hdfs_root));
        data.insert(
            "application_hdfs_root".into(),
            Value::String(format!("/user/{}", request.application)),
        );
        data.insert(
            "application_user".into(),
            Value::String(request.user.to_string()),
        );
        Ok(data)
    }

    async fn destroy_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("destroy_component: {} {:?}", application, create_data);
        let job = create_field(create_data, "job_handle")?;
        let user = create_field(create_data, "application_user")?;
        self.job_action(job, user, "kill").await?;

        let hdfs_root = create_field(create_data, "component_hdfs_root")?;
        self.provisioner.remove(hdfs_root, true).await
    }

    async fn start_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("start_component: {} {:?}", application, create_data);
        let job = create_field(create_data, "job_handle")?;
        let user = create_field(create_data, "application_user")?;
        self.job_action(job, user, "resume").await?;
        self.job_action(job, user, "start").await
    }

    async fn stop_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<()> {
        debug!("stop_component: {} {:?}", application, create_data);
        let job = create_field(create_data, "job_handle")?;
        let user = create_field(create_data, "application_user")?;
        self.job_action(job, user, "suspend").await
    }

    async fn runtime_details(
        &self,
        _application: &str,
        create_data: &ComponentCreateData,
    ) -> Result<Value> {
        Ok(json!({
            "job_handle": create_data.get("job_handle").cloned().unwrap_or(Value::Null),
            "job_name": create_data.get("component_job_name").cloned().unwrap_or(Value::Null),
            "oozie_uri": self.config.uri,
        }))
    }
}
