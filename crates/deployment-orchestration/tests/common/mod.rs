//! Shared fixtures for deployment manager tests

#![allow(dead_code)]

use async_trait::async_trait;
use deployment_orchestration::{
    Authorizer, ComponentCreator, CreateRequest, CreatorRegistry, DeployerConfig,
    DeploymentContext, DeploymentManager, Properties, ProvisioningConfig, RepositoryConfig,
    StateChangeEvent, StaticUserDirectory, WebhookSink,
};
use deployment_registry::{
    ComponentCreateData, ComponentMetadata, DeployStatus, MemoryRegistrar, PackageMetadata,
    PackageRecord, PackageRegistrar,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Callback URL configured for package events
pub const PACKAGE_CALLBACK: &str = "http://console/packages";

/// Callback URL configured for application events
pub const APPLICATION_CALLBACK: &str = "http://console/applications";

/// One component of a generated package: type, name and files
pub struct ComponentSpec<'a> {
    pub component_type: &'a str,
    pub name: &'a str,
    pub files: &'a [(&'a str, &'a str)],
}

/// Write `<dir>/<package>.tar.gz` laid out as `<package>/<type>/<component>/<file>`
pub fn build_package(dir: &Path, package: &str, components: &[ComponentSpec<'_>]) -> PathBuf {
    let path = dir.join(format!("{}.tar.gz", package));
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for component in components {
        for (name, contents) in component.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            let entry_path = format!(
                "{}/{}/{}/{}",
                package, component.component_type, component.name, name
            );
            builder
                .append_data(&mut header, entry_path, contents.as_bytes())
                .unwrap();
        }
    }
    builder.into_inner().unwrap().finish().unwrap();
    path
}

/// A package with one valid `scripted` component named `ingest`
pub fn hello_package(dir: &Path, package: &str) -> PathBuf {
    build_package(
        dir,
        package,
        &[ComponentSpec {
            component_type: "scripted",
            name: "ingest",
            files: &[
                ("run.sh", "echo $component_input"),
                ("properties.json", r#"{"input": "/data/in", "retries": 3}"#),
            ],
        }],
    )
}

/// Webhook sink that keeps every event
#[derive(Default)]
pub struct RecordingWebhook {
    events: Mutex<Vec<(String, StateChangeEvent)>>,
}

impl RecordingWebhook {
    /// `(url, id, state)` of every event so far
    pub fn states(&self) -> Vec<(String, String, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(url, event)| (url.clone(), event.id.clone(), event.state.clone()))
            .collect()
    }

    /// Events delivered to `url`
    pub fn events_for(&self, url: &str) -> Vec<StateChangeEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == url)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl WebhookSink for RecordingWebhook {
    async fn notify(&self, url: &str, event: StateChangeEvent) {
        self.events.lock().unwrap().push((url.to_string(), event));
    }
}

/// Webhook sink whose transport always panics
pub struct PanickingWebhook;

#[async_trait]
impl WebhookSink for PanickingWebhook {
    async fn notify(&self, _url: &str, _event: StateChangeEvent) {
        panic!("webhook transport blew up");
    }
}

/// Package registrar that stores normally but cannot delete
#[derive(Default)]
pub struct UndeletableRegistrar {
    inner: MemoryRegistrar,
}

#[async_trait]
impl PackageRegistrar for UndeletableRegistrar {
    async fn set_package(
        &self,
        package: &str,
        artifact: &Path,
        metadata: PackageMetadata,
    ) -> deployment_registry::Result<()> {
        self.inner.set_package(package, artifact, metadata).await
    }

    async fn get_package_metadata(
        &self,
        package: &str,
    ) -> deployment_registry::Result<Option<PackageRecord>> {
        self.inner.get_package_metadata(package).await
    }

    async fn set_package_deploy_status(
        &self,
        package: &str,
        status: DeployStatus,
    ) -> deployment_registry::Result<()> {
        self.inner.set_package_deploy_status(package, status).await
    }

    async fn get_package_deploy_status(
        &self,
        package: &str,
    ) -> deployment_registry::Result<Option<DeployStatus>> {
        self.inner.get_package_deploy_status(package).await
    }

    async fn delete_package(&self, _package: &str) -> deployment_registry::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "artifact store is read-only",
        )
        .into())
    }

    async fn package_exists(&self, package: &str) -> deployment_registry::Result<bool> {
        self.inner.package_exists(package).await
    }

    async fn list_packages(&self) -> deployment_registry::Result<Vec<String>> {
        self.inner.list_packages().await
    }

    async fn get_package_data(
        &self,
        package: &str,
    ) -> deployment_registry::Result<Option<PathBuf>> {
        self.inner.get_package_data(package).await
    }
}

/// Component creator for the `warehouse` type whose creation always fails
#[derive(Default)]
pub struct RejectingCreator {
    attempts: AtomicUsize,
}

impl RejectingCreator {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentCreator for RejectingCreator {
    fn component_type(&self) -> &str {
        "warehouse"
    }

    fn validate_component(&self, _component: &ComponentMetadata) -> Vec<String> {
        Vec::new()
    }

    async fn create_component(
        &self,
        _request: CreateRequest<'_>,
        _properties: &mut Properties,
    ) -> deployment_orchestration::Result<ComponentCreateData> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(deployment_orchestration::Error::FailedCreation(
            "warehouse quota exceeded".into(),
        ))
    }

    async fn destroy_component(
        &self,
        _application: &str,
        _create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        Ok(())
    }

    async fn start_component(
        &self,
        _application: &str,
        _create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        Ok(())
    }

    async fn stop_component(
        &self,
        _application: &str,
        _create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        Ok(())
    }
}

/// Lifecycle hook invocation seen by [`ScriptedCreator`]
#[derive(Debug, Clone, PartialEq)]
pub struct HookCall {
    pub hook: &'static str,
    pub application: String,
    pub create_data: ComponentCreateData,
}

/// Component creator for the `scripted` type
///
/// Requires a `run.sh` in every component. Hooks are recorded and can be
/// made to fail or to wait for a release signal.
#[derive(Default)]
pub struct ScriptedCreator {
    calls: Mutex<Vec<HookCall>>,
    fail_destroy: AtomicBool,
    fail_start: AtomicBool,
    panic_start: AtomicBool,
    fail_stop: AtomicBool,
    start_gate: Mutex<Option<async_channel::Receiver<()>>>,
}

impl ScriptedCreator {
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn panic_start(&self, panic: bool) {
        self.panic_start.store(panic, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Hold every start until the returned sender fires or is dropped
    pub fn hold_starts(&self) -> async_channel::Sender<()> {
        let (release, gate) = async_channel::unbounded();
        *self.start_gate.lock().unwrap() = Some(gate);
        release
    }

    fn record(&self, hook: &'static str, application: &str, create_data: &ComponentCreateData) {
        self.calls.lock().unwrap().push(HookCall {
            hook,
            application: application.to_string(),
            create_data: create_data.clone(),
        });
    }
}

#[async_trait]
impl ComponentCreator for ScriptedCreator {
    fn component_type(&self) -> &str {
        "scripted"
    }

    fn validate_component(&self, component: &ComponentMetadata) -> Vec<String> {
        if component.has_file("run.sh") {
            Vec::new()
        } else {
            vec!["missing file run.sh".to_string()]
        }
    }

    async fn create_component(
        &self,
        request: CreateRequest<'_>,
        properties: &mut Properties,
    ) -> deployment_orchestration::Result<ComponentCreateData> {
        let script = std::fs::read_to_string(request.staged_path.join("run.sh"))?;
        let mut data = ComponentCreateData::new();
        data.insert(
            "handle".into(),
            json!(format!("{}-{}", request.application, request.component.component_name)),
        );
        data.insert("script".into(), Value::String(script));
        data.insert(
            "input".into(),
            json!(properties.get("component_input").cloned()),
        );
        self.record("create", request.application, &data);
        Ok(data)
    }

    async fn destroy_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        self.record("destroy", application, create_data);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(deployment_orchestration::Error::FailedCreation(
                "scheduler refused to kill the job".into(),
            ));
        }
        Ok(())
    }

    async fn start_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        let gate = self.start_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.recv().await;
        }
        self.record("start", application, create_data);
        if self.panic_start.load(Ordering::SeqCst) {
            panic!("engine client bug");
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(deployment_orchestration::Error::FailedConnection(
                "scheduler unreachable".into(),
            ));
        }
        Ok(())
    }

    async fn stop_component(
        &self,
        application: &str,
        create_data: &ComponentCreateData,
    ) -> deployment_orchestration::Result<()> {
        self.record("stop", application, create_data);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(deployment_orchestration::Error::FailedCreation(
                "scheduler refused to suspend the job".into(),
            ));
        }
        Ok(())
    }
}

/// Collaborators swapped into a [`TestDeployer`]
#[derive(Default)]
pub struct Fixtures {
    /// Authorizer instead of allow-all
    pub authorizer: Option<Arc<dyn Authorizer>>,
    /// Webhook sink instead of the recorder
    pub webhook: Option<Arc<dyn WebhookSink>>,
    /// Leave the webhook to the context, pointed at an unreachable endpoint
    pub http_callbacks: bool,
    /// Package registrar instead of the in-memory one
    pub packages: Option<Arc<dyn PackageRegistrar>>,
    /// Creators registered next to the scripted one
    pub creators: Vec<Arc<dyn ComponentCreator>>,
}

/// Deployment manager wired to in-memory collaborators
pub struct TestDeployer {
    pub manager: DeploymentManager,
    pub webhook: Arc<RecordingWebhook>,
    pub creator: Arc<ScriptedCreator>,
    pub repository: PathBuf,
    _root: TempDir,
}

impl TestDeployer {
    /// Deployer where everyone may do everything
    pub fn new(users: StaticUserDirectory) -> Self {
        Self::with_authorizer(users, None)
    }

    /// Deployer using `authorizer`, or allow-all when `None`
    pub fn with_authorizer(
        users: StaticUserDirectory,
        authorizer: Option<Arc<dyn Authorizer>>,
    ) -> Self {
        Self::with_fixtures(
            users,
            Fixtures {
                authorizer,
                ..Default::default()
            },
        )
    }

    /// Deployer with some collaborators replaced
    pub fn with_fixtures(users: StaticUserDirectory, fixtures: Fixtures) -> Self {
        let root = TempDir::new().unwrap();
        let repository = root.path().join("repository");
        std::fs::create_dir_all(&repository).unwrap();

        let mut config = DeployerConfig {
            deployer_thread_limit: 2,
            stage_root: root.path().join("stage"),
            data_dir: root.path().join("data"),
            package_callback: Some(PACKAGE_CALLBACK.to_string()),
            application_callback: Some(APPLICATION_CALLBACK.to_string()),
            component_types: vec!["scripted".to_string()],
            repository: RepositoryConfig::Fs {
                path: repository.clone(),
            },
            provisioning: ProvisioningConfig {
                filesystem_root: root.path().join("dfs"),
                opentsdb_url: None,
                hbase_rest_url: None,
            },
            ..Default::default()
        };
        config.authorization.allow_all = fixtures.authorizer.is_none();
        config
            .environment
            .insert("queue".to_string(), "default".to_string());
        if fixtures.http_callbacks {
            // Nothing listens on the discard port
            config.package_callback = Some("http://127.0.0.1:9/packages".to_string());
            config.application_callback = Some("http://127.0.0.1:9/applications".to_string());
            config.http_timeout_secs = 5;
        }

        let webhook = Arc::new(RecordingWebhook::default());
        let creator = Arc::new(ScriptedCreator::default());
        let mut creators = CreatorRegistry::new();
        creators.register(creator.clone());
        for extra in fixtures.creators {
            config.component_types.push(extra.component_type().to_string());
            creators.register(extra);
        }

        let mut builder = DeploymentContext::builder(config)
            .users(Arc::new(users))
            .creators(creators);
        if !fixtures.http_callbacks {
            let sink: Arc<dyn WebhookSink> = match fixtures.webhook {
                Some(sink) => sink,
                None => webhook.clone(),
            };
            builder = builder.webhook(sink);
        }
        if let Some(authorizer) = fixtures.authorizer {
            builder = builder.authorizer(authorizer);
        }
        if let Some(packages) = fixtures.packages {
            builder = builder.packages(packages);
        }
        let context = builder.build().unwrap();

        Self {
            manager: DeploymentManager::new(context),
            webhook,
            creator,
            repository,
            _root: root,
        }
    }

    /// Put `hello_package` into the repository under `package`
    pub fn publish(&self, package: &str) {
        hello_package(&self.repository, package);
    }

    /// Deploy `package` as `user` and wait for the outcome
    pub async fn deploy(&self, package: &str, user: &str) {
        self.manager
            .deploy_package(package, user)
            .await
            .unwrap()
            .get_result()
            .await
            .unwrap();
    }

    /// Create and start `application` from `package` running as `user`
    pub async fn started_application(&self, package: &str, application: &str, user: &str) {
        let mut overrides = serde_json::Map::new();
        overrides.insert("user".into(), json!(user));
        self.manager
            .create_application(package, application, overrides, user)
            .await
            .unwrap()
            .get_result()
            .await
            .unwrap();
        self.manager
            .start_application(application, user)
            .await
            .unwrap()
            .get_result()
            .await
            .unwrap();
    }
}
