//! Deployment manager
//!
//! Exposes every lifecycle operation on packages and applications. State
//! changing operations check their precondition and mark the entity's
//! transitional state under the [`ProgressTracker`](crate::ProgressTracker)
//! lock, then return a [`LifecycleTask`] for the background work. Callers
//! poll `get_*_info` or await the task to observe the outcome.

use crate::authorizer::{Action, Identity, Resource};
use crate::context::DeploymentContext;
use crate::repository::RepositoryPackage;
use crate::webhook::StateChangeEvent;
use crate::{Error, Result};
use async_dispatch::{ScheduledTask, TaskCallbacks};
use deployment_registry::{
    ApplicationState, DeployStatus, Overrides, PackageDefaults, PackageRecord, PackageState,
    split_package_name,
};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Handle to a scheduled lifecycle operation
pub type LifecycleTask = ScheduledTask<(), Error>;

/// Reported state of a package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageInfo {
    /// Package name without the version
    pub name: String,
    /// Package version
    pub version: String,
    /// Current state, transitional while an operation is in flight
    pub status: PackageState,
    /// User who deployed the package
    pub user: Option<String>,
    /// Component property defaults, present once deployed
    pub defaults: Option<PackageDefaults>,
    /// Diagnostic of the last deploy or undeploy
    pub information: Option<String>,
}

/// Reported state of an application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationInfo {
    /// Application name
    pub name: String,
    /// Current state, transitional while an operation is in flight
    pub status: ApplicationState,
    /// Diagnostic of the last failed operation
    pub information: Option<String>,
    /// Package the application was created from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Overrides supplied at creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Overrides>,
    /// Package defaults at creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<PackageDefaults>,
}

/// Runtime view of an application's components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationDetail {
    /// Application name
    pub name: String,
    /// Current state
    pub status: ApplicationState,
    /// One `{type, component, details}` entry per component
    pub components: Vec<Value>,
}

/// Entity a background operation reports on
#[derive(Debug, Clone)]
enum Subject {
    Package(String),
    Application(String),
}

/// Start, stop and delete share everything but these parameters
#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop,
    Delete,
}

impl Transition {
    fn required(&self) -> &'static [ApplicationState] {
        match self {
            Transition::Start => &[ApplicationState::Created],
            Transition::Stop => &[ApplicationState::Started],
            Transition::Delete => &[ApplicationState::Created, ApplicationState::Started],
        }
    }

    fn transitional(&self) -> ApplicationState {
        match self {
            Transition::Start => ApplicationState::Starting,
            Transition::Stop => ApplicationState::Stopping,
            Transition::Delete => ApplicationState::Destroying,
        }
    }

    fn action(&self) -> Action {
        match self {
            Transition::Start => Action::Start,
            Transition::Stop => Action::Stop,
            Transition::Delete => Action::Destroy,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Transition::Start => "starting",
            Transition::Stop => "stopping",
            Transition::Delete => "deleting",
        }
    }

    /// Persisted state when the work fails
    fn fallback(&self) -> ApplicationState {
        match self {
            Transition::Start => ApplicationState::Created,
            Transition::Stop | Transition::Delete => ApplicationState::Started,
        }
    }
}

/// `"Error <verb> <entity> <kind>, details: <json string>"`
fn failure_information(verb: &str, entity: &str, err: &Error) -> String {
    let details =
        serde_json::to_string(&err.to_string()).unwrap_or_else(|_| format!("\"{}\"", err));
    format!("Error {} {} {}, details: {}", verb, entity, err.kind(), details)
}

fn utc_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Orchestrates package and application lifecycles
#[derive(Clone)]
pub struct DeploymentManager {
    context: DeploymentContext,
}

impl DeploymentManager {
    /// Manager over an assembled context
    pub fn new(context: DeploymentContext) -> Self {
        Self { context }
    }

    /// The manager's collaborators
    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    fn identity(&self, user: &str) -> Result<Identity> {
        let groups = if user.is_empty() {
            Vec::new()
        } else {
            self.context.users.groups(user).ok_or_else(|| {
                Error::Forbidden(format!("Failed to find details for user \"{}\"", user))
            })?
        };
        Ok(Identity {
            user: user.to_string(),
            groups,
        })
    }

    async fn authorize(
        &self,
        user: &str,
        resource: Resource,
        owner: Option<&str>,
        action: Action,
    ) -> Result<()> {
        let identity = self.identity(user)?;
        if self
            .context
            .authorizer
            .authorize(&identity, resource, owner, action)
            .await?
        {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "User \"{}\" does not have authorization for \"{}\"",
                user,
                action.qualified(resource)
            )))
        }
    }

    async fn package_record(&self, package: &str) -> Result<Option<PackageRecord>> {
        if self.context.packages.package_exists(package).await? {
            Ok(self.context.packages.get_package_metadata(package).await?)
        } else {
            Ok(None)
        }
    }

    async fn application_owner(&self, application: &str) -> Result<Option<String>> {
        Ok(self
            .context
            .applications
            .get_application(application)
            .await?
            .and_then(|record| record.owner().map(str::to_string)))
    }

    /// Package info given the package's in-flight state
    ///
    /// Takes the progress value explicitly so callers holding the tracker
    /// lock can use it.
    async fn package_info_with(
        &self,
        package: &str,
        progress: Option<PackageState>,
    ) -> Result<PackageInfo> {
        let record = self.package_record(package).await?;
        let (name, version) = split_package_name(package).unwrap_or((package, ""));
        let user = record.as_ref().and_then(|r| r.metadata.user.clone());

        if let Some(status) = progress {
            return Ok(PackageInfo {
                name: name.to_string(),
                version: version.to_string(),
                status,
                user,
                defaults: None,
                information: None,
            });
        }

        let deploy_status = self.context.packages.get_package_deploy_status(package).await?;
        let information = deploy_status.as_ref().and_then(|s| s.information.clone());
        Ok(match record {
            Some(record) => PackageInfo {
                defaults: Some(record.metadata.properties()),
                name: record.name,
                version: record.version,
                status: PackageState::Deployed,
                user,
                information,
            },
            None => PackageInfo {
                name: name.to_string(),
                version: version.to_string(),
                status: deploy_status
                    .map(|s| s.state)
                    .unwrap_or(PackageState::NotDeployed),
                user,
                defaults: None,
                information,
            },
        })
    }

    async fn application_info_with(
        &self,
        application: &str,
        progress: Option<ApplicationState>,
    ) -> Result<ApplicationInfo> {
        let mut info = match self.context.applications.get_application(application).await? {
            Some(record) => ApplicationInfo {
                name: record.name,
                status: record.status,
                information: record.information,
                package_name: Some(record.package_name),
                overrides: Some(record.overrides),
                defaults: Some(record.defaults),
            },
            None => ApplicationInfo {
                name: application.to_string(),
                status: ApplicationState::NotCreated,
                information: None,
                package_name: None,
                overrides: None,
                defaults: None,
            },
        };
        if let Some(status) = progress {
            info.status = status;
        }
        Ok(info)
    }

    async fn notify(&self, subject: &Subject) {
        let config = &self.context.config;
        let (url, event) = match subject {
            Subject::Package(package) => {
                let Some(url) = config.package_callback.as_deref() else {
                    return;
                };
                match self.get_package_info(package, None).await {
                    Ok(info) => (url, StateChangeEvent::now(package, info.status, info.information)),
                    Err(err) => {
                        warn!("Unable to report state of package {}: {}", package, err);
                        return;
                    }
                }
            }
            Subject::Application(application) => {
                let Some(url) = config.application_callback.as_deref() else {
                    return;
                };
                match self.get_application_info(application, None).await {
                    Ok(info) => (
                        url,
                        StateChangeEvent::now(application, info.status, info.information),
                    ),
                    Err(err) => {
                        warn!("Unable to report state of application {}: {}", application, err);
                        return;
                    }
                }
            }
        };
        debug!("callback: {} {} {}", url, event.id, event.state);
        let id = event.id.clone();
        let delivered = AssertUnwindSafe(self.context.webhook.notify(url, event))
            .catch_unwind()
            .await;
        if let Err(panic) = delivered {
            warn!(
                "Callback to {} for {} panicked: {}",
                url,
                id,
                async_dispatch::panic_message(panic.as_ref())
            );
        }
    }

    async fn clear_progress(&self, subject: &Subject) {
        match subject {
            Subject::Package(package) => self.context.progress.clear_package(package).await,
            Subject::Application(application) => {
                self.context.progress.clear_application(application).await
            }
        }
    }

    /// Run `work` on the dispatcher, bracketed by state change events
    ///
    /// The subject's progress entry is cleared once the work finishes,
    /// whether it succeeded, failed or panicked, and whatever the first
    /// event delivery did.
    fn schedule<F>(&self, label: String, subject: Subject, work: F) -> LifecycleTask
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let manager = self.clone();
        let task = async move {
            let outcome = AssertUnwindSafe(async {
                manager.notify(&subject).await;
                work.await
            })
            .catch_unwind()
            .await;
            manager.clear_progress(&subject).await;
            manager.notify(&subject).await;
            outcome.unwrap_or_else(|panic| Err(Error::from_panic(panic)))
        };
        self.context
            .dispatcher
            .run_as_async(label, task, TaskCallbacks::new())
    }

    /// Await `work`, turning a panic into an error so failures get recorded
    async fn contained<T>(work: impl Future<Output = Result<T>>) -> Result<T> {
        AssertUnwindSafe(work)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::from_panic(panic)))
    }

    fn precondition<S>(status: S, required: &[S], absent: S) -> Result<()>
    where
        S: PartialEq + Copy + std::fmt::Display,
    {
        if required.contains(&status) {
            Ok(())
        } else {
            Err(Error::unexpected_status(status, status == absent))
        }
    }

    /// Packages available in the repository, newest `recency` versions each
    pub async fn list_repository(
        &self,
        recency: usize,
        user: &str,
    ) -> Result<Vec<RepositoryPackage>> {
        self.authorize(user, Resource::Repository, None, Action::Read)
            .await?;
        info!("list_repository: {}", recency);
        self.context.repository.get_package_list(user, recency).await
    }

    /// Names of deployed packages
    pub async fn list_packages(&self, user: &str) -> Result<Vec<String>> {
        self.authorize(user, Resource::Packages, None, Action::Read)
            .await?;
        info!("list_packages");
        Ok(self.context.packages.list_packages().await?)
    }

    /// State of a package
    ///
    /// Authorization is skipped when `user` is `None`. Never changes state.
    pub async fn get_package_info(&self, package: &str, user: Option<&str>) -> Result<PackageInfo> {
        if let Some(user) = user {
            let owner = self
                .package_record(package)
                .await?
                .and_then(|record| record.metadata.user);
            self.authorize(user, Resource::Packages, owner.as_deref(), Action::Read)
                .await?;
        }
        let progress = self.context.progress.package(package).await;
        self.package_info_with(package, progress).await
    }

    /// Mark a package transition after checking its state and the caller's rights
    async fn begin_package(
        &self,
        package: &str,
        user: &str,
        required: PackageState,
        transitional: PackageState,
        action: Action,
    ) -> Result<()> {
        let mut guard = self.context.progress.lock().await;
        let info = self.package_info_with(package, guard.package(package)).await?;
        debug!("Found {} is {}", package, info.status);
        Self::precondition(info.status, &[required], PackageState::NotDeployed)?;

        let owner = match action {
            Action::Deploy => None,
            _ => info.user.as_deref(),
        };
        self.authorize(user, Resource::Package, owner, action).await?;
        guard.set_package(package, transitional);
        Ok(())
    }

    /// Download, validate and store a package
    pub async fn deploy_package(&self, package: &str, user: &str) -> Result<LifecycleTask> {
        if package.is_empty() || package.contains(['/', '\\']) {
            return Err(Error::validation(format!("Invalid package name {:?}", package)));
        }
        self.begin_package(
            package,
            user,
            PackageState::NotDeployed,
            PackageState::Deploying,
            Action::Deploy,
        )
        .await?;

        let manager = self.clone();
        let package_name = package.to_string();
        let user = user.to_string();
        let work = async move { manager.do_deploy(&package_name, &user).await };
        Ok(self.schedule(
            format!("deploy {}", package),
            Subject::Package(package.to_string()),
            work,
        ))
    }

    async fn do_deploy(&self, package: &str, user: &str) -> Result<()> {
        info!("deploy: {}", package);
        let download_dir = self
            .context
            .config
            .stage_root
            .join(Uuid::new_v4().to_string());

        let result = Self::contained(self.download_and_store(package, user, &download_dir)).await;
        let status = match &result {
            Ok(()) => {
                info!("deployed: {}", package);
                DeployStatus {
                    state: PackageState::Deployed,
                    information: Some(format!("Deployed {} at {}", package, utc_timestamp())),
                }
            }
            Err(err) => {
                error!("Deploying {} failed: {}", package, err);
                DeployStatus {
                    state: PackageState::NotDeployed,
                    information: Some(failure_information("deploying", package, err)),
                }
            }
        };

        let recorded = self
            .context
            .packages
            .set_package_deploy_status(package, status)
            .await;
        if let Err(err) = async_fs::remove_dir_all(&download_dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove download {:?}: {}", download_dir, err);
            }
        }
        result?;
        Ok(recorded?)
    }

    async fn download_and_store(
        &self,
        package: &str,
        user: &str,
        download_dir: &std::path::Path,
    ) -> Result<()> {
        async_fs::create_dir_all(download_dir).await?;
        let artifact = self
            .context
            .repository
            .get_package(&format!("{}.tar.gz", package), user, download_dir)
            .await?;

        let parser = self.context.parser;
        let archive = artifact.clone();
        let mut metadata = smol::unblock(move || parser.get_package_metadata(&archive)).await?;
        self.context.creator.validate_package(package, &metadata)?;

        metadata.user = Some(user.to_string());
        self.context
            .packages
            .set_package(package, &artifact, metadata)
            .await?;
        Ok(())
    }

    /// Remove a deployed package
    pub async fn undeploy_package(&self, package: &str, user: &str) -> Result<LifecycleTask> {
        self.begin_package(
            package,
            user,
            PackageState::Deployed,
            PackageState::Undeploying,
            Action::Undeploy,
        )
        .await?;

        let manager = self.clone();
        let package_name = package.to_string();
        let work = async move { manager.do_undeploy(&package_name).await };
        Ok(self.schedule(
            format!("undeploy {}", package),
            Subject::Package(package.to_string()),
            work,
        ))
    }

    async fn do_undeploy(&self, package: &str) -> Result<()> {
        info!("undeploy: {}", package);
        let deleted = Self::contained(async {
            self.context
                .packages
                .delete_package(package)
                .await
                .map_err(Error::from)
        })
        .await;
        match deleted {
            Ok(()) => {
                info!("undeployed: {}", package);
                Ok(())
            }
            Err(err) => {
                error!("Undeploying {} failed: {}", package, err);
                let status = DeployStatus {
                    state: PackageState::Deployed,
                    information: Some(failure_information("undeploying", package, &err)),
                };
                if let Err(record_err) = self
                    .context
                    .packages
                    .set_package_deploy_status(package, status)
                    .await
                {
                    error!("Failed to record undeploy failure of {}: {}", package, record_err);
                }
                Err(err)
            }
        }
    }

    /// Names of applications that exist
    pub async fn list_applications(&self, user: &str) -> Result<Vec<String>> {
        self.authorize(user, Resource::Applications, None, Action::Read)
            .await?;
        info!("list_applications");
        Ok(self.context.applications.list_applications().await?)
    }

    /// Names of existing applications created from `package`
    pub async fn list_package_applications(&self, package: &str, user: &str) -> Result<Vec<String>> {
        self.authorize(user, Resource::Applications, None, Action::Read)
            .await?;
        info!("list_package_applications: {}", package);
        Ok(self
            .context
            .applications
            .list_applications_for_package(package)
            .await?)
    }

    /// Create `application` from a deployed package
    ///
    /// `overrides.user` names the OS user the application runs as and
    /// defaults to the requesting user.
    pub async fn create_application(
        &self,
        package: &str,
        application: &str,
        mut overrides: Overrides,
        user: &str,
    ) -> Result<LifecycleTask> {
        info!("create_application: {} from {}", application, package);
        if !overrides.contains_key("user") {
            overrides.insert("user".into(), Value::String(user.to_string()));
        }

        {
            let mut guard = self.context.progress.lock().await;
            let app_info = self
                .application_info_with(application, guard.application(application))
                .await?;
            Self::precondition(
                app_info.status,
                &[ApplicationState::NotCreated],
                ApplicationState::NotCreated,
            )?;

            let package_info = self
                .package_info_with(package, guard.package(package))
                .await?;
            Self::precondition(
                package_info.status,
                &[PackageState::Deployed],
                PackageState::NotDeployed,
            )?;

            self.authorize(user, Resource::Package, package_info.user.as_deref(), Action::Read)
                .await?;
            self.authorize(user, Resource::Application, None, Action::Create)
                .await?;

            let defaults = package_info.defaults.unwrap_or_default();
            self.context
                .creator
                .assert_application_properties(&overrides, &defaults)?;
            self.context
                .applications
                .create_application(package, application, overrides.clone(), defaults)
                .await?;
            guard.set_application(application, ApplicationState::Creating);
        }

        let manager = self.clone();
        let package_name = package.to_string();
        let application_name = application.to_string();
        let work = async move {
            manager
                .do_create(&package_name, &application_name, &overrides)
                .await
        };
        Ok(self.schedule(
            format!("create {}", application),
            Subject::Application(application.to_string()),
            work,
        ))
    }

    async fn do_create(&self, package: &str, application: &str, overrides: &Overrides) -> Result<()> {
        let result = Self::contained(async {
            let record = self
                .context
                .packages
                .get_package_metadata(package)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Package {} is not deployed", package)))?;
            let artifact = self
                .context
                .packages
                .get_package_data(package)
                .await?
                .ok_or_else(|| Error::NotFound(format!("No artifact stored for {}", package)))?;

            let create_data = self
                .context
                .creator
                .create_application(&artifact, &record.metadata, application, overrides)
                .await?;
            self.context
                .applications
                .set_create_data(application, create_data)
                .await?;
            self.context
                .applications
                .set_application_status(application, ApplicationState::Created, None)
                .await?;
            Ok::<_, Error>(())
        })
        .await;

        if let Err(err) = &result {
            self.record_failure(application, err, ApplicationState::NotCreated, "creating")
                .await;
        } else {
            info!("created: {}", application);
        }
        result
    }

    async fn record_failure(
        &self,
        application: &str,
        err: &Error,
        status: ApplicationState,
        verb: &str,
    ) {
        error!("{} {} failed: {}", verb, application, err);
        let information = failure_information(verb, application, err);
        if let Err(record_err) = self
            .context
            .applications
            .set_application_status(application, status, Some(information))
            .await
        {
            error!("Failed to record {} failure of {}: {}", verb, application, record_err);
        }
    }

    /// State of an application
    ///
    /// Authorization is skipped when `user` is `None`. Never changes state.
    pub async fn get_application_info(
        &self,
        application: &str,
        user: Option<&str>,
    ) -> Result<ApplicationInfo> {
        if let Some(user) = user {
            let owner = self.application_owner(application).await?;
            self.authorize(user, Resource::Application, owner.as_deref(), Action::Read)
                .await?;
        }
        debug!("get_application_info: {}", application);
        let progress = self.context.progress.application(application).await;
        self.application_info_with(application, progress).await
    }

    /// Runtime details reported by every component of an application
    pub async fn get_application_detail(
        &self,
        application: &str,
        user: &str,
    ) -> Result<ApplicationDetail> {
        let owner = self.application_owner(application).await?;
        self.authorize(user, Resource::Application, owner.as_deref(), Action::Read)
            .await?;
        info!("get_application_detail: {}", application);

        let status = self.get_application_info(application, None).await?.status;
        if status == ApplicationState::NotCreated {
            return Err(Error::unexpected_status(status, true));
        }
        let create_data = self.context.applications.get_create_data(application).await?;
        let components = self
            .context
            .creator
            .runtime_details(application, &create_data)
            .await?;
        Ok(ApplicationDetail {
            name: application.to_string(),
            status,
            components,
        })
    }

    /// Start a created application
    pub async fn start_application(&self, application: &str, user: &str) -> Result<LifecycleTask> {
        self.transition(application, user, Transition::Start).await
    }

    /// Stop a started application
    pub async fn stop_application(&self, application: &str, user: &str) -> Result<LifecycleTask> {
        self.transition(application, user, Transition::Stop).await
    }

    /// Destroy an application's components and remove its record
    pub async fn delete_application(&self, application: &str, user: &str) -> Result<LifecycleTask> {
        self.transition(application, user, Transition::Delete).await
    }

    async fn transition(
        &self,
        application: &str,
        user: &str,
        transition: Transition,
    ) -> Result<LifecycleTask> {
        info!("{} application {}", transition.verb(), application);
        {
            let mut guard = self.context.progress.lock().await;
            let info = self
                .application_info_with(application, guard.application(application))
                .await?;
            debug!("Found {} is {}", application, info.status);
            Self::precondition(info.status, transition.required(), ApplicationState::NotCreated)?;

            let owner = info
                .overrides
                .as_ref()
                .and_then(|overrides| overrides.get("user"))
                .and_then(Value::as_str);
            self.authorize(user, Resource::Application, owner, transition.action())
                .await?;
            guard.set_application(application, transition.transitional());
        }

        let manager = self.clone();
        let application_name = application.to_string();
        let work = async move {
            manager
                .do_transition(&application_name, transition)
                .await
        };
        Ok(self.schedule(
            format!("{} {}", transition.verb(), application),
            Subject::Application(application.to_string()),
            work,
        ))
    }

    async fn do_transition(&self, application: &str, transition: Transition) -> Result<()> {
        let result = Self::contained(async {
            let create_data = self.context.applications.get_create_data(application).await?;
            let creator = &self.context.creator;
            let applications = &self.context.applications;
            match transition {
                Transition::Start => {
                    creator.start_application(application, &create_data).await?;
                    applications
                        .set_application_status(application, ApplicationState::Started, None)
                        .await?;
                }
                Transition::Stop => {
                    creator.stop_application(application, &create_data).await?;
                    applications
                        .set_application_status(application, ApplicationState::Created, None)
                        .await?;
                }
                Transition::Delete => {
                    creator.destroy_application(application, &create_data).await?;
                    applications.delete_application(application).await?;
                }
            }
            Ok::<_, Error>(())
        })
        .await;

        match &result {
            Ok(()) => info!("{} {} complete", transition.verb(), application),
            Err(err) => {
                self.record_failure(application, err, transition.fallback(), transition.verb())
                    .await
            }
        }
        result
    }

    /// Platform environment descriptor
    pub async fn get_environment(&self, user: &str) -> Result<BTreeMap<String, String>> {
        self.authorize(user, Resource::Environment, None, Action::Read)
            .await?;
        Ok(self.context.config.environment.clone())
    }
}
