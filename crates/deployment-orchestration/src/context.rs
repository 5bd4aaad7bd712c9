//! Deployment context
//!
//! Everything the [`DeploymentManager`](crate::DeploymentManager) depends on
//! is built once at startup and carried in a [`DeploymentContext`]. Tests
//! swap individual collaborators through the [`ContextBuilder`].

use crate::application::ApplicationCreator;
use crate::authorizer::{AllowAll, Authorizer, LocalAuthorizer};
use crate::config::{DeployerConfig, RepositoryConfig};
use crate::creators::{
    ClusterProvisioner, CreatorHost, CreatorRegistry, JupyterCreator, OozieCreator,
    ResourceProvisioner,
};
use crate::progress::ProgressTracker;
use crate::repository::{FsRepository, HttpRepository, Repository};
use crate::users::{SystemUserDirectory, UserDirectory};
use crate::webhook::{HttpWebhook, NullWebhook, WebhookSink};
use crate::{Error, Result};
use async_dispatch::{AsyncDispatcher, Spawner};
use deployment_registry::{
    ApplicationRegistrar, MemoryRegistrar, PackageParser, PackageRegistrar, SledRegistrar,
};
use std::sync::Arc;
use tracing::info;

/// Runtime dependencies of the deployment manager
#[derive(Clone)]
pub struct DeploymentContext {
    /// Deployer configuration
    pub config: Arc<DeployerConfig>,

    /// Background worker pool
    pub dispatcher: Arc<AsyncDispatcher>,

    /// In-flight operations
    pub progress: Arc<ProgressTracker>,

    /// Package store
    pub packages: Arc<dyn PackageRegistrar>,

    /// Application store
    pub applications: Arc<dyn ApplicationRegistrar>,

    /// Package source
    pub repository: Arc<dyn Repository>,

    /// Access control
    pub authorizer: Arc<dyn Authorizer>,

    /// OS users and groups
    pub users: Arc<dyn UserDirectory>,

    /// State change notifications
    pub webhook: Arc<dyn WebhookSink>,

    /// Package archive parser
    pub parser: PackageParser,

    /// Multi-component orchestration
    pub creator: Arc<ApplicationCreator>,
}

impl DeploymentContext {
    /// Production context: sled-backed registrars under `config.data_dir`
    /// and collaborators built from the configuration
    pub async fn from_config(config: DeployerConfig) -> Result<Self> {
        let registrar = Arc::new(SledRegistrar::open(&config.data_dir).await?);
        info!("Registrar opened at {:?}", config.data_dir);
        ContextBuilder::new(config)
            .packages(registrar.clone())
            .applications(registrar)
            .build()
    }

    /// Start building a context
    pub fn builder(config: DeployerConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }
}

/// Spawner for the enabled runtime feature; tokio wins when both are on
fn default_spawner() -> Arc<dyn Spawner> {
    #[cfg(feature = "runtime-tokio")]
    {
        Arc::new(async_dispatch::tokio::TokioSpawner)
    }

    #[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
    {
        Arc::new(async_dispatch::smol::SmolSpawner)
    }

    #[cfg(not(any(feature = "runtime-smol", feature = "runtime-tokio")))]
    {
        compile_error!("One of the runtime features must be enabled: runtime-smol or runtime-tokio");
    }
}

/// Builder for [`DeploymentContext`]
///
/// Collaborators not set explicitly are built from the configuration;
/// registrars default to in-memory stores.
pub struct ContextBuilder {
    config: DeployerConfig,
    spawner: Option<Arc<dyn Spawner>>,
    packages: Option<Arc<dyn PackageRegistrar>>,
    applications: Option<Arc<dyn ApplicationRegistrar>>,
    repository: Option<Arc<dyn Repository>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    users: Option<Arc<dyn UserDirectory>>,
    webhook: Option<Arc<dyn WebhookSink>>,
    provisioner: Option<Arc<dyn ResourceProvisioner>>,
    creators: Option<CreatorRegistry>,
}

impl ContextBuilder {
    /// Builder over `config`
    pub fn new(config: DeployerConfig) -> Self {
        Self {
            config,
            spawner: None,
            packages: None,
            applications: None,
            repository: None,
            authorizer: None,
            users: None,
            webhook: None,
            provisioner: None,
            creators: None,
        }
    }

    /// Runtime the dispatcher workers run on
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Package store
    pub fn packages(mut self, packages: Arc<dyn PackageRegistrar>) -> Self {
        self.packages = Some(packages);
        self
    }

    /// Application store
    pub fn applications(mut self, applications: Arc<dyn ApplicationRegistrar>) -> Self {
        self.applications = Some(applications);
        self
    }

    /// Package source
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Access control
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// OS users and groups
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// State change notifications
    pub fn webhook(mut self, webhook: Arc<dyn WebhookSink>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Descriptor provisioning
    pub fn provisioner(mut self, provisioner: Arc<dyn ResourceProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Component creators, replacing the built-in ones
    pub fn creators(mut self, creators: CreatorRegistry) -> Self {
        self.creators = Some(creators);
        self
    }

    /// Assemble the context
    ///
    /// Fails when a configured component type has no registered creator.
    pub fn build(self) -> Result<DeploymentContext> {
        let config = self.config;
        config.validate()?;
        let timeout = config.http_timeout();

        let provisioner: Arc<dyn ResourceProvisioner> = match self.provisioner {
            Some(provisioner) => provisioner,
            None => Arc::new(ClusterProvisioner::new(&config.provisioning, timeout)?),
        };

        let creators = match self.creators {
            Some(creators) => creators,
            None => {
                let mut creators = CreatorRegistry::new();
                creators.register(Arc::new(OozieCreator::new(
                    config.oozie.clone(),
                    provisioner.clone(),
                    timeout,
                )?));
                creators.register(Arc::new(JupyterCreator::new(config.jupyter.clone())));
                creators
            }
        };
        creators.ensure_registered(&config.component_types)?;

        let repository: Arc<dyn Repository> = match self.repository {
            Some(repository) => repository,
            None => match &config.repository {
                RepositoryConfig::Fs { path } => Arc::new(FsRepository::new(path.clone())),
                RepositoryConfig::Http { url } => Arc::new(HttpRepository::new(url.clone(), timeout)?),
            },
        };

        let authorizer: Arc<dyn Authorizer> = match self.authorizer {
            Some(authorizer) => authorizer,
            None if config.authorization.allow_all => Arc::new(AllowAll),
            None if config.authorization.rules.is_empty() => {
                Arc::new(LocalAuthorizer::new(LocalAuthorizer::default_rules())?)
            }
            None => Arc::new(LocalAuthorizer::new(config.authorization.rules.clone())?),
        };

        let webhook: Arc<dyn WebhookSink> = match self.webhook {
            Some(webhook) => webhook,
            None if config.package_callback.is_some() || config.application_callback.is_some() => {
                Arc::new(HttpWebhook::new(timeout)?)
            }
            None => Arc::new(NullWebhook),
        };

        let users: Arc<dyn UserDirectory> = match self.users {
            Some(users) => users,
            None => Arc::new(SystemUserDirectory::new()),
        };
        let memory = Arc::new(MemoryRegistrar::new());
        let packages: Arc<dyn PackageRegistrar> = match self.packages {
            Some(packages) => packages,
            None => memory.clone(),
        };
        let applications: Arc<dyn ApplicationRegistrar> = match self.applications {
            Some(applications) => applications,
            None => memory,
        };

        let spawner = self.spawner.unwrap_or_else(default_spawner);
        let dispatcher = AsyncDispatcher::new("deployer", config.deployer_thread_limit, spawner.as_ref())
            .map_err(|e| Error::Config(e.to_string()))?;

        let creator = ApplicationCreator::new(
            CreatorHost::new(config.environment.clone(), provisioner),
            Arc::new(creators),
            users.clone(),
            config.stage_root.clone(),
        );

        info!(
            "Deployment context ready ({} workers, component types: {})",
            config.deployer_thread_limit,
            config.component_types.join(", ")
        );

        Ok(DeploymentContext {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            progress: Arc::new(ProgressTracker::new()),
            packages,
            applications,
            repository,
            authorizer,
            users,
            webhook,
            parser: PackageParser::new(),
            creator: Arc::new(creator),
        })
    }
}
