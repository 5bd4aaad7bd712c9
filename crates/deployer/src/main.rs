use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use deployment_orchestration::{DeployerConfig, DeploymentContext, DeploymentManager};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Deployment manager - package and application lifecycle tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "deployer.yaml")]
    config: PathBuf,

    /// User the request is made on behalf of, defaults to $USER
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

/// How results are printed
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Human readable tables
    Table,
    /// Pretty printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List packages available in the repository
    Repository {
        /// Number of newest versions to show per package
        #[arg(short, long, default_value_t = 1)]
        recency: usize,
    },

    /// List deployed packages
    Packages,

    /// Show the state of a package
    Package {
        /// Package name, e.g. hello-1.0.0
        package: String,
    },

    /// Deploy a package from the repository
    Deploy {
        /// Package name, e.g. hello-1.0.0
        package: String,
    },

    /// Undeploy a package
    Undeploy {
        /// Package name
        package: String,
    },

    /// List applications
    Applications {
        /// Only applications created from this package
        #[arg(short, long)]
        package: Option<String>,
    },

    /// Show the state of an application
    Application {
        /// Application name
        application: String,
    },

    /// Show the runtime details of an application's components
    Detail {
        /// Application name
        application: String,
    },

    /// Create an application from a deployed package
    Create {
        /// Package name
        package: String,

        /// Application name
        application: String,

        /// JSON file with property overrides
        #[arg(short, long)]
        overrides: Option<PathBuf>,
    },

    /// Start an application
    Start {
        /// Application name
        application: String,
    },

    /// Stop an application
    Stop {
        /// Application name
        application: String,
    },

    /// Destroy an application
    Delete {
        /// Application name
        application: String,
    },

    /// Show the platform environment
    Environment,
}

fn init_logging(config: &DeployerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DeployerConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    init_logging(&config);
    debug!("Configuration loaded from {:?}", cli.config);

    let context = DeploymentContext::from_config(config)
        .await
        .context("Failed to initialize the deployment manager")?;
    let manager = DeploymentManager::new(context);
    let out = commands::Output::new(cli.format);
    let user = cli
        .user
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_default();
    let user = user.as_str();

    match cli.command {
        Commands::Repository { recency } => {
            commands::packages::repository(&manager, &out, recency, user).await
        }
        Commands::Packages => commands::packages::list(&manager, &out, user).await,
        Commands::Package { package } => {
            commands::packages::info(&manager, &out, &package, user).await
        }
        Commands::Deploy { package } => {
            commands::packages::deploy(&manager, &out, &package, user).await
        }
        Commands::Undeploy { package } => {
            commands::packages::undeploy(&manager, &out, &package, user).await
        }
        Commands::Applications { package } => {
            commands::applications::list(&manager, &out, package.as_deref(), user).await
        }
        Commands::Application { application } => {
            commands::applications::info(&manager, &out, &application, user).await
        }
        Commands::Detail { application } => {
            commands::applications::detail(&manager, &out, &application, user).await
        }
        Commands::Create {
            package,
            application,
            overrides,
        } => {
            commands::applications::create(
                &manager,
                &out,
                &package,
                &application,
                overrides.as_deref(),
                user,
            )
            .await
        }
        Commands::Start { application } => {
            commands::applications::start(&manager, &out, &application, user).await
        }
        Commands::Stop { application } => {
            commands::applications::stop(&manager, &out, &application, user).await
        }
        Commands::Delete { application } => {
            commands::applications::delete(&manager, &out, &application, user).await
        }
        Commands::Environment => commands::environment(&manager, &out, user).await,
    }
}
