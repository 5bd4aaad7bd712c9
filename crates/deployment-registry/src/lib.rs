//! Lifecycle records and registrars for the deployment manager
//!
//! This crate holds everything the deployment manager persists:
//!
//! - the package and application lifecycle states ([`PackageState`],
//!   [`ApplicationState`])
//! - the parsed package descriptor ([`PackageMetadata`]) and the archive
//!   parser that produces it
//! - the [`PackageRegistrar`] and [`ApplicationRegistrar`] storage contracts
//!   with a sled-backed and an in-memory implementation
//!
//! # Example
//!
//! ```no_run
//! use deployment_registry::{ApplicationRegistrar, SledRegistrar};
//!
//! # async fn example() -> deployment_registry::Result<()> {
//! let registrar = SledRegistrar::open("/var/lib/deployment-manager").await?;
//! for name in registrar.list_applications().await? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod models;
pub mod package;

pub use backend::memory::MemoryRegistrar;
pub use backend::sled::SledRegistrar;
pub use backend::{ApplicationRegistrar, PackageRegistrar};
pub use error::{Error, Result};
pub use models::*;
pub use package::{PackageParser, split_package_name};
