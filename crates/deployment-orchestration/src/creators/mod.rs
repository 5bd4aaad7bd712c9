//! Component creators
//!
//! One [`ComponentCreator`] per component type, looked up by type name in a
//! [`CreatorRegistry`]. [`CreatorHost`] holds the machinery shared by all
//! types.

pub mod base;
pub mod descriptors;
pub mod jupyter;
pub mod oozie;
pub mod registry;
pub mod template;
mod traits;

pub use base::CreatorHost;
pub use descriptors::{ClusterProvisioner, HdfsEntry, MetricEntry, ResourceProvisioner, TableEntry};
pub use jupyter::JupyterCreator;
pub use oozie::OozieCreator;
pub use registry::CreatorRegistry;
pub use traits::{ComponentCreator, CreateRequest, Properties};
