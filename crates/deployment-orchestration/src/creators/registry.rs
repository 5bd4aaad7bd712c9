//! Registry mapping component type names to creators

use super::ComponentCreator;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registered component creators
#[derive(Default)]
pub struct CreatorRegistry {
    creators: HashMap<String, Arc<dyn ComponentCreator>>,
}

impl CreatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a creator under its component type
    pub fn register(&mut self, creator: Arc<dyn ComponentCreator>) {
        self.creators
            .insert(creator.component_type().to_string(), creator);
    }

    /// Creator for a component type
    pub fn get(&self, component_type: &str) -> Option<Arc<dyn ComponentCreator>> {
        self.creators.get(component_type).cloned()
    }

    /// Registered component type names
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.creators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fail unless every named component type has a creator
    pub fn ensure_registered(&self, component_types: &[String]) -> Result<()> {
        let missing: Vec<&str> = component_types
            .iter()
            .filter(|name| !self.creators.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "No component creator registered for: {}",
                missing.join(", ")
            )))
        }
    }
}
