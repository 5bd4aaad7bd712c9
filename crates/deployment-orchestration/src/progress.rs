//! In-flight operation tracking
//!
//! A [`ProgressTracker`] records the transitional state of every package or
//! application with a background operation in flight. The same lock is held
//! while the manager reads persisted state to check an operation's
//! precondition, so deciding to start an operation and marking it started
//! happen atomically.
//!
//! Entries live only in memory; a restart forgets operations that were in
//! flight and their entities report the last persisted state.

use deployment_registry::{ApplicationState, PackageState};
use futures::lock::{Mutex, MutexGuard};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Entries {
    packages: HashMap<String, PackageState>,
    applications: HashMap<String, ApplicationState>,
}

/// Transitional states of entities with operations in flight
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: Mutex<Entries>,
}

/// Exclusive access to the tracker
///
/// Held across a precondition check and the matching `set_*` call.
pub struct ProgressGuard<'a> {
    entries: MutexGuard<'a, Entries>,
}

impl ProgressGuard<'_> {
    /// Transitional state of a package
    pub fn package(&self, name: &str) -> Option<PackageState> {
        self.entries.packages.get(name).copied()
    }

    /// Transitional state of an application
    pub fn application(&self, name: &str) -> Option<ApplicationState> {
        self.entries.applications.get(name).copied()
    }

    /// Mark a package operation as in flight
    pub fn set_package(&mut self, name: &str, state: PackageState) {
        self.entries.packages.insert(name.to_string(), state);
    }

    /// Mark an application operation as in flight
    pub fn set_application(&mut self, name: &str, state: ApplicationState) {
        self.entries.applications.insert(name.to_string(), state);
    }
}

impl ProgressTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the tracker lock
    pub async fn lock(&self) -> ProgressGuard<'_> {
        ProgressGuard {
            entries: self.entries.lock().await,
        }
    }

    /// Transitional state of a package, if an operation is in flight
    pub async fn package(&self, name: &str) -> Option<PackageState> {
        self.lock().await.package(name)
    }

    /// Transitional state of an application, if an operation is in flight
    pub async fn application(&self, name: &str) -> Option<ApplicationState> {
        self.lock().await.application(name)
    }

    /// Forget the package's in-flight operation
    pub async fn clear_package(&self, name: &str) {
        self.entries.lock().await.packages.remove(name);
    }

    /// Forget the application's in-flight operation
    pub async fn clear_application(&self, name: &str) {
        self.entries.lock().await.applications.remove(name);
    }

    /// Number of operations in flight
    pub async fn in_flight(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.packages.len() + entries.applications.len()
    }
}
