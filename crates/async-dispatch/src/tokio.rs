//! Tokio runtime spawner implementation

use crate::{BoxedTask, Spawner};

/// Spawner for the Tokio runtime
///
/// Must be used from inside a Tokio runtime context.
#[derive(Debug, Clone, Copy)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, future: BoxedTask) {
        tokio::spawn(future);
    }
}
