//! Runtime-agnostic background task dispatch
//!
//! This crate provides a [`Spawner`] abstraction over async runtimes and an
//! [`AsyncDispatcher`]: a fixed-size pool of workers that run long-lived
//! units of work in the background and hand their outcome back through a
//! [`ScheduledTask`].
//!
//! # Examples
//!
//! ```no_run
//! use async_dispatch::prelude::*;
//!
//! # #[cfg(feature = "smol")]
//! smol::block_on(async {
//!     let dispatcher = AsyncDispatcher::new("example", 2, &SmolSpawner).unwrap();
//!     let task = dispatcher.run_as_async(
//!         "answer",
//!         async { Ok::<_, std::io::Error>(42) },
//!         TaskCallbacks::new().on_success(|value: &i32| println!("got {value}")),
//!     );
//!     assert_eq!(task.get_result().await.unwrap(), 42);
//! });
//! ```

use std::future::Future;
use std::pin::Pin;

mod dispatcher;
pub mod runtime_utils;

#[cfg(feature = "smol")]
pub mod smol;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use dispatcher::{
    AsyncDispatcher, DispatchError, PoolError, ScheduledTask, TaskCallbacks, panic_message,
};
pub use runtime_utils::{Elapsed, sleep, timeout};

/// Boxed future accepted by a [`Spawner`]
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A spawner that can spawn futures on an async runtime
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime
    ///
    /// The future will run to completion in the background.
    fn spawn(&self, future: BoxedTask);
}

/// Prelude for common imports
pub mod prelude {
    pub use crate::runtime_utils::{sleep, timeout};
    pub use crate::{AsyncDispatcher, DispatchError, ScheduledTask, Spawner, TaskCallbacks};

    #[cfg(feature = "tokio")]
    pub use crate::tokio::TokioSpawner;

    #[cfg(feature = "smol")]
    pub use crate::smol::SmolSpawner;
}
