//! Runtime-agnostic timer helpers
//!
//! Timers are driven by `async-io`'s reactor so they work the same on smol,
//! tokio or a plain `block_on`.

use futures::future::{Either, select};
use std::future::Future;
use std::time::Duration;

/// Error returned by [`timeout`] when the deadline passes first
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Sleep for the specified duration
pub async fn sleep(duration: Duration) {
    async_io::Timer::after(duration).await;
}

/// Run `future` to completion unless `duration` passes first
pub async fn timeout<F: Future>(duration: Duration, future: F) -> Result<F::Output, Elapsed> {
    let future = std::pin::pin!(future);
    let timer = async_io::Timer::after(duration);

    match select(future, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(Elapsed(duration)),
    }
}
