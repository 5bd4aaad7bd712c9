//! HTTP calls on a Tokio reactor
//!
//! `reqwest` only makes progress on a Tokio runtime. Requests issued from a
//! Tokio task run in place; requests from any other executor are handed to a
//! small shared runtime and awaited through its join handle.

use crate::{Error, Result};
use std::future::Future;
use std::sync::LazyLock;

static RUNTIME: LazyLock<std::io::Result<tokio::runtime::Runtime>> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("deployer-http")
        .enable_all()
        .build()
});

/// Drive `request` to completion on a Tokio runtime
pub(crate) async fn run<F, T>(request: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return request.await;
    }

    let runtime = RUNTIME.as_ref().map_err(|e| {
        Error::FailedConnection(format!("Unable to start the HTTP runtime: {}", e))
    })?;
    runtime
        .spawn(request)
        .await
        .map_err(|e| Error::FailedConnection(format!("HTTP request did not complete: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_request_outside_tokio() {
        let client = reqwest::Client::new();
        // Nothing listens on the discard port, so this fails without panicking
        let outcome = run(async move {
            client
                .get("http://127.0.0.1:9/")
                .send()
                .await
                .map(|response| response.status())
                .map_err(|e| Error::FailedConnection(e.to_string()))
        })
        .await;

        assert_eq!(outcome.unwrap_err().kind(), crate::ErrorKind::FailedConnection);
    }

    #[smol_potat::test]
    async fn test_panicking_request_becomes_error() {
        let outcome: Result<()> = run(async { panic!("client bug") }).await;
        assert_eq!(outcome.unwrap_err().kind(), crate::ErrorKind::FailedConnection);
    }
}
