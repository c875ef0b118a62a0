//! Scoped use of a store: check it answers, run, always close.

use std::future::Future;

use crate::error::{ShelfError, ShelfResult};
use crate::store::DocumentStore;

/// Ping `store`, hand a clone to `body`, then close it whatever happened.
///
/// A failed ping is fatal: it is logged, the body never runs, and the error
/// comes back as [`ShelfError::Connection`]. A failed close only surfaces
/// when everything before it succeeded.
pub async fn run_scoped<S, F, Fut, T>(store: S, body: F) -> ShelfResult<T>
where
    S: DocumentStore + Clone,
    F: FnOnce(S) -> Fut,
    Fut: Future<Output = ShelfResult<T>>,
{
    let namespace = store.namespace().clone();

    let result = match store.ping().await {
        Ok(()) => {
            tracing::debug!(namespace = %namespace, "store reachable");
            body(store.clone()).await
        }
        Err(e) => {
            let e = match e {
                ShelfError::Connection(msg) => ShelfError::Connection(msg),
                other => ShelfError::Connection(other.to_string()),
            };
            tracing::error!(namespace = %namespace, error = %e, "cannot reach store");
            Err(e)
        }
    };

    let closed = store.close().await;
    tracing::debug!(namespace = %namespace, "store closed");

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "close failed after earlier error");
            Err(e)
        }
    }
}
