//! The seam between update sources and the two dispatch models.
//!
//! A long-polling loop or a webhook receiver only needs something that
//! implements [`Dispatch`]; [`drive`] pumps any stream of updates into it.

use std::future::Future;

use futures_util::{Stream, StreamExt};
use parley_types::error::DispatchError;
use parley_types::update::Update;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Accepts decoded updates for processing.
///
/// Implemented by `AsyncDispatcher` (stateless) and `ChatRouter` (stateful).
/// Returning means the update was admitted, not that it was handled.
pub trait Dispatch: Send + Sync {
    fn dispatch_update(
        &self,
        update: Update,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Feed `updates` into `dispatcher` until the stream ends or `cancel` fires.
///
/// Each dispatch is awaited before the next update is pulled, so a blocked
/// dispatcher holds the source back. Dispatch errors are logged and skipped.
/// Returns the number of updates pulled from the stream.
pub async fn drive<D, S>(dispatcher: &D, updates: S, cancel: CancellationToken) -> usize
where
    D: Dispatch,
    S: Stream<Item = Update> + Send,
{
    let mut updates = std::pin::pin!(updates);
    let mut pulled = 0usize;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!(pulled, "update source cancelled");
                break;
            }
            next = updates.next() => next,
        };
        let Some(update) = next else {
            debug!(pulled, "update source exhausted");
            break;
        };
        pulled += 1;

        let update_id = update.update_id();
        if let Err(err) = dispatcher.dispatch_update(update).await {
            warn!(error = %err, ?update_id, "update dispatch failed");
        }
    }

    pulled
}
