//! Bounded parallel map over per-scene work.
//!
//! Items run as futures inside the calling task, at most
//! `max_concurrency` at a time. Results come back in input order no matter
//! which item finishes first. The first failure cancels the shared token,
//! drops every in-flight sibling and is returned to the caller.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

/// Bounded fan-out engine for one call site.
#[derive(Debug, Clone)]
pub struct FanOut {
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl FanOut {
    /// A cap of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `parent`'s child token, so cancelling the parent also stops
    /// this fan-out's items.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Token handed to every item.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `work` over `items`.
    ///
    /// `work` receives the item's input position, the item, and a clone of
    /// the cancellation token. `on_progress(completed, total)` fires once
    /// per successful item with `completed` counting up from 1.
    pub async fn run<T, R, E, F, Fut, P>(
        &self,
        items: Vec<T>,
        work: F,
        mut on_progress: P,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(usize, T, CancellationToken) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        P: FnMut(usize, usize),
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut pending = stream::iter(items.into_iter().enumerate().map(|(index, item)| {
            let fut = work(index, item, self.cancel.clone());
            async move { (index, fut.await) }
        }))
        .buffer_unordered(self.max_concurrency);

        let mut completed = 0;
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(value) => {
                    results[index] = Some(value);
                    completed += 1;
                    on_progress(completed, total);
                }
                Err(e) => {
                    self.cancel.cancel();
                    drop(pending);
                    tracing::debug!(
                        failed_index = index,
                        completed,
                        total,
                        "Fan-out aborted on first failure",
                    );
                    return Err(e);
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
