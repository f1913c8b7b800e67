//! Bounded-parallel map used by both crawler phases.
//!
//! Credential resolution and payload execution are the same shape: apply an
//! async function to N independent items with at most `max_concurrency` in
//! flight, and report every item exactly once even if some fail. Each item is
//! spawned on a [`JoinSet`] and gated by a shared [`Semaphore`], so the work
//! really runs in parallel on the multi-threaded runtime.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default bound on in-flight tasks
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Failure of the task itself, as opposed to an error value it returned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was cancelled before it reported a result")]
    Cancelled,
}

/// Outcome of one input item
#[derive(Debug)]
pub struct TaskOutput<R> {
    /// Position of the item in the input sequence
    pub index: usize,
    pub outcome: Result<R, TaskError>,
}

/// Run `task` over every item with bounded parallelism.
///
/// Returns once every item has been processed. The output holds exactly one
/// entry per input item, in completion order; use [`TaskOutput::index`] to map
/// an entry back to its input.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrency: usize,
    task: F,
) -> Vec<TaskOutput<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let max_concurrency = max_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let task = Arc::new(task);
    let mut set = JoinSet::new();

    debug!(
        "Running {} tasks with max concurrency of {}",
        total, max_concurrency
    );

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, Err(TaskError::Cancelled)),
            };
            let outcome = AssertUnwindSafe(task(item))
                .catch_unwind()
                .await
                .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));
            (index, outcome)
        });
    }

    let mut reported = vec![false; total];
    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                reported[index] = true;
                results.push(TaskOutput { index, outcome });
            }
            Err(e) => warn!("Task failed to join: {}", e),
        }
    }

    for (index, done) in reported.into_iter().enumerate() {
        if !done {
            results.push(TaskOutput {
                index,
                outcome: Err(TaskError::Cancelled),
            });
        }
    }

    results
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
