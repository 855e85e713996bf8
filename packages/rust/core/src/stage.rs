//! Bounded work queue with a drain barrier.
//!
//! A stage spawns one task per item, lets at most `concurrency` of them run
//! at once and holds each permit for `delay` after its task finishes, which
//! spaces out calls to the remote API. [`run_stage`] returns only when every
//! task has finished, so the next stage always sees the complete output of
//! this one. The first fatal error aborts the remaining tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use wisdom_shared::{Result, WisdomError};

/// Concurrency and pacing of one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Tasks in flight; zero is treated as one.
    pub concurrency: usize,
    /// Pause after each task before its slot is released.
    pub delay: Duration,
}

impl StageOptions {
    pub fn new(concurrency: u32, delay_ms: u64) -> Self {
        Self {
            concurrency: concurrency as usize,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Run `task` over `items` and wait for the stage to drain.
///
/// Results are returned in completion order.
pub async fn run_stage<I, T, F, Fut>(
    stage: &str,
    items: Vec<I>,
    opts: StageOptions,
    task: F,
) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let total = items.len();
    info!(stage, total, concurrency = opts.concurrency.max(1), "stage started");

    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let task = Arc::new(task);
    let mut set = JoinSet::new();

    for item in items {
        let semaphore = semaphore.clone();
        let task = task.clone();
        let delay = opts.delay;
        let stage_name = stage.to_string();

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| WisdomError::Task {
                stage: stage_name,
                message: e.to_string(),
            })?;

            let result = task(item).await;

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(value)) => {
                results.push(value);
                debug!(stage, done = results.len(), total, "task finished");
            }
            Ok(Err(e)) => {
                set.abort_all();
                return Err(e);
            }
            Err(e) => {
                set.abort_all();
                return Err(WisdomError::Task {
                    stage: stage.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(stage, completed = results.len(), "stage drained");
    Ok(results)
}
