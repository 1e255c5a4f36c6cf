//! Bounded worker pool with fail-fast semantics
//!
//! Items are dispatched in order onto at most `workers` concurrent tasks. The
//! first error stops further dispatch; tasks already running finish, then the
//! first error is returned.

use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::types::TransferDirection;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Files and bytes moved by a pool, shared by every worker
#[derive(Debug, Default)]
pub struct TransferCounters {
    files: AtomicU64,
    bytes: AtomicU64,
}

impl TransferCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed transfer of `bytes`
    pub fn record(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Single-assignment error cell; the first recorded error wins
#[derive(Debug, Default)]
struct FailFast {
    tripped: AtomicBool,
    first: Mutex<Option<Error>>,
}

impl FailFast {
    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    fn record(&self, error: Error) {
        if self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Ok(mut slot) = self.first.lock() {
                *slot = Some(error);
            }
        } else {
            tracing::debug!(error = %error, "Additional transfer failure after fail-fast");
        }
    }

    fn take(&self) -> Option<Error> {
        self.first.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// How a pool reports what it is doing
#[derive(Clone)]
pub struct PoolOptions {
    /// Upper bound on concurrent workers
    pub workers: usize,
    /// Progress is reported only when the batch has more items than this
    pub progress_threshold: usize,
    pub direction: TransferDirection,
    pub progress: Arc<dyn ProgressSink>,
}

/// Run `task` over every item with bounded concurrency
///
/// `task` returns the number of bytes it moved; successful items are counted
/// into `counters`. Items that were never dispatched when the first failure
/// happened are not attempted.
pub async fn run_pool<T, F, Fut>(
    items: Vec<T>,
    options: &PoolOptions,
    counters: Arc<TransferCounters>,
    task: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(());
    }

    let workers = options.workers.max(1).min(total);
    let report = total > options.progress_threshold;
    let semaphore = Arc::new(Semaphore::new(workers));
    let failure = Arc::new(FailFast::default());
    // Held while notifying so completed counts reach the sink in order
    let completed = Arc::new(Mutex::new(0usize));
    let task = Arc::new(task);
    let mut set = JoinSet::new();

    tracing::debug!(direction = ?options.direction, total, workers, "Dispatching transfers");

    for item in items {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        if failure.is_tripped() {
            break;
        }

        let failure = failure.clone();
        let completed = completed.clone();
        let counters = counters.clone();
        let task = task.clone();
        let sink = options.progress.clone();
        let direction = options.direction;

        set.spawn(async move {
            // Released when this task ends, after any failure is recorded
            let _permit = permit;
            if failure.is_tripped() {
                return;
            }

            match (*task)(item).await {
                Ok(bytes) => {
                    counters.record(bytes);
                    if report {
                        if let Ok(mut done) = completed.lock() {
                            *done += 1;
                            sink.progressed(direction, *done, total);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(direction = ?direction, error = %e, "Transfer failed");
                    failure.record(e);
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            failure.record(Error::transfer("worker", e.to_string()));
        }
    }

    if let Some(e) = failure.take() {
        return Err(e);
    }

    if report {
        options.progress.finished(options.direction, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelSink, NoopSink, ProgressEvent};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn options(progress: Arc<dyn ProgressSink>) -> PoolOptions {
        PoolOptions {
            workers: 4,
            progress_threshold: 32,
            direction: TransferDirection::Upload,
            progress,
        }
    }

    #[tokio::test]
    async fn test_counts_every_item() {
        let counters = Arc::new(TransferCounters::new());
        let result = run_pool((1..=10u64).collect(), &options(Arc::new(NoopSink)), counters.clone(), |n| async move {
            Ok(n)
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(counters.files(), 10);
        assert_eq!(counters.bytes(), 55);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let counters = Arc::new(TransferCounters::new());
        let result = run_pool(Vec::<u64>::new(), &options(Arc::new(NoopSink)), counters.clone(), |_| async move {
            Ok(0)
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(counters.files(), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let counters = Arc::new(TransferCounters::new());

        let (c, f) = (calls.clone(), finished.clone());
        let result = run_pool((0..5usize).collect(), &options(Arc::new(NoopSink)), counters.clone(), move |i| {
            let (c, f) = (c.clone(), f.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    return Err(Error::transfer("b.txt", "put failed"));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Transfer { .. })));
        // Four workers took items 0..=3; item 4 was never dispatched
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // In-flight items still ran to completion
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(counters.files(), 3);
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let counters = Arc::new(TransferCounters::new());
        let result = run_pool((0..4usize).collect(), &options(Arc::new(NoopSink)), counters, |i| async move {
            tokio::time::sleep(Duration::from_millis(10 * i as u64)).await;
            Err::<u64, _>(Error::remote(i as i64, "boom"))
        })
        .await;

        assert!(matches!(result, Err(Error::Remote { code: 0, .. })));
    }

    #[tokio::test]
    async fn test_progress_above_threshold() {
        let (sink, mut rx) = ChannelSink::channel();
        let counters = Arc::new(TransferCounters::new());
        run_pool((0..40usize).collect(), &options(Arc::new(sink)), counters, |_| async move { Ok(1) })
            .await
            .unwrap();

        let mut last = 0;
        for _ in 0..40 {
            match rx.recv().await {
                Some(ProgressEvent::Progressed { done, total, .. }) => {
                    assert_eq!(total, 40);
                    assert!(done > last);
                    last = done;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(last, 40);
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Finished {
                direction: TransferDirection::Upload,
                total: 40
            })
        );
    }

    #[tokio::test]
    async fn test_no_progress_below_threshold() {
        let (sink, mut rx) = ChannelSink::channel();
        let counters = Arc::new(TransferCounters::new());
        run_pool((0..32usize).collect(), &options(Arc::new(sink)), counters, |_| async move { Ok(1) })
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }
}
