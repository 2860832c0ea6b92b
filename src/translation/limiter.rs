use std::future::Future;
use std::num::NonZeroUsize;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::debug;

/// Caps the number of capability calls in flight.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    permits: Semaphore,
    limit: NonZeroUsize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            permits: Semaphore::new(limit.get()),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Drive `call` over every job with at most `limit` calls outstanding.
    ///
    /// Completion order is arbitrary; the returned vector is in job order.
    pub async fn run_ordered<J, T, F, Fut>(&self, label: &str, jobs: Vec<J>, call: F) -> Vec<T>
    where
        F: Fn(J) -> Fut,
        Fut: Future<Output = T>,
    {
        let total = jobs.len();
        let mut futs: FuturesUnordered<_> = FuturesUnordered::new();
        for (idx, job) in jobs.into_iter().enumerate() {
            let fut = call(job);
            let permits = &self.permits;
            futs.push(async move {
                // the semaphore is never closed, so acquire cannot fail
                let _permit = permits.acquire().await.ok();
                (idx, fut.await)
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some((idx, out)) = futs.next().await {
            done += 1;
            debug!(stage = label, job = idx, done, total, "call finished");
            slots[idx] = Some(out);
        }
        slots.into_iter().flatten().collect()
    }
}
