//! Bounded page-fetch pool with per-request timeouts, in-flight coalescing
//! and a short-lived result cache keyed by URL.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

type PoolResult<T> = Result<T, String>;
type InFlight<T> = Shared<BoxFuture<'static, PoolResult<T>>>;

struct PoolState<T> {
    in_flight: HashMap<String, InFlight<T>>,
    results: HashMap<String, (Instant, T)>,
}

pub struct FetchPool<T> {
    workers: usize,
    request_timeout: Duration,
    result_ttl: Duration,
    permits: Arc<Semaphore>,
    state: Arc<Mutex<PoolState<T>>>,
}

impl<T> FetchPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(workers: usize, request_timeout: Duration, result_ttl: Duration) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            request_timeout,
            result_ttl,
            permits: Arc::new(Semaphore::new(workers)),
            state: Arc::new(Mutex::new(PoolState {
                in_flight: HashMap::new(),
                results: HashMap::new(),
            })),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState<T>> {
        // a poisoned map only ever holds complete entries
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetches one URL. Concurrent calls for the same URL share one upstream
    /// request; successful results are reused until `result_ttl` elapses.
    /// Failures and timeouts are never cached.
    pub async fn fetch<F, Fut>(&self, url: &str, fetcher: F) -> PoolResult<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = {
            let mut state = self.lock();

            if let Some((stored_at, value)) = state.results.get(url) {
                if stored_at.elapsed() < self.result_ttl {
                    return Ok(value.clone());
                }
                state.results.remove(url);
            }

            match state.in_flight.get(url) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = self.start(url.to_string(), fetcher(url.to_string()));
                    state.in_flight.insert(url.to_string(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        let mut state = self.lock();
        if state
            .in_flight
            .get(url)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            state.in_flight.remove(url);
            if let Ok(value) = &result {
                if !self.result_ttl.is_zero() {
                    let ttl = self.result_ttl;
                    state.results.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
                    state.results.insert(url.to_string(), (Instant::now(), value.clone()));
                }
            }
        }

        result
    }

    fn start<Fut>(&self, url: String, request: Fut) -> InFlight<T>
    where
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let permits = self.permits.clone();
        let timeout = self.request_timeout;

        async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| "fetch pool is closed".to_string())?;

            match tokio::time::timeout(timeout, request).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(format!("{:#}", err)),
                Err(_) => {
                    tracing::warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "Pool fetch timed out");
                    Err(format!("timed out after {} ms", timeout.as_millis()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Fetches every URL through the pool, at most `workers` at a time.
    /// Results come back in completion order, paired with their URL.
    pub async fn fetch_all<F, Fut>(&self, urls: Vec<String>, fetcher: F) -> Vec<(String, PoolResult<T>)>
    where
        F: Fn(String) -> Fut + Clone,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        stream::iter(urls)
            .map(|url| {
                let fetcher = fetcher.clone();
                async move {
                    let result = self.fetch(&url, fetcher).await;
                    (url, result)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await
    }

    #[cfg(test)]
    fn cached_results(&self) -> usize {
        self.lock().results.len()
    }
}
