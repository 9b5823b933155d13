use crate::{
    cache::ResolveCache,
    error::{LinkError, Result},
    metrics::Metrics,
    models::Link,
    shortid::IdGenerator,
    store::LinkStore,
};
use std::{sync::Arc, time::Instant};

/// Default bound on id draws per `cut_link` call. With 52^6 ids a second
/// draw is already rare.
pub const DEFAULT_MAX_GENERATION_ATTEMPTS: usize = 64;

/// Link lifecycle operations: cutting, resolving, listing and deleting.
///
/// Owner-scoped operations take the caller's authenticated account id as an
/// explicit argument; the service never looks it up on its own.
pub struct LinkService {
    store: Arc<dyn LinkStore>,
    ids: IdGenerator,
    cache: ResolveCache,
    max_attempts: usize,
    metrics: Option<Arc<Metrics>>,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self::with_generator(store, IdGenerator::new())
    }

    pub fn with_generator(store: Arc<dyn LinkStore>, ids: IdGenerator) -> Self {
        Self {
            store,
            ids,
            cache: ResolveCache::new(),
            max_attempts: DEFAULT_MAX_GENERATION_ATTEMPTS,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> Arc<dyn LinkStore> {
        self.store.clone()
    }

    /// Store `target_url` under a newly generated short id and return the id.
    ///
    /// Collisions, whether seen by the `exists` probe or reported by the
    /// store as `AlreadyExists`, are retried with a fresh candidate.
    pub async fn cut_link(&self, target_url: &str, owner_id: Option<&str>) -> Result<String> {
        let start = Instant::now();
        let result = self.cut_link_inner(target_url, owner_id).await;
        log_call("cut_link", &result, start);
        result
    }

    async fn cut_link_inner(&self, target_url: &str, owner_id: Option<&str>) -> Result<String> {
        for _ in 0..self.max_attempts {
            let candidate = self.ids.generate_candidate();
            if self.store.exists(&candidate).await? {
                tracing::debug!("short id {} taken, drawing again", candidate);
                continue;
            }

            let link = Link::new(candidate, target_url, owner_id.map(str::to_owned));
            match self.store.store(link).await {
                Ok(link) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.links_cut.inc();
                    }
                    return Ok(link.short_id);
                }
                Err(LinkError::AlreadyExists) => {
                    tracing::debug!("short id claimed concurrently, drawing again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LinkError::GenerationExhausted(self.max_attempts))
    }

    /// Target URL for `short_id`.
    ///
    /// Cache misses are filled from the store, unless a delete landed while
    /// the store read was in flight.
    pub async fn resolve(&self, short_id: &str) -> Result<String> {
        let start = Instant::now();
        let (result, source) = match self.cache.get(short_id) {
            Some(url) => (Ok(url), "cache_hit"),
            None => {
                let epoch = self.cache.epoch();
                match self.store.get(short_id).await {
                    Ok(link) => {
                        self.cache.backfill(&link.short_id, &link.target_url, epoch);
                        (Ok(link.target_url), "store_hit")
                    }
                    Err(LinkError::NotFound) => (Err(LinkError::NotFound), "not_found"),
                    Err(e) => (Err(e), "error"),
                }
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.resolves.with_label_values(&[source]).inc();
        }
        log_call("resolve", &result, start);
        result
    }

    /// Full record for `short_id`, including its health status.
    pub async fn get(&self, short_id: &str) -> Result<Link> {
        self.store.get(short_id).await
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Link>> {
        let start = Instant::now();
        let result = self.store.list_by_owner(owner_id).await;
        log_call("list_by_owner", &result, start);
        result
    }

    /// Delete `short_id` on behalf of `requester_id`.
    ///
    /// Fails with `NotFound` for unknown ids and `AccessDenied` unless the
    /// requester owns the link. Anonymous links cannot be deleted.
    pub async fn delete_link(&self, short_id: &str, requester_id: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.store.delete(short_id, requester_id).await;
        if result.is_ok() {
            self.cache.evict(short_id);
            if let Some(metrics) = &self.metrics {
                metrics.links_deleted.inc();
            }
        }
        log_call("delete_link", &result, start);
        result
    }
}

fn log_call<T>(method: &str, result: &Result<T>, start: Instant) {
    match result {
        Ok(_) => tracing::debug!(method, elapsed = ?start.elapsed(), "ok"),
        Err(LinkError::Storage(e)) => {
            tracing::error!(method, elapsed = ?start.elapsed(), "storage failure: {}", e)
        }
        Err(e) => tracing::debug!(method, elapsed = ?start.elapsed(), "{}", e),
    }
}
