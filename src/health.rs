use crate::{
    error::{LinkError, Result},
    metrics::Metrics,
    models::{Link, LinkStatus},
    probe::{HttpProbe, ProbeError},
    store::LinkStore,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

// ── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Number of concurrent probing workers. Also the queue capacity.
    pub worker_count: usize,
    /// Pause between two discovery cycles.
    pub discovery_interval: Duration,
    /// Deadline for a single probe.
    pub probe_timeout: Duration,
    /// Only check links that belong to an account.
    pub owned_only: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            discovery_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            owned_only: true,
        }
    }
}

// ── Reports ────────────────────────────────────────────────────────────────

/// Counters for one or more processed links.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub probed: usize,
    pub changed: usize,
    pub failed_writes: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.probed += other.probed;
        self.changed += other.changed;
        self.failed_writes += other.failed_writes;
    }
}

/// Map a probe outcome to a link status.
///
/// Only an explicit 404 marks a link as failed. Any other status code, and
/// any transport error or timeout, counts as reachable.
pub fn classify(outcome: &std::result::Result<u16, ProbeError>) -> LinkStatus {
    match outcome {
        Ok(404) => LinkStatus::Failed,
        Ok(_) | Err(_) => LinkStatus::Ok,
    }
}

// ── Pipeline ───────────────────────────────────────────────────────────────

/// Background link health checker.
///
/// A discovery task lists links every `discovery_interval` and pushes them
/// onto a queue bounded at `worker_count`, so discovery waits whenever the
/// workers fall behind. Each worker probes one link at a time and writes the
/// resulting status back. Errors are logged and never stop the loop.
pub struct HealthChecker {
    store: Arc<dyn LinkStore>,
    probe: Arc<dyn HttpProbe>,
    config: HealthCheckConfig,
    metrics: Option<Arc<Metrics>>,
}

/// Running pipeline returned by [`HealthChecker::spawn`].
pub struct HealthCheckHandle {
    discovery: JoinHandle<()>,
    workers: Vec<JoinHandle<CycleReport>>,
}

impl HealthCheckHandle {
    /// Wait for discovery to stop and the workers to drain the queue.
    /// Returns totals over the lifetime of the pipeline.
    pub async fn join(self) -> CycleReport {
        if let Err(e) = self.discovery.await {
            tracing::error!("health check discovery task failed: {}", e);
        }
        collect(self.workers).await
    }
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn LinkStore>,
        probe: Arc<dyn HttpProbe>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            store,
            probe,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start discovery and the worker pool.
    ///
    /// Runs until `shutdown` flips to `true` (or its sender is dropped).
    /// Discovery notices at its sleep and while blocked on a full queue;
    /// workers then finish whatever is queued and exit.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> HealthCheckHandle {
        let (tx, rx) = mpsc::channel(self.queue_capacity());
        let workers = self.spawn_workers(rx);

        tracing::info!(
            "Health checker started: {} worker(s), every {:?}",
            workers.len(),
            self.config.discovery_interval
        );

        let discovery = tokio::spawn(discovery_loop(self, tx, shutdown));
        HealthCheckHandle { discovery, workers }
    }

    /// Run exactly one discovery cycle and wait until every discovered link
    /// has been probed and written back.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let links = self.discover().await?;

        let (tx, rx) = mpsc::channel(self.queue_capacity());
        let workers = self.spawn_workers(rx);
        for link in links {
            if tx.send(link).await.is_err() {
                break;
            }
            self.record_queued();
        }
        drop(tx);

        Ok(collect(workers).await)
    }

    fn record_queued(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.links_queued.inc();
        }
    }

    fn queue_capacity(&self) -> usize {
        self.config.worker_count.max(1)
    }

    fn spawn_workers(&self, rx: mpsc::Receiver<Link>) -> Vec<JoinHandle<CycleReport>> {
        let queue = Arc::new(Mutex::new(rx));
        (0..self.queue_capacity())
            .map(|id| {
                tokio::spawn(work(
                    id,
                    self.store.clone(),
                    self.probe.clone(),
                    self.metrics.clone(),
                    queue.clone(),
                ))
            })
            .collect()
    }

    /// Links due for a check in this cycle.
    async fn discover(&self) -> Result<Vec<Link>> {
        let mut links = self.store.list_all().await?;
        if self.config.owned_only {
            links.retain(|link| link.owner_id.is_some());
        }
        Ok(links)
    }
}

async fn discovery_loop(
    checker: HealthChecker,
    tx: mpsc::Sender<Link>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match checker.discover().await {
            Ok(links) => {
                tracing::debug!("Discovery cycle queued {} link(s)", links.len());
                for link in links {
                    tokio::select! {
                        sent = tx.send(link) => {
                            if sent.is_err() {
                                tracing::warn!("Health check workers are gone, stopping discovery");
                                return;
                            }
                            checker.record_queued();
                        }
                        _ = shutdown.changed() => return,
                    }
                }
            }
            Err(e) => tracing::error!("Health check discovery failed: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(checker.config.discovery_interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("Health check discovery stopped");
}

async fn work(
    id: usize,
    store: Arc<dyn LinkStore>,
    probe: Arc<dyn HttpProbe>,
    metrics: Option<Arc<Metrics>>,
    queue: Arc<Mutex<mpsc::Receiver<Link>>>,
) -> CycleReport {
    let mut report = CycleReport::default();

    loop {
        // Holding the lock while waiting means one idle worker listens and
        // the rest queue up behind it.
        let next = queue.lock().await.recv().await;
        let Some(link) = next else { break };
        let checked = check_link(store.as_ref(), probe.as_ref(), metrics.as_deref(), link).await;
        report.merge(checked);
    }

    tracing::debug!("Health check worker {} finished", id);
    report
}

async fn check_link(
    store: &dyn LinkStore,
    probe: &dyn HttpProbe,
    metrics: Option<&Metrics>,
    link: Link,
) -> CycleReport {
    let mut report = CycleReport {
        probed: 1,
        ..CycleReport::default()
    };

    let outcome = probe.probe(&link.target_url).await;
    if let Some(metrics) = metrics {
        metrics.probes.inc();
    }
    if let Err(e) = &outcome {
        tracing::debug!("Probe of {} ({}) failed: {}", link.short_id, link.target_url, e);
    }
    let status = classify(&outcome);

    match store.update_status(&link.short_id, status).await {
        Ok(()) => {}
        Err(LinkError::NotFound) => {
            tracing::debug!("Link {} deleted before its status was written", link.short_id);
            return report;
        }
        Err(e) => {
            tracing::warn!("Failed to write status for {}: {}", link.short_id, e);
            if let Some(metrics) = metrics {
                metrics.status_write_failures.inc();
            }
            report.failed_writes = 1;
            return report;
        }
    }

    if link.status != status {
        tracing::info!(
            "{} status changed from {} to {}",
            link.short_id,
            link.status,
            status
        );
        if let Some(metrics) = metrics {
            metrics
                .status_changes
                .with_label_values(&[status.to_string().as_str()])
                .inc();
        }
        report.changed = 1;
    }
    report
}

async fn collect(workers: Vec<JoinHandle<CycleReport>>) -> CycleReport {
    let mut total = CycleReport::default();
    for worker in workers {
        match worker.await {
            Ok(report) => total.merge(report),
            Err(e) => tracing::error!("Health check worker failed: {}", e),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLinkStore;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tokio::sync::Semaphore;

    /// Answers from a fixed table; unknown URLs behave like unreachable hosts.
    #[derive(Default)]
    struct FakeProbe {
        codes: HashMap<String, u16>,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn with(mut self, url: &str, code: u16) -> Self {
            self.codes.insert(url.to_owned(), code);
            self
        }
    }

    #[async_trait]
    impl HttpProbe for FakeProbe {
        async fn probe(&self, url: &str) -> std::result::Result<u16, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.codes
                .get(url)
                .copied()
                .ok_or_else(|| ProbeError::Transport("connection refused".into()))
        }
    }

    async fn seeded(links: &[(&str, &str, Option<&str>)]) -> Arc<MemoryLinkStore> {
        let store = Arc::new(MemoryLinkStore::new());
        for (id, url, owner) in links {
            store
                .store(Link::new(*id, *url, owner.map(str::to_owned)))
                .await
                .unwrap();
        }
        store
    }

    fn checker(store: Arc<MemoryLinkStore>, probe: Arc<FakeProbe>) -> HealthChecker {
        HealthChecker::new(store, probe, HealthCheckConfig::default())
    }

    #[test]
    fn only_404_is_a_failure() {
        assert_eq!(classify(&Ok(404)), LinkStatus::Failed);
        assert_eq!(classify(&Ok(200)), LinkStatus::Ok);
        assert_eq!(classify(&Ok(500)), LinkStatus::Ok);
        assert_eq!(classify(&Err(ProbeError::Timeout)), LinkStatus::Ok);
    }

    #[tokio::test]
    async fn one_cycle_writes_statuses() {
        let store = seeded(&[
            ("gone00", "http://t/missing", Some("1")),
            ("alive0", "http://t/ok", Some("1")),
        ])
        .await;
        let probe = Arc::new(
            FakeProbe::default()
                .with("http://t/missing", 404)
                .with("http://t/ok", 200),
        );

        let report = checker(store.clone(), probe).run_once().await.unwrap();

        assert_eq!(report.probed, 2);
        assert_eq!(report.changed, 2);
        assert_eq!(store.get("gone00").await.unwrap().status, LinkStatus::Failed);
        assert_eq!(store.get("alive0").await.unwrap().status, LinkStatus::Ok);
    }

    #[tokio::test]
    async fn unchanged_status_is_not_reported() {
        let store = seeded(&[("alive0", "http://t/ok", Some("1"))]).await;
        let probe = Arc::new(FakeProbe::default().with("http://t/ok", 200));
        let checker = checker(store.clone(), probe);

        assert_eq!(checker.run_once().await.unwrap().changed, 1);
        let second = checker.run_once().await.unwrap();
        assert_eq!(second.probed, 1);
        assert_eq!(second.changed, 0);
    }

    #[tokio::test]
    async fn transport_errors_count_as_reachable() {
        let store = seeded(&[("down00", "http://unreachable/", Some("1"))]).await;
        let probe = Arc::new(FakeProbe::default());

        checker(store.clone(), probe).run_once().await.unwrap();
        assert_eq!(store.get("down00").await.unwrap().status, LinkStatus::Ok);
    }

    #[tokio::test]
    async fn anonymous_links_are_skipped_when_owned_only() {
        let store = seeded(&[
            ("anon00", "http://t/missing", None),
            ("mine00", "http://t/missing", Some("1")),
        ])
        .await;
        let probe = Arc::new(FakeProbe::default().with("http://t/missing", 404));

        let report = checker(store.clone(), probe.clone()).run_once().await.unwrap();
        assert_eq!(report.probed, 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("anon00").await.unwrap().status, LinkStatus::Unknown);

        let all = HealthChecker::new(
            store.clone(),
            probe,
            HealthCheckConfig {
                owned_only: false,
                ..HealthCheckConfig::default()
            },
        );
        all.run_once().await.unwrap();
        assert_eq!(store.get("anon00").await.unwrap().status, LinkStatus::Failed);
    }

    #[tokio::test]
    async fn more_links_than_workers_are_all_probed() {
        let links: Vec<(String, Option<&str>)> =
            (0..25).map(|i| (format!("id{i:04}"), Some("1"))).collect();
        let store = Arc::new(MemoryLinkStore::new());
        for (id, owner) in &links {
            store
                .store(Link::new(id.clone(), "http://t/ok", owner.map(str::to_owned)))
                .await
                .unwrap();
        }
        let probe = Arc::new(FakeProbe::default().with("http://t/ok", 200));

        let report = checker(store.clone(), probe.clone()).run_once().await.unwrap();
        assert_eq!(report.probed, 25);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 25);
    }

    /// Delegates to a memory store but refuses every status write.
    struct ReadOnlyStore(MemoryLinkStore);

    #[async_trait]
    impl LinkStore for ReadOnlyStore {
        async fn exists(&self, short_id: &str) -> Result<bool> {
            self.0.exists(short_id).await
        }
        async fn store(&self, link: Link) -> Result<Link> {
            self.0.store(link).await
        }
        async fn get(&self, short_id: &str) -> Result<Link> {
            self.0.get(short_id).await
        }
        async fn delete(&self, short_id: &str, owner_id: &str) -> Result<()> {
            self.0.delete(short_id, owner_id).await
        }
        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Link>> {
            self.0.list_by_owner(owner_id).await
        }
        async fn update_status(&self, _short_id: &str, _status: LinkStatus) -> Result<()> {
            Err(LinkError::Storage(sqlx::Error::PoolClosed))
        }
        async fn list_all(&self) -> Result<Vec<Link>> {
            self.0.list_all().await
        }
    }

    #[tokio::test]
    async fn failed_writes_do_not_stop_workers() {
        let inner = MemoryLinkStore::new();
        for i in 0..6 {
            inner
                .store(Link::new(format!("ro{i:04}"), "http://t/ok", Some("1".into())))
                .await
                .unwrap();
        }
        let probe = Arc::new(FakeProbe::default().with("http://t/ok", 200));
        let checker = HealthChecker::new(
            Arc::new(ReadOnlyStore(inner)),
            probe,
            HealthCheckConfig::default(),
        );

        let report = checker.run_once().await.unwrap();
        assert_eq!(report.probed, 6);
        assert_eq!(report.failed_writes, 6);
        assert_eq!(report.changed, 0);
    }

    #[tokio::test]
    async fn cycle_counters_are_exported() {
        let store = seeded(&[
            ("gone00", "http://t/missing", Some("1")),
            ("alive0", "http://t/ok", Some("1")),
        ])
        .await;
        let probe = Arc::new(
            FakeProbe::default()
                .with("http://t/missing", 404)
                .with("http://t/ok", 200),
        );
        let metrics = Arc::new(Metrics::new().unwrap());
        let checker = checker(store, probe).with_metrics(metrics.clone());

        checker.run_once().await.unwrap();
        checker.run_once().await.unwrap();

        assert_eq!(metrics.links_queued.get(), 4);
        assert_eq!(metrics.probes.get(), 4);
        assert_eq!(metrics.status_changes.with_label_values(&["Failed"]).get(), 1);
        assert_eq!(metrics.status_changes.with_label_values(&["OK"]).get(), 1);
        assert_eq!(metrics.status_write_failures.get(), 0);
    }

    #[tokio::test]
    async fn failed_writes_are_exported() {
        let inner = MemoryLinkStore::new();
        inner
            .store(Link::new("ro0000", "http://t/ok", Some("1".into())))
            .await
            .unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let checker = HealthChecker::new(
            Arc::new(ReadOnlyStore(inner)),
            Arc::new(FakeProbe::default().with("http://t/ok", 200)),
            HealthCheckConfig::default(),
        )
        .with_metrics(metrics.clone());

        checker.run_once().await.unwrap();
        assert_eq!(metrics.status_write_failures.get(), 1);
        assert_eq!(metrics.status_changes.with_label_values(&["OK"]).get(), 0);
    }

    /// Holds every request until the test hands out permits.
    struct StalledClient {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpProbe for StalledClient {
        async fn probe(&self, _url: &str) -> std::result::Result<u16, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(200)
        }
    }

    #[tokio::test]
    async fn discovery_waits_when_workers_are_busy() {
        let workers = 2;
        let store = Arc::new(MemoryLinkStore::new());
        for i in 0..10 {
            store
                .store(Link::new(format!("bp{i:04}"), "http://t/ok", Some("1".into())))
                .await
                .unwrap();
        }
        let probe = Arc::new(StalledClient {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let checker = Arc::new(
            HealthChecker::new(
                store,
                probe.clone(),
                HealthCheckConfig {
                    worker_count: workers,
                    ..HealthCheckConfig::default()
                },
            )
            .with_metrics(metrics.clone()),
        );

        let cycle = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.run_once().await })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while probe.calls.load(Ordering::SeqCst) < workers {
            assert!(tokio::time::Instant::now() < deadline, "workers never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Give discovery time to push as far as the queue allows.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), workers);
        let queued = metrics.links_queued.get() as usize;
        assert!(queued <= 2 * workers, "{queued} links handed out with {workers} workers");
        assert!(!cycle.is_finished());

        probe.gate.add_permits(10);
        let report = tokio::time::timeout(Duration::from_secs(5), cycle)
            .await
            .expect("cycle did not finish")
            .unwrap()
            .unwrap();
        assert_eq!(report.probed, 10);
        assert_eq!(metrics.links_queued.get(), 10);
    }

    #[tokio::test]
    async fn spawned_pipeline_checks_and_stops_on_shutdown() {
        let store = seeded(&[("gone00", "http://t/missing", Some("1"))]).await;
        let probe = Arc::new(FakeProbe::default().with("http://t/missing", 404));
        let checker = HealthChecker::new(
            store.clone(),
            probe,
            HealthCheckConfig {
                worker_count: 2,
                discovery_interval: Duration::from_millis(20),
                ..HealthCheckConfig::default()
            },
        );

        let (stop, shutdown) = watch::channel(false);
        let handle = checker.spawn(shutdown);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.get("gone00").await.unwrap().status != LinkStatus::Failed {
            assert!(tokio::time::Instant::now() < deadline, "status never written");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop.send(true).unwrap();
        let totals = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("pipeline did not stop");
        assert!(totals.probed >= 1);
    }
}
