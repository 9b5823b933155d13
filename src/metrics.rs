//! Prometheus counters for link operations and the health checker.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Application metrics, each instance with its own registry.
pub struct Metrics {
    registry: Registry,

    // ===== Link service =====
    /// Links created
    pub links_cut: IntCounter,
    /// Resolve calls by result (`cache_hit`, `store_hit`, `not_found`, `error`)
    pub resolves: IntCounterVec,
    /// Successful deletes
    pub links_deleted: IntCounter,

    // ===== Health checker =====
    /// Links handed to the worker queue
    pub links_queued: IntCounter,
    /// Probes performed
    pub probes: IntCounter,
    /// Status transitions by new status
    pub status_changes: IntCounterVec,
    /// Status writes that failed
    pub status_write_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let links_cut = IntCounter::new("linkcut_links_cut_total", "Total links created")?;
        let resolves = IntCounterVec::new(
            Opts::new("linkcut_resolves_total", "Total resolve calls by result"),
            &["result"],
        )?;
        let links_deleted =
            IntCounter::new("linkcut_links_deleted_total", "Total links deleted")?;

        let links_queued = IntCounter::new(
            "linkcut_health_links_queued_total",
            "Total links handed to health check workers",
        )?;
        let probes = IntCounter::new("linkcut_health_probes_total", "Total link probes")?;
        let status_changes = IntCounterVec::new(
            Opts::new(
                "linkcut_health_status_changes_total",
                "Total link status changes by new status",
            ),
            &["status"],
        )?;
        let status_write_failures = IntCounter::new(
            "linkcut_health_status_write_failures_total",
            "Total failed link status writes",
        )?;

        registry.register(Box::new(links_cut.clone()))?;
        registry.register(Box::new(resolves.clone()))?;
        registry.register(Box::new(links_deleted.clone()))?;
        registry.register(Box::new(links_queued.clone()))?;
        registry.register(Box::new(probes.clone()))?;
        registry.register(Box::new(status_changes.clone()))?;
        registry.register(Box::new(status_write_failures.clone()))?;

        Ok(Self {
            registry,
            links_cut,
            resolves,
            links_deleted,
            links_queued,
            probes,
            status_changes,
            status_write_failures,
        })
    }

    /// Export in Prometheus text format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
