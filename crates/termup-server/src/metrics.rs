//! ---
//! termup_section: "04-update-service"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Prometheus counters for the update service."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters recorded by the publish and query handlers.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Arc<Registry>,
    publishes_total: IntCounter,
    publish_failures_total: IntCounterVec,
    update_checks_total: IntCounterVec,
    downloads_total: IntCounterVec,
}

impl ServiceMetrics {
    /// Register the service counters in `registry`.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let publishes_total = IntCounter::with_opts(Opts::new(
            "termup_publishes_total",
            "Updates published successfully",
        ))?;
        registry.register(Box::new(publishes_total.clone()))?;

        let publish_failures_total = IntCounterVec::new(
            Opts::new(
                "termup_publish_failures_total",
                "Failed publish attempts by stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(publish_failures_total.clone()))?;

        let update_checks_total = IntCounterVec::new(
            Opts::new("termup_update_checks_total", "Update checks by result"),
            &["result"],
        )?;
        registry.register(Box::new(update_checks_total.clone()))?;

        let downloads_total = IntCounterVec::new(
            Opts::new("termup_downloads_total", "Artifact downloads by result"),
            &["result"],
        )?;
        registry.register(Box::new(downloads_total.clone()))?;

        Ok(Self {
            registry,
            publishes_total,
            publish_failures_total,
            update_checks_total,
            downloads_total,
        })
    }

    /// Record a successful publish.
    pub fn record_publish(&self) {
        self.publishes_total.inc();
    }

    /// Record a failed publish at `stage`.
    pub fn record_publish_failure(&self, stage: &str) {
        self.publish_failures_total.with_label_values(&[stage]).inc();
    }

    /// Record an update check with `result` (`update`, `current`, `no_manifest`, `error`).
    pub fn record_check(&self, result: &str) {
        self.update_checks_total.with_label_values(&[result]).inc();
    }

    /// Record an artifact download with `result` (`served`, `missing`, `error`).
    pub fn record_download(&self, result: &str) {
        self.downloads_total.with_label_values(&[result]).inc();
    }

    /// Text exposition of every metric in the registry.
    pub fn encode(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let body = String::from_utf8(buffer)
            .map_err(|err| prometheus::Error::Msg(format!("metrics are not utf-8: {err}")))?;
        Ok((encoder.format_type().to_owned(), body))
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}
