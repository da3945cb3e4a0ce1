//! Prometheus metrics for the capabilities core, grounded on
//! `mempool::MempoolMetrics`'s registration pattern: every gauge/counter is
//! created once and registered into a caller-supplied [`Registry`], rather
//! than relying on a process-global default registry.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Clone)]
pub struct CapMetrics {
    pub enqueue_total: IntCounterVec,
    pub enqueue_rejected: IntCounterVec,
    pub result_reads: IntCounterVec,
    pub zk_verify_total: IntCounterVec,
    pub zk_verify_latency: Histogram,
    pub blob_bytes_in: IntCounterVec,
    pub blob_bytes_out: IntCounterVec,
    pub queue_depth: IntGauge,
    pub inflight_jobs: IntGauge,
    pub treasury_notes: IntCounterVec,
}

impl CapMetrics {
    /// Builds every metric and registers it into `registry`. Returns an
    /// error if a metric with the same name is already registered, the
    /// same failure mode `MempoolMetrics::new` surfaces.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let enqueue_total = IntCounterVec::new(
            Opts::new(
                "cap_enqueue_total",
                "Jobs accepted into the queue, by job kind",
            ),
            &["kind"],
        )?;
        let enqueue_rejected = IntCounterVec::new(
            Opts::new(
                "cap_enqueue_rejected_total",
                "Jobs rejected at enqueue time, by job kind and reason code",
            ),
            &["kind", "reason"],
        )?;
        let result_reads = IntCounterVec::new(
            Opts::new(
                "cap_result_reads_total",
                "result.read calls, by outcome (ready, pending, not_yet)",
            ),
            &["outcome"],
        )?;
        let zk_verify_total = IntCounterVec::new(
            Opts::new(
                "cap_zk_verify_total",
                "zk.verify calls, by verdict (ok, rejected, no_adapter)",
            ),
            &["verdict"],
        )?;
        let zk_verify_latency = Histogram::with_opts(HistogramOpts::new(
            "cap_zk_verify_latency_seconds",
            "zk.verify call latency in seconds",
        ))?;
        let blob_bytes_in = IntCounterVec::new(
            Opts::new("cap_blob_bytes_in_total", "Bytes pinned via blob.pin"),
            &["caller"],
        )?;
        let blob_bytes_out = IntCounterVec::new(
            Opts::new("cap_blob_bytes_out_total", "Bytes read back via blob reads"),
            &["caller"],
        )?;
        let queue_depth = IntGauge::new("cap_queue_depth", "Current queued (not yet leased) jobs")?;
        let inflight_jobs = IntGauge::new(
            "cap_inflight_jobs",
            "Jobs leased but not yet completed or failed",
        )?;
        let treasury_notes = IntCounterVec::new(
            Opts::new(
                "cap_treasury_notes_total",
                "Treasury debit/credit notes recorded, by kind",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(enqueue_total.clone()))?;
        registry.register(Box::new(enqueue_rejected.clone()))?;
        registry.register(Box::new(result_reads.clone()))?;
        registry.register(Box::new(zk_verify_total.clone()))?;
        registry.register(Box::new(zk_verify_latency.clone()))?;
        registry.register(Box::new(blob_bytes_in.clone()))?;
        registry.register(Box::new(blob_bytes_out.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(inflight_jobs.clone()))?;
        registry.register(Box::new(treasury_notes.clone()))?;

        Ok(Self {
            enqueue_total,
            enqueue_rejected,
            result_reads,
            zk_verify_total,
            zk_verify_latency,
            blob_bytes_in,
            blob_bytes_out,
            queue_depth,
            inflight_jobs,
            treasury_notes,
        })
    }

    pub fn record_enqueue(&self, kind: &str) {
        self.enqueue_total.with_label_values(&[kind]).inc();
    }

    pub fn record_enqueue_rejected(&self, kind: &str, reason: &str) {
        self.enqueue_rejected
            .with_label_values(&[kind, reason])
            .inc();
    }

    pub fn record_result_read(&self, outcome: &str) {
        self.result_reads.with_label_values(&[outcome]).inc();
    }

    pub fn record_zk_verify(&self, verdict: &str, latency_secs: f64) {
        self.zk_verify_total.with_label_values(&[verdict]).inc();
        self.zk_verify_latency.observe(latency_secs);
    }

    pub fn record_blob_in(&self, caller: &str, bytes: u64) {
        self.blob_bytes_in
            .with_label_values(&[caller])
            .inc_by(bytes);
    }

    pub fn record_blob_out(&self, caller: &str, bytes: u64) {
        self.blob_bytes_out
            .with_label_values(&[caller])
            .inc_by(bytes);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth);
    }

    pub fn set_inflight_jobs(&self, count: i64) {
        self.inflight_jobs.set(count);
    }

    pub fn record_treasury_note(&self, kind: &str) {
        self.treasury_notes.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_name_collisions() {
        let registry = Registry::new();
        let metrics = CapMetrics::new(&registry).expect("metrics should register cleanly");
        metrics.record_enqueue("ai");
        metrics.record_enqueue_rejected("quantum", "LIMIT_EXCEEDED");
        metrics.record_result_read("ready");
        metrics.record_zk_verify("ok", 0.01);
        metrics.set_queue_depth(5);
        metrics.set_inflight_jobs(2);

        let families = registry.gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn double_registration_fails_like_the_teacher_pattern() {
        let registry = Registry::new();
        let _first = CapMetrics::new(&registry).unwrap();
        let second = CapMetrics::new(&registry);
        assert!(second.is_err());
    }
}
