use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Reconciliation counters shared by every controller of a process.
///
/// - `agentrun_reconcile_total{controller, result}`
/// - `agentrun_reconcile_duration_seconds{controller}`
#[derive(Clone)]
pub struct ControllerMetrics {
    reconcile_total: IntCounterVec,
    reconcile_duration: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let reconcile_total = IntCounterVec::new(
            Opts::new("agentrun_reconcile_total", "Reconciliations by outcome"),
            &["controller", "result"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "agentrun_reconcile_duration_seconds",
                "Time spent in a single reconciliation",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
            &["controller"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_duration,
        })
    }

    /// Metrics bound to a private registry.
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        Self::new(&Registry::new())
    }

    pub fn observe(&self, controller: &str, result: &str, elapsed: Duration) {
        self.reconcile_total
            .with_label_values(&[controller, result])
            .inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    pub fn count(&self, controller: &str, result: &str) -> u64 {
        self.reconcile_total
            .with_label_values(&[controller, result])
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_counts_per_result() {
        let registry = Registry::new();
        let m = ControllerMetrics::new(&registry).unwrap();
        m.observe("task", "ok", Duration::from_millis(3));
        m.observe("task", "ok", Duration::from_millis(4));
        m.observe("task", "error", Duration::from_millis(1));

        assert_eq!(m.count("task", "ok"), 2);
        assert_eq!(m.count("task", "error"), 1);

        assert_eq!(registry.gather().len(), 2);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        ControllerMetrics::new(&registry).unwrap();
        assert!(ControllerMetrics::new(&registry).is_err());
    }
}
