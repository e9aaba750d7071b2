//! Prometheus metrics registry for the due-diligence orchestrator.
//!
//! The registry tracks workflow-phase latency and outcome counts (`DOC_PARSE`,
//! `PREFERENCE_CHECK`, `CROSS_CHECK`, `DD_QUESTIONS`, `HITL_REVIEW`), agent
//! invocation counts, and roundtable meeting activity, alongside a small set
//! of SLO definitions used to evaluate whether the orchestrator is meeting
//! its latency/error-rate targets.
//!
//! Metrics are exported in Prometheus text format via [`MetricsRegistry::export`],
//! which [`crate::metrics_server::serve_metrics`] serves on `/metrics`.

use std::sync::{Arc, OnceLock};

use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Process-wide metrics registry.
///
/// Wraps a `prometheus::Registry` with the counters and histograms the
/// orchestrator records against. Access the process-wide instance via
/// [`MetricsRegistry::global`]; tests that need isolation can construct a
/// private instance with [`MetricsRegistry::new`].
pub struct MetricsRegistry {
    registry: Registry,
    phase_duration_seconds: HistogramVec,
    phase_total: IntCounterVec,
    agent_invocations_total: IntCounterVec,
    roundtable_messages_total: IntCounterVec,
}

impl MetricsRegistry {
    /// Build a fresh registry with the orchestrator's default metric
    /// families registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let phase_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dd_phase_duration_seconds",
                "Wall-clock duration of a due-diligence workflow phase",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["phase"],
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;

        let phase_total = IntCounterVec::new(
            Opts::new(
                "dd_phase_total",
                "Completed due-diligence workflow phases by outcome",
            ),
            &["phase", "outcome"],
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;

        let agent_invocations_total = IntCounterVec::new(
            Opts::new(
                "dd_agent_invocations_total",
                "Analysis agent invocations by agent name and outcome",
            ),
            &["agent", "outcome"],
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;

        let roundtable_messages_total = IntCounterVec::new(
            Opts::new(
                "dd_roundtable_messages_total",
                "Roundtable meeting messages by speaker",
            ),
            &["speaker"],
        )
        .map_err(|e| Error::Metrics(e.to_string()))?;

        registry
            .register(Box::new(phase_duration_seconds.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;
        registry
            .register(Box::new(phase_total.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;
        registry
            .register(Box::new(agent_invocations_total.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;
        registry
            .register(Box::new(roundtable_messages_total.clone()))
            .map_err(|e| Error::Metrics(e.to_string()))?;

        Ok(Self {
            registry,
            phase_duration_seconds,
            phase_total,
            agent_invocations_total,
            roundtable_messages_total,
        })
    }

    /// The process-wide registry, created on first access.
    pub fn global() -> Arc<Self> {
        static INSTANCE: OnceLock<Arc<MetricsRegistry>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                Arc::new(MetricsRegistry::new().expect("default metrics registration is infallible"))
            })
            .clone()
    }

    /// The underlying `prometheus` registry, exposed so other crates can
    /// register their own collectors onto the same process-wide registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed workflow phase.
    pub fn record_phase(&self, phase: &str, outcome: &str, duration_seconds: f64) {
        self.phase_duration_seconds
            .with_label_values(&[phase])
            .observe(duration_seconds);
        self.phase_total.with_label_values(&[phase, outcome]).inc();
    }

    /// Record an analysis agent invocation.
    pub fn record_agent_invocation(&self, agent: &str, outcome: &str) {
        self.agent_invocations_total
            .with_label_values(&[agent, outcome])
            .inc();
    }

    /// Record a roundtable message from `speaker`.
    pub fn record_roundtable_message(&self, speaker: &str) {
        self.roundtable_messages_total
            .with_label_values(&[speaker])
            .inc();
    }

    /// Render all registered metric families as Prometheus text format.
    pub fn export(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| Error::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().expect("default metrics registration is infallible")
    }
}

/// An SLO category tracked against the orchestrator's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SloType {
    /// Bound on a latency metric, e.g. phase duration p95.
    Latency,
    /// Bound on an error/timeout ratio.
    ErrorRate,
    /// Bound on availability (successful sessions / total sessions).
    Availability,
}

/// A named SLO target evaluated against a metric family.
#[derive(Debug, Clone)]
pub struct SloDefinition {
    /// Human-readable SLO name, e.g. `"doc_parse_latency_p95"`.
    pub name: String,
    /// Which metric family this SLO is evaluated against.
    pub metric: String,
    /// Category of bound being enforced.
    pub slo_type: SloType,
    /// The target threshold (seconds for latency, ratio in `[0, 1]` otherwise).
    pub target: f64,
}

/// The orchestrator's default SLO targets.
///
/// Grounded in the phase timeouts enforced by `diligence_core::workflow`
/// (`DOC_PARSE` at 180s, `DD_QUESTIONS` similarly bounded); these SLOs
/// target a p95 well under those hard timeouts so alerts fire before a
/// session actually times out.
pub fn default_slo_definitions() -> Vec<SloDefinition> {
    vec![
        SloDefinition {
            name: "doc_parse_latency_p95".to_string(),
            metric: "dd_phase_duration_seconds".to_string(),
            slo_type: SloType::Latency,
            target: 120.0,
        },
        SloDefinition {
            name: "dd_questions_latency_p95".to_string(),
            metric: "dd_phase_duration_seconds".to_string(),
            slo_type: SloType::Latency,
            target: 60.0,
        },
        SloDefinition {
            name: "phase_error_rate".to_string(),
            metric: "dd_phase_total".to_string(),
            slo_type: SloType::ErrorRate,
            target: 0.02,
        },
        SloDefinition {
            name: "session_availability".to_string(),
            metric: "dd_phase_total".to_string(),
            slo_type: SloType::Availability,
            target: 0.995,
        },
    ]
}

/// Thin handle used by call sites to record metrics against the global
/// registry without threading an `Arc<MetricsRegistry>` through every
/// function signature.
#[derive(Clone)]
pub struct MetricsRecorder {
    registry: Arc<MetricsRegistry>,
}

impl MetricsRecorder {
    /// Build a recorder bound to the process-wide registry.
    pub fn new() -> Self {
        Self {
            registry: MetricsRegistry::global(),
        }
    }

    /// Build a recorder bound to a specific registry (used in tests to
    /// avoid cross-test interference on the global singleton).
    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Record a completed workflow phase.
    pub fn record_phase(&self, phase: &str, outcome: &str, duration_seconds: f64) {
        self.registry.record_phase(phase, outcome, duration_seconds);
    }

    /// Record an analysis agent invocation.
    pub fn record_agent_invocation(&self, agent: &str, outcome: &str) {
        self.registry.record_agent_invocation(agent, outcome);
    }

    /// Record a roundtable message from `speaker`.
    pub fn record_roundtable_message(&self, speaker: &str) {
        self.registry.record_roundtable_message(speaker);
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize the process-wide metrics registry and recorder.
///
/// Idempotent: calling this more than once is harmless, since
/// [`MetricsRegistry::global`] only initializes its `OnceLock` on first
/// access.
pub fn init_default_recorder() -> Result<()> {
    let _ = MetricsRegistry::global();
    Ok(())
}

/// The process-wide metrics registry, initializing it if this is the
/// first call.
pub fn metrics_registry() -> Arc<MetricsRegistry> {
    MetricsRegistry::global()
}

/// Register the orchestrator's default SLO definitions against the global
/// registry. Currently a validation pass (SLO definitions are descriptive
/// metadata consumed by external alerting, not metrics themselves); returns
/// an error if the global registry has not been initialized.
pub fn register_default_metrics() -> Result<Vec<SloDefinition>> {
    let _ = MetricsRegistry::global();
    Ok(default_slo_definitions())
}

/// Export the global registry's metrics in Prometheus text format.
pub fn export_metrics() -> Result<String> {
    MetricsRegistry::global().export()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_exports_empty_families() {
        let registry = MetricsRegistry::new().unwrap();
        let exported = registry.export().unwrap();
        assert!(exported.is_empty() || exported.contains("# HELP"));
    }

    #[test]
    fn recording_a_phase_shows_up_in_export() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_phase("DOC_PARSE", "success", 1.5);
        let exported = registry.export().unwrap();
        assert!(exported.contains("dd_phase_duration_seconds"));
        assert!(exported.contains("dd_phase_total"));
        assert!(exported.contains("DOC_PARSE"));
    }

    #[test]
    fn recording_an_agent_invocation_shows_up_in_export() {
        let registry = MetricsRegistry::new().unwrap();
        registry.record_agent_invocation("tdd_financials", "success");
        let exported = registry.export().unwrap();
        assert!(exported.contains("dd_agent_invocations_total"));
        assert!(exported.contains("tdd_financials"));
    }

    #[test]
    fn recorder_delegates_to_its_bound_registry() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let recorder = MetricsRecorder::with_registry(registry.clone());
        recorder.record_roundtable_message("analyst");
        let exported = registry.export().unwrap();
        assert!(exported.contains("dd_roundtable_messages_total"));
        assert!(exported.contains("analyst"));
    }

    #[test]
    fn default_slos_are_nonempty_and_well_formed() {
        let slos = default_slo_definitions();
        assert!(!slos.is_empty());
        for slo in &slos {
            assert!(!slo.name.is_empty());
            assert!(slo.target > 0.0);
        }
    }

    #[test]
    fn global_registry_is_a_singleton() {
        let a = MetricsRegistry::global();
        let b = MetricsRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn init_default_recorder_is_idempotent() {
        init_default_recorder().unwrap();
        init_default_recorder().unwrap();
    }
}
