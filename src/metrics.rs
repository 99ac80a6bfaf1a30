//! Prometheus metrics for the runner.
//!
//! All metrics follow Prometheus naming conventions:
//! - `e2e_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `namespace`: the handful of namespaces under test
//! - `resource`: Kubernetes kinds touched by the runner
//! - `area`: 3 values (api, k8s, timeout)
//! - `error`: HTTP status names plus a bounded set of check names

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Which part of a check went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorArea {
    /// The API call itself failed
    Api,
    /// The call worked but the cluster state is wrong
    K8s,
    /// A watch ran out of time
    Timeout,
}

impl ErrorArea {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::K8s => "k8s",
            Self::Timeout => "timeout",
        }
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// # Errors
///
/// Returns error if the recorder is already installed or the listener cannot bind.
pub fn init_metrics_recorder(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("e2e_action_duration_seconds".to_string()),
            &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
        )?
        .install()
}

/// Record a failed check.
///
/// Metric: `e2e_errors_total`
/// Labels: `namespace`, `resource`, `area`, `error`
pub fn record_error(namespace: &str, resource: &str, area: ErrorArea, error: &str) {
    counter!("e2e_errors_total",
        "namespace" => namespace.to_string(),
        "resource" => resource.to_string(),
        "area" => area.as_str(),
        "error" => error.to_string()
    )
    .increment(1);
}

/// Record the result of an HTTP request made against the workload.
///
/// Metric: `e2e_http_requests_total`
/// Labels: `namespace`, `resource`, `result`
pub fn record_http(namespace: &str, resource: &str, result: &str) {
    counter!("e2e_http_requests_total",
        "namespace" => namespace.to_string(),
        "resource" => resource.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a completed lifecycle action.
///
/// Metric: `e2e_action_total`, `e2e_action_duration_seconds`
/// Labels: `namespace`, `resource`, `action`
pub fn record_action(namespace: &str, resource: &str, action: &str, duration: Duration) {
    histogram!("e2e_action_duration_seconds",
        "namespace" => namespace.to_string(),
        "resource" => resource.to_string(),
        "action" => action.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("e2e_action_total",
        "namespace" => namespace.to_string(),
        "resource" => resource.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// Times an action and records it when dropped.
#[must_use = "the action is recorded when the timer is dropped"]
pub struct ActionTimer {
    namespace: String,
    resource: String,
    action: &'static str,
    started: Instant,
}

impl ActionTimer {
    pub fn start(namespace: &str, resource: &str, action: &'static str) -> Self {
        Self {
            namespace: namespace.to_string(),
            resource: resource.to_string(),
            action,
            started: Instant::now(),
        }
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        record_action(
            &self.namespace,
            &self.resource,
            self.action,
            self.started.elapsed(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_labels() {
        assert_eq!(ErrorArea::Api.as_str(), "api");
        assert_eq!(ErrorArea::K8s.as_str(), "k8s");
        assert_eq!(ErrorArea::Timeout.as_str(), "timeout");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // no recorder installed in unit tests, calls must still be safe
        record_error("ns", "Pod", ErrorArea::K8s, "not_deleted");
        record_http("ns", "Service", "200");
        let timer = ActionTimer::start("ns", "Deployment", "create");
        drop(timer);
    }
}
