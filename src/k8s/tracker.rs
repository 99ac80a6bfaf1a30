use super::outcome::ErrorDetail;
use crate::ledger::{ErrorEntry, ErrorLedger};
use crate::metrics::{self, ActionTimer, ErrorArea};
use crate::status::StatusReporter;
use tracing::error;

/// Per-controller failure accounting: the ledger, its metric labels and the
/// reporter that flushes it.
///
/// Every failure recorded here also bumps `e2e_errors_total`, so the board
/// and the metrics never disagree about what went wrong.
#[derive(Debug, Clone)]
pub struct Tracker {
    namespace: String,
    resource: String,
    ledger: ErrorLedger,
    reporter: StatusReporter,
}

impl Tracker {
    #[must_use]
    pub fn new(reporter: StatusReporter, namespace: &str, resource: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            resource: resource.to_string(),
            ledger: ErrorLedger::new(),
            reporter,
        }
    }

    /// A fresh tracker for another resource kind sharing this one's reporter.
    #[must_use]
    pub fn for_resource(&self, resource: &str) -> Self {
        Self::new(self.reporter.clone(), &self.namespace, resource)
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub const fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    /// Record a failure against this tracker's resource.
    pub fn fail(&mut self, message: impl Into<String>, area: ErrorArea, error: &str) {
        let resource = self.resource.clone();
        self.fail_on(&resource, message, area, error);
    }

    /// Record a failure whose metric belongs to another resource kind.
    pub fn fail_on(
        &mut self,
        resource: &str,
        message: impl Into<String>,
        area: ErrorArea,
        error: &str,
    ) {
        let message = message.into();
        error!("{}: {}", resource, message);
        metrics::record_error(&self.namespace, resource, area, error);
        self.ledger.record(message);
    }

    /// Record a failed API call. Platform messages are kept verbatim;
    /// transport failures are described with `doing`, e.g. "reading Pod web-0".
    pub fn api_failure(&mut self, detail: &ErrorDetail, doing: &str) {
        let message = match detail {
            ErrorDetail::Platform { message, .. } => message.clone(),
            ErrorDetail::Transport(cause) => {
                tracing::debug!("transport failure {}: {}", doing, cause);
                format!("max retries exceeded {doing}")
            }
        };
        self.fail(message, ErrorArea::Api, &detail.metric_name());
    }

    /// Count an HTTP request made against the workload.
    pub fn http_result(&self, resource: &str, result: &str) {
        metrics::record_http(&self.namespace, resource, result);
    }

    pub fn timer(&self, action: &'static str) -> ActionTimer {
        ActionTimer::start(&self.namespace, &self.resource, action)
    }

    /// Merge failures collected elsewhere (e.g. by a pod) into this ledger.
    pub fn absorb(&mut self, entries: Vec<ErrorEntry>) {
        self.ledger.record_batch(entries);
    }

    /// Drain without reporting, returning what was there.
    pub fn take(&mut self) -> Vec<ErrorEntry> {
        self.ledger.drain().1
    }

    pub fn flush(&mut self) {
        self.ledger.clear();
    }

    /// Flush the ledger to the status board as `operation`.
    pub async fn report(&mut self, operation: &str) -> Option<reqwest::StatusCode> {
        self.reporter.report(&mut self.ledger, operation).await
    }
}
