//! Status events and the best-effort reporter that ships them to the board.

use crate::ledger::{ErrorEntry, ErrorLedger};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Wire format of `StatusEvent::time`
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// The outcome of one named check, as shown on the status board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    name: String,
    passing: bool,
    namespace: String,
    #[serde(deserialize_with = "null_as_empty")]
    info: Vec<ErrorEntry>,
    #[serde(with = "status_time")]
    time: NaiveDateTime,
}

impl StatusEvent {
    /// Build an event stamped with the current local time. It passes when `info` is empty.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, info: Vec<ErrorEntry>) -> Self {
        Self {
            name: name.into(),
            passing: info.is_empty(),
            namespace: namespace.into(),
            info,
            time: Local::now().naive_local().with_nanosecond_truncated(),
        }
    }

    /// Same as [`StatusEvent::new`] but with a timestamp read from its wire form.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `time` is not formatted as `YYYY-MM-DD HH:MM:SS`
    pub fn with_time(
        name: impl Into<String>,
        namespace: impl Into<String>,
        info: Vec<ErrorEntry>,
        time: &str,
    ) -> Result<Self, chrono::ParseError> {
        let mut event = Self::new(name, namespace, info);
        event.time = NaiveDateTime::parse_from_str(time, TIME_FORMAT)?;
        Ok(event)
    }

    /// Drain `ledger` into a new event.
    pub fn from_ledger(
        name: impl Into<String>,
        namespace: impl Into<String>,
        ledger: &mut ErrorLedger,
    ) -> Self {
        let (_, info) = ledger.drain();
        Self::new(name, namespace, info)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn passing(&self) -> bool {
        self.passing
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn info(&self) -> &[ErrorEntry] {
        &self.info
    }

    #[must_use]
    pub const fn time(&self) -> NaiveDateTime {
        self.time
    }

    #[must_use]
    pub fn formatted_time(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

trait TruncateNanos {
    fn with_nanosecond_truncated(self) -> Self;
}

impl TruncateNanos for NaiveDateTime {
    // the wire format has second precision, keep in-memory events comparable with parsed ones
    fn with_nanosecond_truncated(self) -> Self {
        use chrono::Timelike;
        self.with_nanosecond(0).unwrap_or(self)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ErrorEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ErrorEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

mod status_time {
    use super::TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Pushes status events to the board. Delivery can never fail the caller.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    http: reqwest::Client,
    sink: String,
    namespace: String,
}

impl StatusReporter {
    #[must_use]
    pub fn new(http: reqwest::Client, sink: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            http,
            sink: sink.into(),
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Drain `ledger` into an event named `operation` and push it.
    ///
    /// Returns the sink's response status when it answered at all.
    pub async fn report(
        &self,
        ledger: &mut ErrorLedger,
        operation: &str,
    ) -> Option<reqwest::StatusCode> {
        let event = StatusEvent::from_ledger(operation, self.namespace.as_str(), ledger);
        if event.passing() {
            debug!("✅ {}", operation);
        } else {
            info!("❌ {} ({} distinct failures)", operation, event.info().len());
        }
        self.publish(&event).await
    }

    /// Push an already built event.
    pub async fn publish(&self, event: &StatusEvent) -> Option<reqwest::StatusCode> {
        match self
            .http
            .post(&self.sink)
            .timeout(SINK_TIMEOUT)
            .json(event)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    debug!("Status sink rejected '{}': {}", event.name(), status);
                }
                Some(status)
            }
            Err(e) => {
                info!("Status sink not available, continuing");
                debug!("Status sink error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::serde_json;

    #[test]
    fn test_timestamp_round_trip() {
        let event = StatusEvent::with_time("Create Namespace", "ns", vec![], "2024-01-01 00:00:00")
            .unwrap();
        assert_eq!(event.formatted_time(), "2024-01-01 00:00:00");

        let reparsed = NaiveDateTime::parse_from_str(&event.formatted_time(), TIME_FORMAT).unwrap();
        assert_eq!(reparsed, event.time());
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        assert!(StatusEvent::with_time("x", "ns", vec![], "2024-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_passing_iff_info_empty() {
        assert!(StatusEvent::new("a", "ns", vec![]).passing());
        assert!(!StatusEvent::new("a", "ns", vec![ErrorEntry::new("bad", 1)]).passing());
    }

    #[test]
    fn test_wire_shape() {
        let event = StatusEvent::with_time(
            "Read pods",
            "kube-e2e",
            vec![ErrorEntry::new("boom", 2)],
            "2024-05-06 07:08:09",
        )
        .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "Read pods",
                "passing": false,
                "namespace": "kube-e2e",
                "info": [["boom", 2]],
                "time": "2024-05-06 07:08:09",
            })
        );

        let back: StatusEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_null_info_reads_as_empty() {
        let event: StatusEvent = serde_json::from_value(serde_json::json!({
            "name": "x",
            "passing": true,
            "namespace": "ns",
            "info": null,
            "time": "2024-01-01 00:00:00",
        }))
        .unwrap();
        assert!(event.info().is_empty());
    }

    #[tokio::test]
    async fn test_report_swallows_unreachable_sink() {
        let reporter = StatusReporter::new(reqwest::Client::new(), "http://127.0.0.1:1/update", "ns");
        let mut ledger = ErrorLedger::new();
        ledger.record("something broke");

        let status = reporter.report(&mut ledger, "Create Deployment").await;

        assert!(status.is_none());
        assert!(ledger.is_empty(), "report drains even when delivery fails");
    }
}
