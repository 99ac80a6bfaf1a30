/**
 * Runner configuration: defaults, label sets and the immutable `Settings`
 * value handed to every controller.
 */
use crate::k8s::utils::format_label_selector;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "kube-e2e";
pub const DEFAULT_DEPLOYMENT: &str = "e2etestapp";
pub const DEFAULT_SERVICE: &str = "kube-e2e";
pub const DEFAULT_VOLUME_CLAIM: &str = "test-claim";
pub const DEFAULT_CLAIM_STORAGE: &str = "1Gi";

pub const DEFAULT_IMAGE: &str = "nginx:alpine";
pub const DEFAULT_REPLICAS: i32 = 3;
pub const DEFAULT_CONTAINER_PORT: i32 = 80;
pub const DEFAULT_SERVICE_PORT: i32 = 80;

/// Node label used both for pod anti-affinity and the zone spread check
pub const DEFAULT_ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Seconds to wait on a watch stream before giving up
pub const DEFAULT_EVENT_TIMEOUT_SECS: u64 = 60;

/// Interval between reads while polling for a deletion to land
pub const DELETE_POLL_INTERVAL_SECS: u64 = 1;

pub const DEFAULT_STATUS_PORT: u16 = 8081;

/// Minutes without a status update before the board flags stale data
pub const DEFAULT_TIME_TO_REPORT_MINUTES: f64 = 20.0;

pub const INDEX_NAME: &str = "hello-world";
pub const INDEX_NAME_CHANGED: &str = "hello-kubernetes";

pub const INDEX_HTML: &str = "<html>
      <body>
        <h1>
          Hello World!
        </h1>
      </body>
    </html>";

pub const INDEX_HTML_CHANGED: &str = "<html>
      <body>
        <h1>
          Hello Kubernetes!
        </h1>
      </body>
    </html>";

const _: () = {
    assert!(DEFAULT_REPLICAS > 0, "DEFAULT_REPLICAS must be greater than 0");
    assert!(DEFAULT_EVENT_TIMEOUT_SECS > 0, "DEFAULT_EVENT_TIMEOUT_SECS must be greater than 0");
    assert!(DELETE_POLL_INTERVAL_SECS > 0, "DELETE_POLL_INTERVAL_SECS must be greater than 0");
    assert!(DEFAULT_CONTAINER_PORT > 0, "DEFAULT_CONTAINER_PORT must be greater than 0");
};

/// An immutable label set, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    #[must_use]
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parse `key=value,key2=value2`. Malformed pairs are skipped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let (k, v) = (k.trim(), v.trim());
            (!k.is_empty()).then(|| (k.to_string(), v.to_string()))
        }))
    }

    /// A copy of these labels with `other` layered on top.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut map = self.0.clone();
        map.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(map)
    }

    /// Label selector string, `k=v,k2=v2`
    #[must_use]
    pub fn selector(&self) -> String {
        format_label_selector(&self.0)
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a scenario needs to know, built once by the CLI.
#[derive(Debug, Clone)]
pub struct Settings {
    pub namespace: String,
    pub deployment: String,
    pub service: String,
    pub replicas: i32,
    pub labels: Labels,
    pub template_labels: Labels,
    pub image: String,
    pub container_port: i32,
    pub service_port: i32,
    pub index_name: String,
    pub index_html: String,
    pub index_name_changed: String,
    pub index_html_changed: String,
    pub volume_claim: String,
    pub claim_storage: String,
    pub zone_label: String,
    pub event_timeout: Duration,
    pub delete_poll_interval: Duration,
    pub status_sink: String,
    pub user_agent: String,
    pub service_requests: usize,
}

impl Settings {
    /// Number of requests made against the service per run, twice the replica count
    #[must_use]
    pub fn default_service_requests(replicas: i32) -> usize {
        usize::try_from(replicas).unwrap_or(0) * 2
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            replicas: DEFAULT_REPLICAS,
            labels: Labels::new([("app", "hellominikube")]),
            template_labels: Labels::new([("app", DEFAULT_DEPLOYMENT)]),
            image: DEFAULT_IMAGE.to_string(),
            container_port: DEFAULT_CONTAINER_PORT,
            service_port: DEFAULT_SERVICE_PORT,
            index_name: INDEX_NAME.to_string(),
            index_html: INDEX_HTML.to_string(),
            index_name_changed: INDEX_NAME_CHANGED.to_string(),
            index_html_changed: INDEX_HTML_CHANGED.to_string(),
            volume_claim: DEFAULT_VOLUME_CLAIM.to_string(),
            claim_storage: DEFAULT_CLAIM_STORAGE.to_string(),
            zone_label: DEFAULT_ZONE_LABEL.to_string(),
            event_timeout: Duration::from_secs(DEFAULT_EVENT_TIMEOUT_SECS),
            delete_poll_interval: Duration::from_secs(DELETE_POLL_INTERVAL_SECS),
            status_sink: format!("http://localhost:{DEFAULT_STATUS_PORT}/update"),
            user_agent: crate::USER_AGENT.to_string(),
            service_requests: Self::default_service_requests(DEFAULT_REPLICAS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_skips_garbage() {
        let labels = Labels::parse("team=core, tier = web,broken,=x");
        assert_eq!(labels, Labels::new([("team", "core"), ("tier", "web")]));
    }

    #[test]
    fn test_labels_merge_and_selector() {
        let base = Labels::new([("app", "hello")]);
        let merged = base.merged(&Labels::parse("app=override,zone=a"));
        assert_eq!(merged.selector(), "app=override,zone=a");
        // original untouched
        assert_eq!(base.selector(), "app=hello");
    }

    #[test]
    fn test_default_service_requests() {
        assert_eq!(Settings::default().service_requests, 6);
        assert_eq!(Settings::default_service_requests(-1), 0);
    }
}
