use super::controller::Readable;
use super::outcome::Outcome;
use super::poller::ConditionPoller;
use super::tracker::Tracker;
use crate::ledger::ErrorEntry;
use crate::metrics::ErrorArea;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use kube::api::{Api, LogParams};
use tracing::{debug, error, info};

/// Fields of a pod the checks look at, cached after the first read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub phase: Option<String>,
    pub node: Option<String>,
    pub ip: Option<String>,
    pub port: Option<i32>,
}

impl From<&Pod> for ResourceSnapshot {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        let spec = pod.spec.as_ref();
        Self {
            phase: status.and_then(|s| s.phase.clone()),
            node: spec.and_then(|s| s.node_name.clone()),
            ip: status.and_then(|s| s.pod_ip.clone()),
            port: spec
                .and_then(|s| s.containers.first())
                .and_then(|c| c.ports.as_ref())
                .and_then(|ports| ports.first())
                .map(|p| p.container_port),
        }
    }
}

impl ResourceSnapshot {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some("Running")
    }

    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.node.is_some()
    }

    /// `http://ip:port` once both are known
    #[must_use]
    pub fn url(&self) -> Option<String> {
        Some(format!("http://{}:{}", self.ip.as_ref()?, self.port?))
    }
}

/// One pod of the deployment under test.
pub struct PodHandle {
    name: String,
    pods: Api<Pod>,
    nodes: Api<Node>,
    http: reqwest::Client,
    zone_label: String,
    snapshot: Option<ResourceSnapshot>,
    tracker: Tracker,
}

impl PodHandle {
    #[must_use]
    pub fn new(
        name: &str,
        pods: Api<Pod>,
        nodes: Api<Node>,
        http: reqwest::Client,
        zone_label: &str,
        tracker: Tracker,
    ) -> Self {
        Self {
            name: name.to_string(),
            pods,
            nodes,
            http,
            zone_label: zone_label.to_string(),
            snapshot: None,
            tracker,
        }
    }

    /// Seed the cache from an object already in hand (a list or watch result).
    #[must_use]
    pub fn with_snapshot(mut self, pod: &Pod) -> Self {
        self.snapshot = Some(ResourceSnapshot::from(pod));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn cached(&self) -> Option<&ResourceSnapshot> {
        self.snapshot.as_ref()
    }

    /// The cached snapshot, read from the API on first use.
    pub async fn snapshot(&mut self) -> Option<&ResourceSnapshot> {
        if self.snapshot.is_none() {
            let outcome = ConditionPoller::new(&mut self.tracker)
                .check_exists(&self.pods, "Pod", &self.name, true)
                .await;
            if let Outcome::Found(pod) = outcome {
                self.snapshot = Some(ResourceSnapshot::from(&pod));
            }
        }
        self.snapshot.as_ref()
    }

    pub async fn node(&mut self) -> Option<String> {
        self.snapshot().await.and_then(|s| s.node.clone())
    }

    /// Zone label of the node this pod runs on.
    pub async fn zone(&mut self) -> Option<String> {
        let Some(node) = self.node().await else {
            self.tracker
                .fail(format!("Pod {} has no node", self.name), ErrorArea::K8s, "no_node");
            return None;
        };

        match Outcome::from(self.nodes.get(&node).await) {
            Outcome::Found(n) => {
                let zone = n.labels().get(&self.zone_label).cloned();
                if zone.is_none() {
                    self.tracker.fail(
                        format!("Node {node} containing pod {} has no zone label", self.name),
                        ErrorArea::K8s,
                        "no_zone_label_on_node",
                    );
                }
                zone
            }
            Outcome::NotFound => {
                self.tracker
                    .fail(format!("Node {node} not found"), ErrorArea::K8s, "not_found");
                None
            }
            Outcome::Failed(detail) => {
                self.tracker.api_failure(&detail, &format!("reading Node {node}"));
                None
            }
        }
    }

    /// GET the pod's container port and return the body.
    pub async fn http_get(&mut self) -> Option<String> {
        let Some(url) = self.snapshot().await.and_then(ResourceSnapshot::url) else {
            self.tracker.fail(
                format!("Pod {} has no address", self.name),
                ErrorArea::K8s,
                "no_address",
            );
            return None;
        };

        let _timer = self.tracker.timer("http_get");
        match self.http.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                self.tracker.http_result("Pod", status.as_str());
                if !status.is_success() {
                    error!("Pod {} at address {} answered {}", self.name, url, status);
                    self.tracker.fail(
                        format!("HTTP error code {}", status.as_u16()),
                        ErrorArea::Api,
                        status.as_str(),
                    );
                    return None;
                }
                match response.text().await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        debug!("reading body from {}: {}", url, e);
                        self.tracker.fail(
                            format!("Pod {} at address: {} sent an unreadable body", self.name, url),
                            ErrorArea::Api,
                            "bad_body",
                        );
                        None
                    }
                }
            }
            Err(e) => {
                debug!("GET {} failed: {}", url, e);
                self.tracker.http_result("Pod", "connection_error");
                self.tracker.fail(
                    format!("Pod {} at address: {} gave connection error", self.name, url),
                    ErrorArea::Api,
                    "connection_error",
                );
                None
            }
        }
    }

    /// Container log split into lines, limited to the last `since_seconds` when given.
    pub async fn log_lines(&mut self, since_seconds: Option<i64>) -> Vec<String> {
        let params = LogParams {
            since_seconds,
            ..LogParams::default()
        };
        match self.pods.logs(&self.name, &params).await {
            Ok(log) => log.lines().map(str::to_string).collect(),
            Err(e) => {
                self.tracker
                    .api_failure(&e.into(), &format!("reading log of Pod {}", self.name));
                Vec::new()
            }
        }
    }

    pub fn take_errors(&mut self) -> Vec<ErrorEntry> {
        self.tracker.take()
    }
}

#[async_trait]
impl Readable for PodHandle {
    async fn exists(&mut self, report: bool) -> bool {
        let outcome = ConditionPoller::new(&mut self.tracker)
            .check_exists(&self.pods, "Pod", &self.name, true)
            .await;
        let found = match outcome {
            Outcome::Found(pod) => {
                self.snapshot = Some(ResourceSnapshot::from(&pod));
                true
            }
            _ => false,
        };
        if report {
            self.tracker.report("Check Pod exists").await;
        }
        found
    }

    async fn deleted(&mut self, report: bool) -> bool {
        let outcome = ConditionPoller::new(&mut self.tracker)
            .check_exists(&self.pods, "Pod", &self.name, false)
            .await;
        let gone = matches!(outcome, Outcome::NotFound);
        if gone {
            info!("Pod {} deleted", self.name);
        }
        if report {
            self.tracker.report("Check Pod deleted").await;
        }
        gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::serde_json::{self, json};

    #[test]
    fn test_snapshot_from_pod() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "web-0" },
            "spec": {
                "nodeName": "node-a",
                "containers": [{ "name": "testapp", "ports": [{ "containerPort": 80 }] }]
            },
            "status": { "phase": "Running", "podIP": "10.0.0.7" }
        }))
        .unwrap();

        let snapshot = ResourceSnapshot::from(&pod);
        assert!(snapshot.is_running());
        assert!(snapshot.is_scheduled());
        assert_eq!(snapshot.url().as_deref(), Some("http://10.0.0.7:80"));
    }

    #[test]
    fn test_pending_pod_has_no_url() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "web-1" },
            "spec": { "containers": [{ "name": "testapp" }] },
            "status": { "phase": "Pending" }
        }))
        .unwrap();

        let snapshot = ResourceSnapshot::from(&pod);
        assert!(!snapshot.is_running());
        assert!(!snapshot.is_scheduled());
        assert_eq!(snapshot.url(), None);
    }
}
