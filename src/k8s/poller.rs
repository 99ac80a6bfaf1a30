use super::outcome::Outcome;
use super::tracker::Tracker;
use crate::metrics::ErrorArea;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use tracing::{debug, info};

/// A namespaced collection whose size can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Deployments,
    Services,
    Pods,
    Endpoints,
    ConfigMaps,
    PersistentVolumeClaims,
}

impl Collection {
    /// What a namespace must be free of after a suite tears down
    pub const WORKLOADS: [Self; 4] = [Self::Deployments, Self::Services, Self::Pods, Self::Endpoints];

    async fn count(self, client: &Client, namespace: &str) -> Result<usize, kube::Error> {
        match self {
            Self::Deployments => count::<Deployment>(client, namespace).await,
            Self::Services => count::<Service>(client, namespace).await,
            Self::Pods => count::<Pod>(client, namespace).await,
            Self::Endpoints => count::<Endpoints>(client, namespace).await,
            Self::ConfigMaps => count::<ConfigMap>(client, namespace).await,
            Self::PersistentVolumeClaims => count::<PersistentVolumeClaim>(client, namespace).await,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deployments => "deployments",
            Self::Services => "services",
            Self::Pods => "pods",
            Self::Endpoints => "endpoints",
            Self::ConfigMaps => "configmaps",
            Self::PersistentVolumeClaims => "persistentvolumeclaims",
        };
        f.write_str(s)
    }
}

async fn count<K>(client: &Client, namespace: &str) -> Result<usize, kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    Ok(api.list(&ListParams::default()).await?.items.len())
}

/// One-shot reads classified against an expected state.
pub struct ConditionPoller<'a> {
    tracker: &'a mut Tracker,
}

impl<'a> ConditionPoller<'a> {
    pub fn new(tracker: &'a mut Tracker) -> Self {
        Self { tracker }
    }

    /// Read `name` from `api` and record any divergence from `expected`.
    pub async fn check_exists<K>(&mut self, api: &Api<K>, kind: &str, name: &str, expected: bool) -> Outcome<K>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let outcome = Outcome::from(api.get(name).await);
        self.classify(&outcome, kind, name, expected);
        outcome
    }

    /// Record what `outcome` means when `kind name` should (or should not) exist.
    pub fn classify<K>(&mut self, outcome: &Outcome<K>, kind: &str, name: &str, expected: bool) {
        match (outcome, expected) {
            (Outcome::Found(_), true) => debug!("{} {} exists", kind, name),
            (Outcome::NotFound, false) => info!("{} {} deleted", kind, name),
            (Outcome::Found(_), false) => {
                self.tracker
                    .fail(format!("{kind} {name} still exists"), ErrorArea::K8s, "not_deleted");
            }
            (Outcome::NotFound, true) => {
                self.tracker
                    .fail(format!("{kind} {name} not found"), ErrorArea::K8s, "not_found");
            }
            (Outcome::Failed(detail), _) if detail.is_transport() => {
                self.tracker.api_failure(detail, &format!("reading {kind} {name}"));
            }
            (Outcome::Failed(detail), _) => {
                let label = detail.metric_name();
                self.tracker
                    .fail(format!("{label}: {}", detail.message()), ErrorArea::Api, &label);
            }
        }
    }

    /// True only when every collection in `namespace` is empty.
    ///
    /// Leftovers are reported as one aggregated entry. A collection that
    /// cannot be listed counts as not empty.
    pub async fn check_empty(&mut self, client: &Client, namespace: &str, collections: &[Collection]) -> bool {
        let mut empty = true;
        let mut leftovers = Vec::new();

        for collection in collections {
            match collection.count(client, namespace).await {
                Ok(0) => debug!("namespace {} contains 0 {}", namespace, collection),
                Ok(n) => {
                    empty = false;
                    leftovers.push(format!("namespace {namespace} contains {n} {collection}"));
                }
                Err(e) => {
                    empty = false;
                    self.tracker
                        .api_failure(&e.into(), &format!("when reading {collection}"));
                }
            }
        }

        if leftovers.is_empty() {
            if empty {
                info!("Namespace {} is empty", namespace);
            }
        } else {
            self.tracker
                .fail(leftovers.join("; "), ErrorArea::K8s, "not_empty");
        }
        empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::outcome::ErrorDetail;
    use crate::status::StatusReporter;

    fn tracker() -> Tracker {
        let reporter = StatusReporter::new(reqwest::Client::new(), "http://127.0.0.1:1/update", "ns");
        Tracker::new(reporter, "ns", "ConfigMap")
    }

    #[test]
    fn test_classification_table() {
        let mut t = tracker();
        let mut poller = ConditionPoller::new(&mut t);
        poller.classify(&Outcome::Found(()), "ConfigMap", "a", true);
        poller.classify(&Outcome::<()>::NotFound, "ConfigMap", "a", false);
        assert!(t.ledger().is_empty());

        let mut poller = ConditionPoller::new(&mut t);
        poller.classify(&Outcome::Found(()), "ConfigMap", "a", false);
        poller.classify(&Outcome::<()>::NotFound, "ConfigMap", "a", true);
        let messages: Vec<_> = t.ledger().entries().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["ConfigMap a still exists", "ConfigMap a not found"]);
    }

    #[test]
    fn test_other_failures_ignore_expectation() {
        let mut t = tracker();
        let forbidden = Outcome::<()>::Failed(ErrorDetail::Platform {
            code: 403,
            message: "configmaps \"a\" is forbidden".into(),
        });
        let mut poller = ConditionPoller::new(&mut t);
        poller.classify(&forbidden, "ConfigMap", "a", true);
        poller.classify(&forbidden, "ConfigMap", "a", false);
        poller.classify(&Outcome::<()>::Failed(ErrorDetail::Transport("eof".into())), "ConfigMap", "a", false);

        let entries = t.ledger().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "forbidden: configmaps \"a\" is forbidden");
        assert_eq!(entries[0].occurrences, 2);
        assert_eq!(entries[1].message, "max retries exceeded reading ConfigMap a");
    }

    #[test]
    fn test_collection_names() {
        let names: Vec<_> = Collection::WORKLOADS.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["deployments", "services", "pods", "endpoints"]);
    }
}
