/**
 * The nginx deployment under test and the pods it owns.
 *
 * Pods are tracked by name. A config change moves the current set aside as
 * `old` so the rollout can be followed: new pods are counted, old pods are
 * checked for deletion.
 */
use super::Context;
use super::controller::{Controller, Readable};
use super::manifests::{self, WorkloadSpec};
use super::pod::{PodHandle, ResourceSnapshot};
use super::watcher::{EventWatcher, Transition, watch_params};
use crate::error::Result;
use crate::metrics::ErrorArea;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use kube::api::{Api, ListParams};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{ControlFlow, Deref, DerefMut};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Which pods a watch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodFilter {
    Any,
    /// Bound to a node
    Scheduled,
    /// Phase `Running`
    Running,
}

impl PodFilter {
    fn admits(self, snapshot: &ResourceSnapshot) -> bool {
        match self {
            Self::Any => true,
            Self::Scheduled => snapshot.is_scheduled(),
            Self::Running => snapshot.is_running(),
        }
    }
}

/// Which generation of pods to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodSet {
    Current,
    /// Pods that existed before the last config map change
    Old,
}

pub struct DeploymentController {
    inner: Controller<Deployment>,
    ctx: Context,
    spec: WorkloadSpec,
    pods_api: Api<Pod>,
    pods: BTreeMap<String, PodHandle>,
    old_pods: BTreeMap<String, PodHandle>,
    pod_requests: usize,
    window: Option<Instant>,
}

impl DeploymentController {
    /// # Errors
    ///
    /// Will return `Err` if the deployment body cannot be built
    pub fn new(ctx: &Context, volume_claim: Option<String>) -> Result<Self> {
        let settings = &ctx.settings;
        let spec = WorkloadSpec::from_settings(settings, volume_claim);
        let manifest = manifests::deployment(&settings.deployment, &spec, settings)?;
        let api = Api::namespaced(ctx.client.clone(), ctx.namespace());
        Ok(Self {
            inner: Controller::new(api, manifest, ctx.tracker("Deployment"), settings),
            ctx: ctx.clone(),
            spec,
            pods_api: Api::namespaced(ctx.client.clone(), ctx.namespace()),
            pods: BTreeMap::new(),
            old_pods: BTreeMap::new(),
            pod_requests: 0,
            window: None,
        })
    }

    #[must_use]
    pub const fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    #[must_use]
    pub fn pod_names(&self) -> Vec<String> {
        self.pods.keys().cloned().collect()
    }

    #[must_use]
    pub fn running_pods(&self) -> usize {
        self.pods
            .values()
            .filter(|p| p.cached().is_some_and(ResourceSnapshot::is_running))
            .count()
    }

    fn selector(&self) -> String {
        self.spec.template_labels.selector()
    }

    fn handle(&self, pod: &Pod) -> PodHandle {
        let nodes: Api<Node> = Api::all(self.ctx.client.clone());
        PodHandle::new(
            &pod.name_any(),
            self.pods_api.clone(),
            nodes,
            self.ctx.http.clone(),
            &self.ctx.settings.zone_label,
            self.inner.tracker_ref().for_resource("Pod"),
        )
        .with_snapshot(pod)
    }

    /// Push the current spec to the API as a full replace.
    async fn apply_spec(&mut self) -> bool {
        let manifest = manifests::deployment(&self.ctx.settings.deployment, &self.spec, &self.ctx.settings);
        match manifest {
            Ok(manifest) => {
                self.inner.set_manifest(manifest);
                let replaced = self.inner.replace().await;
                if replaced {
                    self.pod_requests = 0;
                }
                replaced
            }
            Err(e) => {
                self.inner
                    .tracker()
                    .fail(format!("invalid deployment body: {e}"), ErrorArea::K8s, "invalid_body");
                false
            }
        }
    }

    pub async fn scale(&mut self, replicas: i32, report: bool) {
        let timer = self.inner.tracker().timer("scale");
        self.spec.replicas = replicas;
        self.apply_spec().await;
        drop(timer);
        if report {
            self.inner
                .report(&format!("Scale Deployment to {replicas} replicas"))
                .await;
        }
    }

    /// Point the pods at another config map, retiring the current pods.
    pub async fn change_config_map(&mut self, config_map: &str, report: bool) {
        let timer = self.inner.tracker().timer("update");
        self.spec.config_map = config_map.to_string();
        self.old_pods = std::mem::take(&mut self.pods);
        self.apply_spec().await;
        drop(timer);
        if report {
            self.inner.report("Update Deployment").await;
        }
    }

    /// List the pods behind the selector right now, without watching.
    pub async fn read_pods(&mut self, report: bool) {
        let params = ListParams::default().labels(&self.selector());
        match self.pods_api.list(&params).await {
            Ok(list) => {
                self.pods = list
                    .items
                    .iter()
                    .map(|pod| (pod.name_any(), self.handle(pod)))
                    .collect();
                debug!("read {} pods", self.pods.len());
            }
            Err(e) => {
                self.inner
                    .tracker()
                    .api_failure(&e.into(), "listing Pod");
            }
        }
        if report {
            self.inner.report("Read pods").await;
        }
    }

    /// Watch pods until `wanted` distinct ones pass `filter` on a `transition`.
    /// Afterwards the current set is what the watch last saw, minus pods
    /// retired by a config change and, unless watching deletions, pods on their way out.
    async fn watch_pods(&mut self, filter: PodFilter, transition: Transition, wanted: usize) {
        if wanted == 0 {
            return;
        }
        let timeout = self.inner.timeout();
        let params = watch_params(timeout).labels(&self.selector());
        let old = &self.old_pods;
        let mut seen = BTreeSet::new();
        let mut latest: BTreeMap<String, Pod> = BTreeMap::new();

        let mut watcher = EventWatcher::new(self.inner.tracker());
        let end = watcher
            .observe(&self.pods_api, &params, timeout, |observed, pod: Pod| {
                let name = pod.name_any();
                let snapshot = ResourceSnapshot::from(&pod);
                debug!("Event: {} Pod {} {:?}", observed, name, snapshot.phase);

                if old.contains_key(&name) {
                    return ControlFlow::Continue(());
                }
                // deleted pods stay in the set so a deletion watch can be checked afterwards
                let leaving = observed == Transition::Deleted || pod.metadata.deletion_timestamp.is_some();
                if leaving && transition != Transition::Deleted {
                    seen.remove(&name);
                    latest.remove(&name);
                    return ControlFlow::Continue(());
                }

                if transition.admits(observed) && filter.admits(&snapshot) && seen.insert(name.clone()) {
                    info!("Pod {} {} ({:?})", name, observed, snapshot.phase);
                }
                latest.insert(name, pod);

                if seen.len() >= wanted {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        watcher.settle("Pod", &end, seen.len(), wanted);

        if seen.len() >= wanted {
            info!("All {} pods reached the expected state", wanted);
        }
        self.pods = latest.values().map(|pod| (pod.name_any(), self.handle(pod))).collect();
    }

    fn replicas(&self) -> usize {
        usize::try_from(self.spec.replicas).unwrap_or(0)
    }

    pub async fn wait_on_pods_scheduled(&mut self, report: bool) {
        let timer = self.inner.tracker().timer("schedule");
        self.watch_pods(PodFilter::Scheduled, Transition::Any, self.replicas())
            .await;
        drop(timer);
        if report {
            self.inner.report("Wait on pod scheduling").await;
        }
    }

    pub async fn wait_on_pods_ready(&mut self, report: bool) {
        let timer = self.inner.tracker().timer("run");
        self.watch_pods(PodFilter::Running, Transition::Any, self.replicas())
            .await;
        drop(timer);
        if report {
            self.inner.report("Wait on pods ready").await;
        }
    }

    /// Wait for every known pod to be deleted.
    pub async fn watch_pod_scaling(&mut self, report: bool) {
        let timer = self.inner.tracker().timer("scale");
        let known = self.pods.len();
        self.watch_pods(PodFilter::Any, Transition::Deleted, known).await;
        drop(timer);
        if report {
            self.inner.report("Watch pod deletion").await;
        }
    }

    pub async fn check_pods_deleted(&mut self, set: PodSet, report: bool) -> bool {
        let pods = match set {
            PodSet::Current => &mut self.pods,
            PodSet::Old => &mut self.old_pods,
        };
        let mut all_gone = true;
        for pod in pods.values_mut() {
            all_gone &= pod.deleted(false).await;
            self.inner.tracker().absorb(pod.take_errors());
        }
        if report {
            self.inner.report("Check pods are deleted").await;
        }
        all_gone
    }

    pub async fn check_pods_on_different_nodes(&mut self, report: bool) {
        let mut by_node: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pod in self.pods.values_mut() {
            if !pod.cached().is_some_and(ResourceSnapshot::is_running) {
                continue;
            }
            let node = pod.node().await;
            self.inner.tracker().absorb(pod.take_errors());
            if let Some(node) = node {
                by_node.entry(node).or_default().push(pod.name().to_string());
            }
        }
        for (node, pods) in by_node.into_iter().filter(|(_, pods)| pods.len() > 1) {
            self.inner.tracker().fail_on(
                "Pod",
                format!("Pods {} are on the same node - {node}", pods.join(",")),
                ErrorArea::K8s,
                "same_node",
            );
        }
        if report {
            self.inner.report("Check pods on different nodes").await;
        }
    }

    pub async fn check_pods_on_different_zones(&mut self, report: bool) {
        let mut by_zone: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pod in self.pods.values_mut() {
            if !pod.cached().is_some_and(ResourceSnapshot::is_running) {
                continue;
            }
            let zone = pod.zone().await;
            self.inner.tracker().absorb(pod.take_errors());
            if let Some(zone) = zone {
                by_zone.entry(zone).or_default().push(pod.name().to_string());
            }
        }
        for (zone, pods) in by_zone.into_iter().filter(|(_, pods)| pods.len() > 1) {
            self.inner.tracker().fail_on(
                "Pod",
                format!("Pods {} are in the same zone - {zone}", pods.join(",")),
                ErrorArea::K8s,
                "same_zone",
            );
        }
        if report {
            self.inner.report("Check pods on different zones").await;
        }
    }

    /// GET every running pod directly and compare against `expected`.
    pub async fn http_request_all_pods(&mut self, expected: &str, report: bool) {
        for pod in self.pods.values_mut() {
            if !pod.cached().is_some_and(ResourceSnapshot::is_running) {
                continue;
            }
            let body = pod.http_get().await;
            let tracker = self.inner.tracker();
            tracker.absorb(pod.take_errors());
            if let Some(body) = body {
                if body == expected {
                    debug!("Pod {} served the expected page", pod.name());
                } else {
                    error!("Response from pod {} didn't match expected output", pod.name());
                    debug!("Expected: {} received: {}", expected, body);
                    tracker.http_result("Pod", "wrong_response");
                    tracker.fail_on(
                        "Pod",
                        "Response text does not match expected text",
                        ErrorArea::K8s,
                        "wrong_response",
                    );
                }
            }
        }
        self.pod_requests += 1;
        if report {
            self.inner.report("HTTP request each pod").await;
        }
    }

    /// Start counting requests afresh; pod logs are read from this point on.
    pub fn begin_request_window(&mut self) {
        self.pod_requests = 0;
        self.window = Some(Instant::now());
    }

    /// Check every running pod logged the requests made to it.
    ///
    /// Each pod must show at least one line per direct request, and the total
    /// must equal the service requests plus the direct ones.
    pub async fn validate_pod_log(&mut self, service_requests: usize, user_agent: &str, report: bool) {
        // whole seconds, rounded up so the first request is never cut off
        let since = self
            .window
            .map(|start| i64::try_from(start.elapsed().as_secs()).unwrap_or(i64::MAX).saturating_add(1));
        let mut total = 0;
        let mut running = 0;
        for pod in self.pods.values_mut() {
            if !pod.cached().is_some_and(ResourceSnapshot::is_running) {
                continue;
            }
            running += 1;
            let lines = pod.log_lines(since).await;
            let tracker = self.inner.tracker();
            tracker.absorb(pod.take_errors());
            let count = lines
                .iter()
                .filter(|line| user_agent.is_empty() || line.contains(user_agent))
                .count();
            total += count;
            if count < self.pod_requests {
                tracker.fail_on(
                    "Pod",
                    "Not enough lines of output containing user agent to meet pod request count",
                    ErrorArea::K8s,
                    "log_incorrect",
                );
                break;
            }
        }

        let expected = service_requests + self.pod_requests * running;
        if total != expected {
            self.inner.tracker().fail_on(
                "Pod",
                format!(
                    "Not enough lines of output containing user agent to meet pod request count and service request count - found {total}, not {expected}"
                ),
                ErrorArea::K8s,
                "log_incorrect",
            );
        }
        if report {
            self.inner.report("Validate pod logs").await;
        }
    }
}

impl Deref for DeploymentController {
    type Target = Controller<Deployment>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for DeploymentController {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[async_trait]
impl Readable for DeploymentController {
    async fn exists(&mut self, report: bool) -> bool {
        self.inner.exists(report).await
    }

    async fn deleted(&mut self, report: bool) -> bool {
        self.inner.deleted(report).await
    }
}
