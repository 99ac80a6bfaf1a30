use super::Context;
use super::controller::{Controller, Readable};
use super::manifests;
use super::outcome::Outcome;
use super::watcher::{EventWatcher, watch_params};
use crate::metrics::ErrorArea;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::ResourceExt;
use kube::api::Api;
use std::ops::{ControlFlow, Deref, DerefMut};
use tracing::{debug, error, info};

/// Subset and address totals of an endpoints object.
#[must_use]
pub fn endpoint_counts(endpoints: &Endpoints) -> (usize, usize) {
    let subsets = endpoints.subsets.as_deref().unwrap_or_default();
    let addresses = subsets
        .iter()
        .map(|s| s.addresses.as_ref().map_or(0, Vec::len))
        .sum();
    (subsets.len(), addresses)
}

pub struct ServiceController {
    inner: Controller<Service>,
    endpoints: Api<Endpoints>,
    http: reqwest::Client,
    expected_subsets: usize,
    expected_addresses: usize,
}

impl ServiceController {
    /// A service expected to front `addresses` ready pods.
    #[must_use]
    pub fn new(ctx: &Context, addresses: usize) -> Self {
        let settings = &ctx.settings;
        let manifest = manifests::service(&settings.service, settings);
        let api = Api::namespaced(ctx.client.clone(), ctx.namespace());
        Self {
            inner: Controller::new(api, manifest, ctx.tracker("Service"), settings),
            endpoints: Api::namespaced(ctx.client.clone(), ctx.namespace()),
            http: ctx.http.clone(),
            // the platform drops empty subsets
            expected_subsets: usize::from(addresses > 0),
            expected_addresses: addresses,
        }
    }

    fn compare_endpoints(&mut self, subsets: usize, addresses: usize) {
        info!(
            "Endpoints for service {} contain {} subsets and {} addresses",
            self.inner.name(),
            subsets,
            addresses
        );
        if subsets != self.expected_subsets {
            self.inner.tracker().fail(
                format!(
                    "Subsets doesn't match expected - found {subsets}, not {}",
                    self.expected_subsets
                ),
                ErrorArea::K8s,
                "incorrect_endpoint_count",
            );
        } else if addresses != self.expected_addresses {
            self.inner.tracker().fail(
                format!(
                    "Addresses doesn't match expected - found {addresses}, not {}",
                    self.expected_addresses
                ),
                ErrorArea::K8s,
                "incorrect_endpoint_count",
            );
        }
    }

    /// Read the service's endpoints once and compare the totals.
    pub async fn read_endpoints(&mut self, report: bool) {
        let name = self.inner.name().to_string();
        let (subsets, addresses) = match Outcome::from(self.endpoints.get(&name).await) {
            Outcome::Found(endpoints) => endpoint_counts(&endpoints),
            Outcome::NotFound => {
                self.inner.tracker().fail(
                    format!("Endpoints {name} not found"),
                    ErrorArea::K8s,
                    "not_found",
                );
                (0, 0)
            }
            Outcome::Failed(detail) => {
                self.inner
                    .tracker()
                    .api_failure(&detail, &format!("reading Endpoints {name}"));
                (0, 0)
            }
        };
        self.compare_endpoints(subsets, addresses);
        if report {
            self.inner.report("Read service endpoints").await;
        }
    }

    /// Watch the service's endpoints until the totals match or time runs out.
    /// Each event is judged on its own; counts never accumulate across events.
    /// A watch that never shows the object is recorded even when 0 is expected.
    pub async fn watch_endpoints(&mut self, report: bool) {
        let name = self.inner.name().to_string();
        let timeout = self.inner.timeout();
        let wanted = (self.expected_subsets, self.expected_addresses);
        let mut last: Option<(usize, usize)> = None;

        let mut watcher = EventWatcher::new(self.inner.tracker());
        let end = watcher
            .observe(&self.endpoints, &watch_params(timeout), timeout, |observed, endpoints: Endpoints| {
                if endpoints.name_any() != name {
                    return ControlFlow::Continue(());
                }
                let counts = endpoint_counts(&endpoints);
                debug!("Event: {} Endpoints {} {:?}", observed, name, counts);
                last = Some(counts);
                if counts == wanted {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        watcher.settle("Endpoints", &end, usize::from(last == Some(wanted)), 1);

        if let Some((subsets, addresses)) = last {
            self.compare_endpoints(subsets, addresses);
        }
        if report {
            self.inner.report("Watch service endpoints").await;
        }
    }

    /// Request the service `n` times through its cluster IP or DNS name.
    pub async fn request_n_times(&mut self, n: usize, expected: &str, by_hostname: bool, report: bool) {
        let _timer = self.inner.tracker().timer("http_get");
        let name = self.inner.name().to_string();
        let namespace = self.inner.tracker().namespace().to_string();

        let address = match self.inner.read().await {
            Outcome::Found(svc) => {
                let spec = svc.spec.unwrap_or_default();
                let port = spec.ports.as_ref().and_then(|p| p.first()).map(|p| p.port);
                let host = if by_hostname {
                    Some(format!("{name}.{namespace}.svc.cluster.local"))
                } else {
                    spec.cluster_ip
                };
                host.zip(port).map(|(host, port)| format!("http://{host}:{port}"))
            }
            Outcome::NotFound => {
                self.inner
                    .tracker()
                    .fail(format!("Service {name} not found"), ErrorArea::K8s, "not_found");
                None
            }
            Outcome::Failed(detail) => {
                self.inner
                    .tracker()
                    .api_failure(&detail, &format!("reading Service {name}"));
                None
            }
        };

        if let Some(address) = address {
            for i in 0..n {
                self.request_once(&address, i, expected).await;
            }
        }

        if report {
            let form = if by_hostname { "hostname" } else { "ip" };
            self.inner
                .report(&format!("Request service by {form} {n} times"))
                .await;
        }
    }

    async fn request_once(&mut self, address: &str, attempt: usize, expected: &str) {
        let name = self.inner.name().to_string();
        let tracker = self.inner.tracker();
        match self.http.get(address).send().await {
            Ok(response) => {
                let status = response.status();
                info!("Service at {} answered {}", address, status);
                tracker.http_result("Service", status.as_str());
                if !status.is_success() {
                    tracker.fail(
                        format!("HTTP error code {}", status.as_u16()),
                        ErrorArea::Api,
                        status.as_str(),
                    );
                    return;
                }
                let body = response.text().await.unwrap_or_default();
                if body != expected {
                    tracker.http_result("Service", "wrong_response");
                    tracker.fail(
                        format!("Response text did not match expected - request {attempt}"),
                        ErrorArea::K8s,
                        "wrong_response",
                    );
                }
            }
            Err(e) => {
                error!("Service at {} GET failed: {}", address, e);
                tracker.http_result("Service", "connection_error");
                tracker.fail(
                    format!("Service {name} at address: {address} gave connection error"),
                    ErrorArea::Api,
                    "connection_error",
                );
            }
        }
    }
}

impl Deref for ServiceController {
    type Target = Controller<Service>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ServiceController {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[async_trait]
impl Readable for ServiceController {
    async fn exists(&mut self, report: bool) -> bool {
        self.inner.exists(report).await
    }

    async fn deleted(&mut self, report: bool) -> bool {
        self.inner.deleted(report).await
    }
}
