pub mod client;
pub mod controller;
pub mod deployment;
pub mod manifests;
pub mod namespace;
pub mod outcome;
pub mod pod;
pub mod poller;
pub mod service;
pub mod tracker;
pub mod utils;
pub mod watcher;

use crate::config::Settings;
use crate::status::StatusReporter;
use controller::Controller;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim};
use kube::api::Api;
use std::sync::Arc;
use tracker::Tracker;

/// Default user agent, sent on API calls and on requests to the workload
///
/// Pod log validation looks for this string, so it must match what the
/// HTTP client sends.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Clients and settings shared by every controller of one scenario.
#[derive(Clone)]
pub struct Context {
    pub client: kube::Client,
    pub http: reqwest::Client,
    pub settings: Arc<Settings>,
    pub reporter: StatusReporter,
}

impl Context {
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client cannot be built
    pub fn new(client: kube::Client, settings: Settings) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()?;
        let reporter = StatusReporter::new(http.clone(), settings.status_sink.clone(), settings.namespace.clone());
        Ok(Self {
            client,
            http,
            settings: Arc::new(settings),
            reporter,
        })
    }

    /// A tracker for `resource` in the namespace under test.
    #[must_use]
    pub fn tracker(&self, resource: &str) -> Tracker {
        Tracker::new(self.reporter.clone(), &self.settings.namespace, resource)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    /// Controller for a config map serving `index_html`.
    #[must_use]
    pub fn config_map(&self, name: &str, index_html: &str) -> Controller<ConfigMap> {
        Controller::new(
            Api::namespaced(self.client.clone(), self.namespace()),
            manifests::config_map(name, index_html),
            self.tracker("ConfigMap"),
            &self.settings,
        )
    }

    /// Controller for the volume claim mounted by the deployment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the claim body cannot be built
    pub fn volume_claim(&self) -> crate::error::Result<Controller<PersistentVolumeClaim>> {
        Ok(Controller::new(
            Api::namespaced(self.client.clone(), self.namespace()),
            manifests::volume_claim(&self.settings.volume_claim, &self.settings.claim_storage)?,
            self.tracker("PersistentVolumeClaim"),
            &self.settings,
        ))
    }
}
