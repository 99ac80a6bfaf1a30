use super::Context;
use super::controller::{Confirm, Controller, Readable};
use super::manifests;
use super::poller::{Collection, ConditionPoller};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use std::ops::{Deref, DerefMut};

/// The namespace the suites run in. Cluster scoped; deletion is confirmed
/// by its `DELETED` event since namespaces linger while terminating.
pub struct NamespaceController {
    inner: Controller<Namespace>,
    client: kube::Client,
}

impl NamespaceController {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        let api = Api::all(ctx.client.clone());
        let manifest = manifests::namespace(ctx.namespace());
        Self {
            inner: Controller::new(api, manifest, ctx.tracker("Namespace"), &ctx.settings)
                .confirm_by(Confirm::Watch),
            client: ctx.client.clone(),
        }
    }

    /// True when no workloads are left in the namespace.
    pub async fn check_empty(&mut self, report: bool) -> bool {
        let name = self.inner.name().to_string();
        let empty = ConditionPoller::new(self.inner.tracker())
            .check_empty(&self.client, &name, &Collection::WORKLOADS)
            .await;
        if report {
            self.inner.report("Check namespace empty").await;
        }
        empty
    }
}

impl Deref for NamespaceController {
    type Target = Controller<Namespace>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for NamespaceController {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[async_trait]
impl Readable for NamespaceController {
    async fn exists(&mut self, report: bool) -> bool {
        self.inner.exists(report).await
    }

    async fn deleted(&mut self, report: bool) -> bool {
        self.inner.deleted(report).await
    }
}
