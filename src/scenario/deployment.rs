use super::{Scenario, require_namespace};
use crate::error::Result;
use crate::k8s::Context;
use crate::k8s::controller::{Controller, Readable};
use crate::k8s::deployment::{DeploymentController, PodSet};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim};

/// The deployment, the config map it serves and its optional claim.
pub struct Workload {
    pub ctx: Context,
    pub deployment: DeploymentController,
    pub config_map: Controller<ConfigMap>,
    pub claim: Option<Controller<PersistentVolumeClaim>>,
}

impl Workload {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context, with_claim: bool) -> Result<Self> {
        let settings = &ctx.settings;
        let claim = if with_claim { Some(ctx.volume_claim()?) } else { None };
        Ok(Self {
            ctx: ctx.clone(),
            deployment: DeploymentController::new(ctx, with_claim.then(|| settings.volume_claim.clone()))?,
            config_map: ctx.config_map(&settings.index_name, &settings.index_html),
            claim,
        })
    }

    /// Quietly bring the workload up if a previous run left it missing,
    /// then load its pods.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceGone` if the namespace disappears
    pub async fn ensure(&mut self, wait_ready: bool) -> Result<()> {
        self.config_map.create_if_not_exists(false).await?;
        if let Some(claim) = self.claim.as_mut() {
            claim.create_if_not_exists(false).await?;
        }
        self.deployment.create_if_not_exists(false).await?;
        if wait_ready {
            self.deployment.wait_on_pods_ready(false).await;
        } else {
            self.deployment.read_pods(false).await;
        }
        Ok(())
    }

    pub fn flush_errors(&mut self) {
        self.deployment.flush_errors();
        self.config_map.flush_errors();
        if let Some(claim) = self.claim.as_mut() {
            claim.flush_errors();
        }
    }
}

/// Full lifecycle of a deployment, optionally backed by a volume claim.
pub struct DeploymentScenario {
    workload: Workload,
}

impl DeploymentScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context, with_claim: bool) -> Result<Self> {
        Ok(Self {
            workload: Workload::new(ctx, with_claim)?,
        })
    }
}

#[async_trait]
impl Scenario for DeploymentScenario {
    async fn start(&mut self) -> Result<()> {
        require_namespace(&self.workload.ctx).await
    }

    async fn run(&mut self) -> Result<()> {
        let w = &mut self.workload;
        w.config_map.create(true).await?;
        if let Some(claim) = w.claim.as_mut() {
            claim.create(true).await?;
        }
        w.deployment.create(true).await?;
        w.deployment.exists(true).await;
        w.deployment.wait_on_pods_scheduled(true).await;
        w.deployment.wait_on_pods_ready(true).await;
        w.deployment.check_pods_on_different_nodes(true).await;
        w.deployment.check_pods_on_different_zones(true).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let w = &mut self.workload;
        w.deployment.delete(true).await;
        w.deployment.deleted(true).await;
        w.deployment.watch_pod_scaling(true).await;
        w.deployment.read_pods(false).await;
        w.deployment.check_pods_deleted(PodSet::Current, true).await;
        if let Some(claim) = w.claim.as_mut() {
            claim.delete(true).await;
            claim.deleted(true).await;
        }
        w.config_map.delete(true).await;
        w.config_map.deleted(true).await;
        Ok(())
    }
}

/// Roll the deployment onto a second config map and follow the rollout.
pub struct DeploymentUpdateScenario {
    workload: Workload,
    updated: Controller<ConfigMap>,
}

impl DeploymentUpdateScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context) -> Result<Self> {
        let settings = &ctx.settings;
        Ok(Self {
            workload: Workload::new(ctx, false)?,
            updated: ctx.config_map(&settings.index_name_changed, &settings.index_html_changed),
        })
    }
}

#[async_trait]
impl Scenario for DeploymentUpdateScenario {
    async fn start(&mut self) -> Result<()> {
        require_namespace(&self.workload.ctx).await?;
        self.workload.ensure(true).await?;
        self.updated.create_if_not_exists(false).await?;
        self.workload.flush_errors();
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let updated = self.updated.name().to_string();
        let d = &mut self.workload.deployment;
        d.change_config_map(&updated, true).await;
        d.wait_on_pods_scheduled(true).await;
        d.wait_on_pods_ready(true).await;
        d.check_pods_deleted(PodSet::Old, true).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let original = self.workload.config_map.name().to_string();
        self.workload.deployment.change_config_map(&original, false).await;
        self.workload.flush_errors();
        self.updated.flush_errors();
        Ok(())
    }
}

/// Scale the deployment to zero and confirm its pods go away.
pub struct DeploymentScaleScenario {
    workload: Workload,
}

impl DeploymentScaleScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context) -> Result<Self> {
        Ok(Self {
            workload: Workload::new(ctx, false)?,
        })
    }
}

#[async_trait]
impl Scenario for DeploymentScaleScenario {
    async fn start(&mut self) -> Result<()> {
        require_namespace(&self.workload.ctx).await?;
        self.workload.ensure(true).await?;
        self.workload.flush_errors();
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let d = &mut self.workload.deployment;
        d.scale(0, true).await;
        d.watch_pod_scaling(true).await;
        d.check_pods_deleted(PodSet::Current, true).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let replicas = self.workload.ctx.settings.replicas;
        self.workload.deployment.scale(replicas, false).await;
        self.workload.flush_errors();
        Ok(())
    }
}
