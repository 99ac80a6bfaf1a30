use super::{Scenario, Workload, require_namespace};
use crate::error::Result;
use crate::k8s::Context;
use crate::k8s::controller::Readable;
use crate::k8s::service::ServiceController;
use async_trait::async_trait;

/// A service with nothing behind it: created, read, deleted.
pub struct ServiceScenario {
    ctx: Context,
    service: ServiceController,
}

impl ServiceScenario {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            service: ServiceController::new(ctx, 0),
        }
    }
}

#[async_trait]
impl Scenario for ServiceScenario {
    async fn start(&mut self) -> Result<()> {
        require_namespace(&self.ctx).await
    }

    async fn run(&mut self) -> Result<()> {
        self.service.create(true).await?;
        self.service.exists(true).await;
        self.service.read_endpoints(true).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.service.delete(true).await;
        self.service.deleted(true).await;
        Ok(())
    }
}

/// A service in front of the running deployment.
///
/// Scaled, the deployment is taken to zero first and the endpoints are
/// expected to drain.
pub struct DeploymentServiceScenario {
    workload: Workload,
    service: ServiceController,
    scaled: bool,
}

impl DeploymentServiceScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context, scaled: bool) -> Result<Self> {
        let addresses = if scaled {
            0
        } else {
            usize::try_from(ctx.settings.replicas).unwrap_or(0)
        };
        Ok(Self {
            workload: Workload::new(ctx, false)?,
            service: ServiceController::new(ctx, addresses),
            scaled,
        })
    }

    /// Bring up the service and a ready deployment behind it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceGone` if the namespace disappears
    pub async fn start_fronted(workload: &mut Workload, service: &mut ServiceController) -> Result<()> {
        require_namespace(&workload.ctx).await?;
        service.create_if_not_exists(false).await?;
        workload.ensure(true).await
    }

    pub fn flush_errors(&mut self) {
        self.workload.flush_errors();
        self.service.flush_errors();
    }
}

#[async_trait]
impl Scenario for DeploymentServiceScenario {
    async fn start(&mut self) -> Result<()> {
        Self::start_fronted(&mut self.workload, &mut self.service).await?;
        if self.scaled {
            self.workload.deployment.scale(0, false).await;
            self.workload.deployment.watch_pod_scaling(false).await;
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        if self.scaled {
            self.service.watch_endpoints(true).await;
        } else {
            self.service.read_endpoints(true).await;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.scaled {
            let replicas = self.workload.ctx.settings.replicas;
            self.workload.deployment.scale(replicas, false).await;
            self.flush_errors();
        }
        Ok(())
    }
}
