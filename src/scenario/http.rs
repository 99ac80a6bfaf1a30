use super::service::DeploymentServiceScenario;
use super::{Scenario, Workload};
use crate::error::Result;
use crate::k8s::Context;
use crate::k8s::controller::Controller;
use crate::k8s::service::ServiceController;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

/// Traffic through the service (by IP and DNS name) and to each pod,
/// then the pod logs are checked for every request.
pub struct HttpScenario {
    workload: Workload,
    service: ServiceController,
}

impl HttpScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context) -> Result<Self> {
        let replicas = usize::try_from(ctx.settings.replicas).unwrap_or(0);
        Ok(Self {
            workload: Workload::new(ctx, false)?,
            service: ServiceController::new(ctx, replicas),
        })
    }
}

#[async_trait]
impl Scenario for HttpScenario {
    async fn start(&mut self) -> Result<()> {
        DeploymentServiceScenario::start_fronted(&mut self.workload, &mut self.service).await
    }

    async fn run(&mut self) -> Result<()> {
        let settings = self.workload.ctx.settings.clone();
        let n = settings.service_requests;
        let expected = settings.index_html.as_str();

        self.workload.deployment.begin_request_window();
        self.service.request_n_times(n, expected, false, true).await;
        self.service.request_n_times(n, expected, true, true).await;
        self.workload
            .deployment
            .http_request_all_pods(expected, true)
            .await;
        self.workload
            .deployment
            .validate_pod_log(n * 2, &settings.user_agent, true)
            .await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Switch the deployment to the second config map and check traffic
/// serves the new page.
pub struct HttpUpdateScenario {
    workload: Workload,
    service: ServiceController,
    updated: Controller<ConfigMap>,
}

impl HttpUpdateScenario {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn new(ctx: &Context) -> Result<Self> {
        let settings = &ctx.settings;
        let replicas = usize::try_from(settings.replicas).unwrap_or(0);
        Ok(Self {
            workload: Workload::new(ctx, false)?,
            service: ServiceController::new(ctx, replicas),
            updated: ctx.config_map(&settings.index_name_changed, &settings.index_html_changed),
        })
    }
}

#[async_trait]
impl Scenario for HttpUpdateScenario {
    async fn start(&mut self) -> Result<()> {
        DeploymentServiceScenario::start_fronted(&mut self.workload, &mut self.service).await?;
        self.updated.create_if_not_exists(false).await?;
        let updated = self.updated.name().to_string();
        let deployment = &mut self.workload.deployment;
        deployment.change_config_map(&updated, false).await;
        deployment.wait_on_pods_ready(false).await;
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let settings = self.workload.ctx.settings.clone();
        let expected = settings.index_html_changed.as_str();
        self.service
            .request_n_times(settings.service_requests, expected, false, true)
            .await;
        self.workload
            .deployment
            .http_request_all_pods(expected, true)
            .await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let original = self.workload.config_map.name().to_string();
        self.workload
            .deployment
            .change_config_map(&original, false)
            .await;
        self.workload.flush_errors();
        self.updated.flush_errors();
        Ok(())
    }
}
