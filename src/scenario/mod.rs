//! Test suites: ordered sequences of controller calls run as start, run and
//! finish. `finish` tears down and is also what runs on Ctrl-C.

mod deployment;
mod http;
mod namespace;
mod service;

pub use deployment::{DeploymentScenario, DeploymentScaleScenario, DeploymentUpdateScenario, Workload};
pub use http::{HttpScenario, HttpUpdateScenario};
pub use namespace::NamespaceScenario;
pub use service::{DeploymentServiceScenario, ServiceScenario};

use crate::error::{Error, Result};
use crate::k8s::Context;
use crate::k8s::controller::Readable;
use crate::k8s::namespace::NamespaceController;
use async_trait::async_trait;
use clap::ValueEnum;

#[async_trait]
pub trait Scenario: Send {
    async fn start(&mut self) -> Result<()>;

    async fn run(&mut self) -> Result<()>;

    async fn finish(&mut self) -> Result<()>;

    async fn exec(&mut self) -> Result<()> {
        self.start().await?;
        self.run().await?;
        self.finish().await
    }
}

/// Every suite the runner knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Suite {
    Namespace,
    Deployment,
    DeploymentPvc,
    DeploymentUpdate,
    DeploymentScale,
    Service,
    DeploymentService,
    DeploymentScaleService,
    Http,
    HttpUpdate,
}

impl Suite {
    /// # Errors
    ///
    /// Will return `Err` if a resource body cannot be built
    pub fn build(self, ctx: &Context) -> Result<Box<dyn Scenario>> {
        Ok(match self {
            Self::Namespace => Box::new(NamespaceScenario::new(ctx)),
            Self::Deployment => Box::new(DeploymentScenario::new(ctx, false)?),
            Self::DeploymentPvc => Box::new(DeploymentScenario::new(ctx, true)?),
            Self::DeploymentUpdate => Box::new(DeploymentUpdateScenario::new(ctx)?),
            Self::DeploymentScale => Box::new(DeploymentScaleScenario::new(ctx)?),
            Self::Service => Box::new(ServiceScenario::new(ctx)),
            Self::DeploymentService => Box::new(DeploymentServiceScenario::new(ctx, false)?),
            Self::DeploymentScaleService => Box::new(DeploymentServiceScenario::new(ctx, true)?),
            Self::Http => Box::new(HttpScenario::new(ctx)?),
            Self::HttpUpdate => Box::new(HttpUpdateScenario::new(ctx)?),
        })
    }
}

/// Fail fast when the namespace under test is missing.
///
/// # Errors
///
/// Returns `Error::MissingPrerequisite` when the namespace cannot be read
pub async fn require_namespace(ctx: &Context) -> Result<()> {
    let mut namespace = NamespaceController::new(ctx);
    if namespace.exists(false).await {
        Ok(())
    } else {
        Err(Error::MissingPrerequisite(format!(
            "namespace {} does not exist",
            ctx.namespace()
        )))
    }
}
