use super::Scenario;
use crate::error::Result;
use crate::k8s::Context;
use crate::k8s::controller::Readable;
use crate::k8s::namespace::NamespaceController;
use async_trait::async_trait;

/// Create the namespace, check nothing leaked into it, delete it.
pub struct NamespaceScenario {
    namespace: NamespaceController,
}

impl NamespaceScenario {
    #[must_use]
    pub fn new(ctx: &Context) -> Self {
        Self {
            namespace: NamespaceController::new(ctx),
        }
    }
}

#[async_trait]
impl Scenario for NamespaceScenario {
    async fn start(&mut self) -> Result<()> {
        self.namespace.create(true).await?;
        self.namespace.exists(true).await;
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        self.namespace.check_empty(true).await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.namespace.delete(true).await;
        self.namespace.deleted(true).await;
        Ok(())
    }
}
