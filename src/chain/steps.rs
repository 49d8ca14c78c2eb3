// ABOUTME: Built-in provisioning steps: pull, network, namespace, container, start, exec.
// ABOUTME: Each step resolves its service per run and records what it created.

use async_trait::async_trait;

use super::step::{Step, StepContext};
use crate::capability::{CreateOptions, Creator, Execer, Puller, Starter};
use crate::error::{Error, Result};
use crate::types::{ContainerId, ImageId, NamespaceId, NetworkId};

pub(crate) const IMAGES: &str = "images";
pub(crate) const NETWORKS: &str = "networks";
pub(crate) const NAMESPACES: &str = "namespaces";
pub(crate) const CONTAINERS: &str = "containers";

fn require_container(ctx: &StepContext<'_>, step: &str) -> Result<ContainerId> {
    ctx.provisioned
        .container
        .clone()
        .ok_or_else(|| Error::MissingPrerequisite {
            step: step.to_string(),
            resource: "container",
        })
}

/// Pull the chain's reference.
#[derive(Debug, Default)]
pub struct PullImage;

#[async_trait]
impl Step for PullImage {
    fn name(&self) -> &str {
        "pull_image"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let handle = ctx.handle(IMAGES)?;
        let id = handle.puller()?.pull(ctx.cancel, ctx.reference).await?;
        tracing::info!(reference = ctx.reference, id = %id, "image pulled");
        ctx.provisioned.image = Some(ImageId::new(id));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NewNetwork {
    pub options: CreateOptions,
}

#[async_trait]
impl Step for NewNetwork {
    fn name(&self) -> &str {
        "new_network"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let handle = ctx.handle(NETWORKS)?;
        let id = handle.creator()?.create(ctx.cancel, &self.options).await?;
        tracing::info!(id = %id, "network created");
        ctx.provisioned.network = Some(NetworkId::new(id));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NewNamespace {
    pub options: CreateOptions,
}

#[async_trait]
impl Step for NewNamespace {
    fn name(&self) -> &str {
        "new_namespace"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let handle = ctx.handle(NAMESPACES)?;
        let id = handle.creator()?.create(ctx.cancel, &self.options).await?;
        tracing::info!(id = %id, "namespace created");
        ctx.provisioned.namespace = Some(NamespaceId::new(id));
        Ok(())
    }
}

/// Create a container. Unset image, network and namespace are taken from
/// earlier steps; the image falls back to the chain's reference.
#[derive(Debug, Default)]
pub struct NewContainer {
    pub options: CreateOptions,
}

impl NewContainer {
    fn resolve(&self, ctx: &StepContext<'_>) -> CreateOptions {
        let mut options = self.options.clone();
        if options.image.is_none() {
            options.image = Some(match &ctx.provisioned.image {
                Some(image) => image.to_string(),
                None => ctx.reference.to_string(),
            });
        }
        if options.network.is_none() {
            options.network = ctx.provisioned.network.as_ref().map(|n| n.to_string());
        }
        if options.namespace.is_none() {
            options.namespace = ctx.provisioned.namespace.as_ref().map(|n| n.to_string());
        }
        options
    }
}

#[async_trait]
impl Step for NewContainer {
    fn name(&self) -> &str {
        "new_container"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let options = self.resolve(ctx);
        let handle = ctx.handle(CONTAINERS)?;
        let id = handle.creator()?.create(ctx.cancel, &options).await?;
        tracing::info!(id = %id, image = ?options.image, "container created");
        ctx.provisioned.container = Some(ContainerId::new(id));
        Ok(())
    }
}

/// Start the container created by an earlier step.
#[derive(Debug, Default)]
pub struct StartContainer;

#[async_trait]
impl Step for StartContainer {
    fn name(&self) -> &str {
        "start_container"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let container = require_container(ctx, self.name())?;
        let handle = ctx.handle(CONTAINERS)?;
        handle.starter()?.start(ctx.cancel, container.as_str()).await?;
        tracing::info!(id = %container, "container started");
        Ok(())
    }
}

/// Run a command in the container created by an earlier step.
#[derive(Debug)]
pub struct Exec {
    pub argv: Vec<String>,
}

#[async_trait]
impl Step for Exec {
    fn name(&self) -> &str {
        "exec"
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let container = require_container(ctx, self.name())?;
        let handle = ctx.handle(CONTAINERS)?;
        let output = handle
            .execer()?
            .exec(ctx.cancel, container.as_str(), &self.argv)
            .await?
            .into_result()?;
        tracing::info!(id = %container, argv = ?self.argv, "command finished");
        tracing::debug!(stdout = %String::from_utf8_lossy(&output.stdout), "exec output");
        Ok(())
    }
}
