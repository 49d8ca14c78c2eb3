// ABOUTME: The Step contract executed by Chain::commit, and the context steps share.
// ABOUTME: Provisioned threads resource ids from earlier steps to later ones.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::{Conn, Handle};
use crate::error::Result;
use crate::types::{ContainerId, ImageId, NamespaceId, NetworkId};

/// Resources created so far by a chain.
#[derive(Debug, Clone, Default)]
pub struct Provisioned {
    pub image: Option<ImageId>,
    pub network: Option<NetworkId>,
    pub namespace: Option<NamespaceId>,
    pub container: Option<ContainerId>,
}

/// What a step sees while it runs.
pub struct StepContext<'a> {
    pub conn: &'a Conn,
    pub cancel: &'a CancellationToken,
    /// The reference the chain was built for.
    pub reference: &'a str,
    pub provisioned: &'a mut Provisioned,
}

impl StepContext<'_> {
    pub fn handle(&self, service: &str) -> Result<Handle> {
        self.conn.prepare(service)
    }
}

/// One deferred unit of work in a chain.
#[async_trait]
pub trait Step: Send + Sync {
    /// Short name used in logs and in `Chain::step_names`.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()>;
}

/// A step built from a closure taking the commit's cancellation token.
pub struct FnStep<F> {
    name: String,
    f: F,
}

impl<F> FnStep<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        (self.f)(ctx.cancel.clone()).await
    }
}
