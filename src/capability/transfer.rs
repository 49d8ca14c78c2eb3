// ABOUTME: Capabilities that move content: pull from and push to a registry, mount.
// ABOUTME: Each trait declares exactly one operation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Fetch a resource (usually an image) by reference.
#[async_trait]
pub trait Puller: Send + Sync {
    /// Pull `reference` and return the backend id of the local copy.
    async fn pull(&self, cancel: &CancellationToken, reference: &str) -> Result<String>;
}

/// Publish a local resource under a remote reference.
#[async_trait]
pub trait Pusher: Send + Sync {
    /// Push the local resource `id` to `reference`.
    async fn push(&self, cancel: &CancellationToken, reference: &str, id: &str) -> Result<()>;
}

/// Mount a resource's filesystem at a target path.
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, cancel: &CancellationToken, id: &str, target: &str) -> Result<()>;
}
