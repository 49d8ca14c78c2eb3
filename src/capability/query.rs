// ABOUTME: Read-only capabilities: inspect one resource, list all of them.
// ABOUTME: Inspection output is the backend's own JSON document.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

#[async_trait]
pub trait Inspector: Send + Sync {
    /// Return the backend's description of `id`, usually a JSON document.
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes>;
}

#[async_trait]
pub trait Lister: Send + Sync {
    /// Return the ids of every resource the service knows about.
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>>;
}
