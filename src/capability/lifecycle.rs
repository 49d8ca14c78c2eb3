// ABOUTME: Lifecycle capabilities: create, start, stop, kill and remove resources.
// ABOUTME: Each trait declares exactly one operation.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::shared_types::{CreateOptions, Signal};
use crate::error::Result;

/// Create a resource (container, network, namespace, ...).
#[async_trait]
pub trait Creator: Send + Sync {
    /// Create a resource and return its backend id.
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String>;
}

#[async_trait]
pub trait Starter: Send + Sync {
    async fn start(&self, cancel: &CancellationToken, id: &str) -> Result<()>;
}

#[async_trait]
pub trait Stopper: Send + Sync {
    /// Stop gracefully, waiting at most `timeout` before the backend escalates.
    async fn stop(&self, cancel: &CancellationToken, id: &str, timeout: Duration)
        -> Result<()>;
}

#[async_trait]
pub trait Killer: Send + Sync {
    async fn kill(&self, cancel: &CancellationToken, id: &str, signal: Signal) -> Result<()>;
}

#[async_trait]
pub trait Remover: Send + Sync {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()>;
}
