// ABOUTME: In-process reference driver registered as "memory".
// ABOUTME: Offers every capability without a real engine; used by the CLI demos and tests.

mod engine;
mod services;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::{Connection, Driver, Service, cancellable};
use crate::error::{Error, Result};

pub use engine::{ContainerRecord, ContainerStatus, Engine, GroupRecord, ImageRecord, MemoryError};
use services::{Backend, ContainerService, ImageService, NamespaceService, NetworkService};

pub const SCHEME: &str = "memory://";

/// Driver over an in-process [`Engine`].
///
/// Connections opened through the same driver share one engine, so state
/// created on one connection is visible on the next.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    engine: Arc<Engine>,
    open_delay: Duration,
    latency: Duration,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` take `delay` before the connection is ready.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Make every capability call take `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

fn validate_uri(uri: &str) -> Result<()> {
    if uri.is_empty() || uri.starts_with(SCHEME) {
        return Ok(());
    }
    Err(Error::InvalidUri {
        uri: uri.to_string(),
        reason: format!("expected an empty uri or one starting with {SCHEME}"),
    })
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn open(&self, cancel: &CancellationToken, uri: &str) -> Result<Box<dyn Connection>> {
        validate_uri(uri)?;

        if !self.open_delay.is_zero() {
            cancellable(cancel, async {
                tokio::time::sleep(self.open_delay).await;
                Ok(())
            })
            .await?;
        }

        self.engine.connection_opened();
        tracing::debug!(uri, "memory connection opened");
        Ok(Box::new(MemoryConnection {
            backend: Backend {
                engine: self.engine.clone(),
                latency: self.latency,
            },
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    backend: Backend,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    fn prepare(&self, service: &str) -> Result<Arc<dyn Service>> {
        let backend = self.backend.clone();
        let service: Arc<dyn Service> = match service {
            "images" => Arc::new(ImageService(backend)),
            "networks" => Arc::new(NetworkService(backend)),
            "namespaces" => Arc::new(NamespaceService(backend)),
            "containers" => Arc::new(ContainerService(backend)),
            other => return Err(Error::UnsupportedService(other.to_string())),
        };
        Ok(service)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.backend.engine.connection_closed();
        }
        Ok(())
    }
}
