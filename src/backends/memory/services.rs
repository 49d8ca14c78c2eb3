// ABOUTME: Capability implementations of the memory backend, one struct per service.
// ABOUTME: Every call is paced by the configured latency and honours cancellation.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::engine::{Engine, MemoryError};
use crate::capability::{
    BoxReader, BoxWriter, CreateOptions, Creator, ExecOutput, Execer, Inspector, Killer, Lister,
    Mounter, Puller, Pusher, Remover, Signal, Starter, StderrSink, StdinSource, StdoutSink,
    Stopper,
};
use crate::driver::{Service, cancellable};
use crate::error::{Error, Result};

const STDIN_BUFFER: usize = 64 * 1024;

/// What every service of one connection shares.
#[derive(Debug, Clone)]
pub(super) struct Backend {
    pub engine: Arc<Engine>,
    pub latency: Duration,
}

impl Backend {
    /// Simulate the round trip of a real engine call.
    async fn pace(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, async {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            Ok(())
        })
        .await
    }

    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        call: &'static str,
        op: impl FnOnce(&Engine) -> std::result::Result<T, MemoryError>,
    ) -> Result<T> {
        self.pace(cancel).await?;
        op(&self.engine).map_err(|e| Error::backend(call, e))
    }
}

fn to_json(record: &impl Serialize) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec_pretty(record)?))
}

fn reader(bytes: Bytes) -> BoxReader {
    Box::pin(Cursor::new(bytes))
}

pub(super) struct ImageService(pub Backend);

impl Service for ImageService {
    fn as_puller(&self) -> Option<&dyn Puller> {
        Some(self)
    }
    fn as_pusher(&self) -> Option<&dyn Pusher> {
        Some(self)
    }
    fn as_mounter(&self) -> Option<&dyn Mounter> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Puller for ImageService {
    async fn pull(&self, cancel: &CancellationToken, reference: &str) -> Result<String> {
        self.0.call(cancel, "images.pull", |e| e.pull(reference)).await
    }
}

#[async_trait]
impl Pusher for ImageService {
    async fn push(&self, cancel: &CancellationToken, reference: &str, id: &str) -> Result<()> {
        self.0
            .call(cancel, "images.push", |e| e.push(reference, id))
            .await
    }
}

#[async_trait]
impl Mounter for ImageService {
    async fn mount(&self, cancel: &CancellationToken, id: &str, target: &str) -> Result<()> {
        self.0
            .call(cancel, "images.mount", |e| e.mount(id, target))
            .await
    }
}

#[async_trait]
impl Inspector for ImageService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let record = self.0.call(cancel, "images.stat", |e| e.image(id)).await?;
        to_json(&record)
    }
}

#[async_trait]
impl Lister for ImageService {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.0.call(cancel, "images.list", |e| Ok(e.image_ids())).await
    }
}

#[async_trait]
impl Remover for ImageService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.0
            .call(cancel, "images.remove", |e| e.remove_image(id))
            .await
    }
}

pub(super) struct NetworkService(pub Backend);

impl Service for NetworkService {
    fn as_creator(&self) -> Option<&dyn Creator> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Creator for NetworkService {
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        self.0
            .call(cancel, "networks.create", |e| e.create_network(options))
            .await
    }
}

#[async_trait]
impl Inspector for NetworkService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let record = self.0.call(cancel, "networks.stat", |e| e.network(id)).await?;
        to_json(&record)
    }
}

#[async_trait]
impl Lister for NetworkService {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.0
            .call(cancel, "networks.list", |e| Ok(e.network_ids()))
            .await
    }
}

#[async_trait]
impl Remover for NetworkService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.0
            .call(cancel, "networks.remove", |e| e.remove_network(id))
            .await
    }
}

pub(super) struct NamespaceService(pub Backend);

impl Service for NamespaceService {
    fn as_creator(&self) -> Option<&dyn Creator> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Creator for NamespaceService {
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        self.0
            .call(cancel, "namespaces.create", |e| e.create_namespace(options))
            .await
    }
}

#[async_trait]
impl Inspector for NamespaceService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let record = self
            .0
            .call(cancel, "namespaces.stat", |e| e.namespace(id))
            .await?;
        to_json(&record)
    }
}

#[async_trait]
impl Lister for NamespaceService {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.0
            .call(cancel, "namespaces.list", |e| Ok(e.namespace_ids()))
            .await
    }
}

#[async_trait]
impl Remover for NamespaceService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.0
            .call(cancel, "namespaces.remove", |e| e.remove_namespace(id))
            .await
    }
}

pub(super) struct ContainerService(pub Backend);

impl Service for ContainerService {
    fn as_creator(&self) -> Option<&dyn Creator> {
        Some(self)
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        Some(self)
    }
    fn as_stopper(&self) -> Option<&dyn Stopper> {
        Some(self)
    }
    fn as_killer(&self) -> Option<&dyn Killer> {
        Some(self)
    }
    fn as_execer(&self) -> Option<&dyn Execer> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
    fn as_stdin_source(&self) -> Option<&dyn StdinSource> {
        Some(self)
    }
    fn as_stdout_sink(&self) -> Option<&dyn StdoutSink> {
        Some(self)
    }
    fn as_stderr_sink(&self) -> Option<&dyn StderrSink> {
        Some(self)
    }
}

#[async_trait]
impl Creator for ContainerService {
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        self.0
            .call(cancel, "containers.create", |e| e.create_container(options))
            .await
    }
}

#[async_trait]
impl Starter for ContainerService {
    async fn start(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.0.call(cancel, "containers.start", |e| e.start(id)).await
    }
}

#[async_trait]
impl Stopper for ContainerService {
    // The memory engine stops instantly, so the grace period never runs out.
    async fn stop(&self, cancel: &CancellationToken, id: &str, _timeout: Duration) -> Result<()> {
        self.0.call(cancel, "containers.stop", |e| e.stop(id)).await
    }
}

#[async_trait]
impl Killer for ContainerService {
    async fn kill(&self, cancel: &CancellationToken, id: &str, signal: Signal) -> Result<()> {
        self.0
            .call(cancel, "containers.kill", |e| e.kill(id, signal))
            .await
    }
}

#[async_trait]
impl Execer for ContainerService {
    async fn exec(
        &self,
        cancel: &CancellationToken,
        id: &str,
        argv: &[String],
    ) -> Result<ExecOutput> {
        self.0
            .call(cancel, "containers.exec", |e| e.exec(id, argv))
            .await
    }
}

#[async_trait]
impl Inspector for ContainerService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let record = self
            .0
            .call(cancel, "containers.stat", |e| e.container(id))
            .await?;
        to_json(&record)
    }
}

#[async_trait]
impl Lister for ContainerService {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.0
            .call(cancel, "containers.list", |e| Ok(e.container_ids()))
            .await
    }
}

#[async_trait]
impl Remover for ContainerService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        self.0
            .call(cancel, "containers.remove", |e| e.remove_container(id))
            .await
    }
}

/// Stdin is wired to the container's stdout, so the container behaves like `cat`.
#[async_trait]
impl StdinSource for ContainerService {
    async fn stdin(&self, cancel: &CancellationToken, id: &str) -> Result<BoxWriter> {
        let running = self
            .0
            .call(cancel, "containers.stdin", |e| e.is_running(id))
            .await?;
        if !running {
            return Err(Error::backend(
                "containers.stdin",
                format!("container {id} is not running"),
            ));
        }

        let (writer, mut reader) = tokio::io::duplex(STDIN_BUFFER);
        let engine = self.0.engine.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = engine.append_stdout(&id, &buf[..n]) {
                            tracing::debug!(container = %id, "stdin dropped: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(container = %id, "stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(writer))
    }
}

/// Snapshot of everything written to stdout so far.
#[async_trait]
impl StdoutSink for ContainerService {
    async fn stdout(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader> {
        let log = self
            .0
            .call(cancel, "containers.stdout", |e| e.stdout_log(id))
            .await?;
        Ok(reader(log))
    }
}

#[async_trait]
impl StderrSink for ContainerService {
    async fn stderr(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader> {
        let log = self
            .0
            .call(cancel, "containers.stderr", |e| e.stderr_log(id))
            .await?;
        Ok(reader(log))
    }
}
