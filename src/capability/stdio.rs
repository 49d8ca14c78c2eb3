// ABOUTME: Stdio stream capabilities for attaching to a container.
// ABOUTME: Stdin yields a writer; stdout and stderr yield readers.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

#[async_trait]
pub trait StdinSource: Send + Sync {
    /// Open a writer feeding the standard input of `id`. Shutting it down closes stdin.
    async fn stdin(&self, cancel: &CancellationToken, id: &str) -> Result<BoxWriter>;
}

#[async_trait]
pub trait StdoutSink: Send + Sync {
    async fn stdout(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader>;
}

#[async_trait]
pub trait StderrSink: Send + Sync {
    async fn stderr(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader>;
}
