// ABOUTME: Core wrapper around a backend connection.
// ABOUTME: Makes begin/close idempotent, caches prepared handles and invalidates them on close.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::handle::Handle;
use super::{Connection, cancellable};
use crate::chain::Chain;
use crate::error::{Error, Result};

/// An open session with one engine, owned by whoever opened it.
///
/// Lifecycle: open → `begin` → any number of `prepare` calls → `close`.
/// `begin` and `close` may be called repeatedly; only the first call does
/// any work.
pub struct Conn {
    driver: String,
    uri: String,
    inner: Box<dyn Connection>,
    begun: AtomicBool,
    closed: CancellationToken,
    lifecycle: tokio::sync::Mutex<()>,
    handles: Mutex<HashMap<String, Handle>>,
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("driver", &self.driver)
            .field("uri", &self.uri)
            .field("begun", &self.is_begun())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Conn {
    /// Wrap a freshly opened backend connection.
    pub fn new(
        driver: impl Into<String>,
        uri: impl Into<String>,
        inner: Box<dyn Connection>,
    ) -> Self {
        Self {
            driver: driver.into(),
            uri: uri.into(),
            inner,
            begun: AtomicBool::new(false),
            closed: CancellationToken::new(),
            lifecycle: tokio::sync::Mutex::new(()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the driver that opened this connection.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_begun(&self) -> bool {
        self.begun.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Run the session handshake. Later calls are no-ops.
    pub async fn begin(&self, cancel: &CancellationToken) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.is_begun() {
            tracing::debug!(driver = %self.driver, "connection already begun");
            return Ok(());
        }

        cancellable(cancel, self.inner.begin(cancel)).await?;
        self.begun.store(true, Ordering::Release);
        tracing::debug!(driver = %self.driver, uri = %self.uri, "connection begun");
        Ok(())
    }

    /// Resolve `service` to a capability handle scoped to this connection.
    pub fn prepare(&self, service: &str) -> Result<Handle> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if !self.is_begun() {
            return Err(Error::NotBegun);
        }

        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(service) {
            return Ok(handle.clone());
        }

        let inner = self.inner.prepare(service)?;
        let handle = Handle::new(service, inner, self.closed.child_token());
        handles.insert(service.to_string(), handle.clone());
        tracing::debug!(driver = %self.driver, service, "service prepared");
        Ok(handle)
    }

    /// Start an operation chain against this connection.
    pub fn chain(&self, reference: impl Into<String>) -> Chain<'_> {
        Chain::new(self, reference)
    }

    /// Close the session. Handles from `prepare` stop working immediately.
    ///
    /// Closing twice is not an error. If the backend fails to close, the
    /// connection still counts as closed and the error is returned once.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.is_closed() {
            tracing::debug!(driver = %self.driver, "connection already closed");
            return Ok(());
        }

        self.closed.cancel();
        self.handles.lock().clear();

        let result = self.inner.close().await;
        match &result {
            Ok(()) => tracing::debug!(driver = %self.driver, uri = %self.uri, "connection closed"),
            Err(e) => tracing::warn!(driver = %self.driver, "backend close failed: {}", e),
        }
        result
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if !self.closed.is_cancelled() {
            tracing::debug!(driver = %self.driver, "connection dropped without close");
            self.closed.cancel();
        }
    }
}
