// ABOUTME: Client coupling one driver with one connection.
// ABOUTME: Requests dispatch concurrently under a shared lock; close takes it exclusively.

pub mod handler;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::driver::{self, Conn, Driver, cancellable};
use crate::error::{Error, Result};
use crate::request::{Request, Response};
use crate::types::{Kind, Method};

pub use handler::Handler;

/// A driver and one of its connections.
///
/// Any number of tasks may call [`Client::execute`] at once; [`Client::close`]
/// waits for them to finish, then clears the connection so later requests
/// fail with [`Error::NoConnection`].
pub struct Client {
    driver: Arc<dyn Driver>,
    conn: RwLock<Option<Conn>>,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Wrap an already opened connection.
    pub fn new(driver: Arc<dyn Driver>, conn: Conn) -> Self {
        Self {
            driver,
            conn: RwLock::new(Some(conn)),
            request_timeout: None,
        }
    }

    /// Open and begin a connection through a registered driver.
    pub async fn connect(cancel: &CancellationToken, name: &str, uri: &str) -> Result<Self> {
        let driver =
            driver::lookup(name).ok_or_else(|| Error::UnregisteredDriver(name.to_string()))?;
        let conn = driver::registry::open_with(driver.as_ref(), name, cancel, uri).await?;

        if let Err(e) = conn.begin(cancel).await {
            if let Err(close_err) = conn.close().await {
                tracing::debug!(driver = name, "close after failed begin: {}", close_err);
            }
            return Err(e);
        }

        Ok(Self::new(driver, conn))
    }

    /// Connect using the driver, uri and timeouts from `config`.
    pub async fn from_config(cancel: &CancellationToken, config: &Config) -> Result<Self> {
        let limit = config.open_timeout;
        let client = tokio::time::timeout(limit, Self::connect(cancel, &config.driver, &config.uri))
            .await
            .map_err(|_| Error::Timeout(limit))??;
        Ok(client.with_request_timeout(config.request_timeout))
    }

    /// Fail requests that take longer than `timeout`. `None` waits forever.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.read().await.is_some()
    }

    /// Borrow the live connection, e.g. to build a chain.
    ///
    /// Holding the guard blocks [`Client::close`].
    pub async fn conn(&self) -> Result<RwLockReadGuard<'_, Conn>> {
        RwLockReadGuard::try_map(self.conn.read().await, Option::as_ref)
            .map_err(|_| Error::NoConnection)
    }

    /// Dispatch `req` to the handler for its method.
    pub async fn execute(&self, req: Request) -> Result<Response> {
        let conn = self.conn().await?;

        let method = req.method();
        let handle = conn.prepare(req.kind().service())?;
        let handler = self
            .driver
            .handler(method)
            .unwrap_or_else(|| handler::for_method(method));

        tracing::debug!(
            driver = conn.driver(),
            method = %method,
            kind = %req.kind(),
            "dispatching request"
        );

        let cancel = req.cancel_token().clone();
        let serve = cancellable(&cancel, handler.serve(&handle, req));
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, serve)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => serve.await,
        }
    }

    /// Pull `reference` as an image. Returns the response carrying the image id.
    pub async fn pull(&self, cancel: &CancellationToken, reference: &str) -> Result<Response> {
        let req = Request::builder(Method::Pull, Kind::Image)
            .reference(reference)
            .cancel(cancel.clone())
            .build()?;
        self.execute(req).await
    }

    /// Inspect the resource `id` of class `kind`.
    pub async fn inspect(&self, cancel: &CancellationToken, kind: Kind, id: &str) -> Result<Bytes> {
        let req = Request::builder(Method::Inspect, kind)
            .id(id)
            .cancel(cancel.clone())
            .build()?;
        self.execute(req).await?.bytes().await
    }

    /// Close the connection. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut conn = self.conn.write().await;
        match conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}
