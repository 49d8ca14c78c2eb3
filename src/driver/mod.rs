// ABOUTME: Backend contracts (Driver, Connection, Service) and the core connection wrapper.
// ABOUTME: Backends implement the traits; callers only ever see Conn and Handle.

mod conn;
mod handle;
pub mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capability::{
    Creator, Execer, Inspector, Killer, Lister, Mounter, Puller, Pusher, Remover, Starter,
    StderrSink, StdinSource, StdoutSink, Stopper,
};
use crate::client::Handler;
use crate::error::{Error, Result};
use crate::types::Method;

pub use conn::Conn;
pub use handle::{Handle, Live};
pub use registry::{
    Registry, RegistrationError, drivers, global, lookup, open, register, try_register,
};

/// A pluggable adapter for one container engine.
///
/// Drivers register under a short name and open any number of connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Establish a session with the engine at `uri`.
    ///
    /// The uri format is driver-specific (socket path, tcp endpoint, ...).
    /// Implementations should stop work when `cancel` fires.
    async fn open(&self, cancel: &CancellationToken, uri: &str) -> Result<Box<dyn Connection>>;

    /// Release resources held by the driver itself, not by its connections.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Override the dispatch handler for `method`. `None` uses capability dispatch.
    fn handler(&self, _method: Method) -> Option<Arc<dyn Handler>> {
        None
    }
}

/// A live session with one engine endpoint, as implemented by a backend.
///
/// The core wraps this in [`Conn`], which makes `begin` and `close`
/// idempotent and invalidates handles on close, so backends only need to
/// implement the happy path of each call.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Session-scoped initialisation (handshake, version negotiation).
    async fn begin(&self, cancel: &CancellationToken) -> Result<()>;

    /// Resolve a service name such as `"images"` to its capability surface.
    ///
    /// Unknown names must fail with [`Error::UnsupportedService`].
    fn prepare(&self, service: &str) -> Result<Arc<dyn Service>>;

    async fn close(&self) -> Result<()>;
}

/// The capability surface of one service on one connection.
///
/// Each probe returns `Some` only when the service implements that capability.
/// There is no list of supported operations beyond these answers.
pub trait Service: Send + Sync {
    fn as_puller(&self) -> Option<&dyn Puller> {
        None
    }
    fn as_pusher(&self) -> Option<&dyn Pusher> {
        None
    }
    fn as_creator(&self) -> Option<&dyn Creator> {
        None
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        None
    }
    fn as_stopper(&self) -> Option<&dyn Stopper> {
        None
    }
    fn as_killer(&self) -> Option<&dyn Killer> {
        None
    }
    fn as_mounter(&self) -> Option<&dyn Mounter> {
        None
    }
    fn as_execer(&self) -> Option<&dyn Execer> {
        None
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        None
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        None
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        None
    }
    fn as_stdin_source(&self) -> Option<&dyn StdinSource> {
        None
    }
    fn as_stdout_sink(&self) -> Option<&dyn StdoutSink> {
        None
    }
    fn as_stderr_sink(&self) -> Option<&dyn StderrSink> {
        None
    }
}

/// Run `fut`, giving up with [`Error::Cancelled`] as soon as `cancel` fires.
///
/// An already-cancelled token never polls `fut`.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellable_returns_result_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancellable_skips_future_on_cancelled_token() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let cancel = CancellationToken::new();
        cancel.cancel();
        let polled = AtomicBool::new(false);
        let result: Result<()> = cancellable(&cancel, async {
            polled.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancellable_unblocks_pending_future() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<()> = cancellable(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
