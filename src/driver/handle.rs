// ABOUTME: Connection-scoped capability handle returned by Conn::prepare.
// ABOUTME: Probes capabilities dynamically and fails cleanly once the connection closes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{Service, cancellable};
use crate::capability::{
    BoxReader, BoxWriter, Capability, CreateOptions, Creator, ExecOutput, Execer, Inspector,
    Killer, Lister, Mounter, Puller, Pusher, Remover, Signal, Starter, StderrSink, StdinSource,
    StdoutSink, Stopper,
};
use crate::error::{Error, Result};

/// A prepared service bound to the connection that produced it.
///
/// Cloning is cheap. Every accessor checks that the owning connection is
/// still open and that the service implements the capability, so misuse
/// surfaces as an error instead of a crash. The returned [`Live`] checks
/// again on every call.
#[derive(Clone)]
pub struct Handle {
    service: Arc<str>,
    inner: Arc<dyn Service>,
    closed: CancellationToken,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("service", &self.service)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Handle {
    pub(crate) fn new(service: &str, inner: Arc<dyn Service>, closed: CancellationToken) -> Self {
        Self {
            service: Arc::from(service),
            inner,
            closed,
        }
    }

    /// Name of the service this handle was prepared for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// True once the owning connection has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Whether the service implements `capability`. False on a closed handle.
    pub fn supports(&self, capability: Capability) -> bool {
        !self.is_closed() && self.probe_any(capability)
    }

    /// Every capability the service implements, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }

    fn probe_any(&self, capability: Capability) -> bool {
        let s = self.inner.as_ref();
        match capability {
            Capability::Pull => s.as_puller().is_some(),
            Capability::Push => s.as_pusher().is_some(),
            Capability::Create => s.as_creator().is_some(),
            Capability::Start => s.as_starter().is_some(),
            Capability::Stop => s.as_stopper().is_some(),
            Capability::Kill => s.as_killer().is_some(),
            Capability::Mount => s.as_mounter().is_some(),
            Capability::Exec => s.as_execer().is_some(),
            Capability::Inspect => s.as_inspector().is_some(),
            Capability::List => s.as_lister().is_some(),
            Capability::Remove => s.as_remover().is_some(),
            Capability::Stdin => s.as_stdin_source().is_some(),
            Capability::Stdout => s.as_stdout_sink().is_some(),
            Capability::Stderr => s.as_stderr_sink().is_some(),
        }
    }

    fn probe<'a, T: ?Sized>(
        &'a self,
        capability: Capability,
        get: impl FnOnce(&'a dyn Service) -> Option<&'a T>,
    ) -> Result<Live<'a, T>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let inner = get(self.inner.as_ref()).ok_or_else(|| Error::UnsupportedOperation {
            capability,
            service: self.service.to_string(),
        })?;
        Ok(Live {
            inner,
            closed: &self.closed,
        })
    }

    pub fn puller(&self) -> Result<Live<'_, dyn Puller + '_>> {
        self.probe(Capability::Pull, |s| s.as_puller())
    }

    pub fn pusher(&self) -> Result<Live<'_, dyn Pusher + '_>> {
        self.probe(Capability::Push, |s| s.as_pusher())
    }

    pub fn creator(&self) -> Result<Live<'_, dyn Creator + '_>> {
        self.probe(Capability::Create, |s| s.as_creator())
    }

    pub fn starter(&self) -> Result<Live<'_, dyn Starter + '_>> {
        self.probe(Capability::Start, |s| s.as_starter())
    }

    pub fn stopper(&self) -> Result<Live<'_, dyn Stopper + '_>> {
        self.probe(Capability::Stop, |s| s.as_stopper())
    }

    pub fn killer(&self) -> Result<Live<'_, dyn Killer + '_>> {
        self.probe(Capability::Kill, |s| s.as_killer())
    }

    pub fn mounter(&self) -> Result<Live<'_, dyn Mounter + '_>> {
        self.probe(Capability::Mount, |s| s.as_mounter())
    }

    pub fn execer(&self) -> Result<Live<'_, dyn Execer + '_>> {
        self.probe(Capability::Exec, |s| s.as_execer())
    }

    pub fn inspector(&self) -> Result<Live<'_, dyn Inspector + '_>> {
        self.probe(Capability::Inspect, |s| s.as_inspector())
    }

    pub fn lister(&self) -> Result<Live<'_, dyn Lister + '_>> {
        self.probe(Capability::List, |s| s.as_lister())
    }

    pub fn remover(&self) -> Result<Live<'_, dyn Remover + '_>> {
        self.probe(Capability::Remove, |s| s.as_remover())
    }

    pub fn stdin_source(&self) -> Result<Live<'_, dyn StdinSource + '_>> {
        self.probe(Capability::Stdin, |s| s.as_stdin_source())
    }

    pub fn stdout_sink(&self) -> Result<Live<'_, dyn StdoutSink + '_>> {
        self.probe(Capability::Stdout, |s| s.as_stdout_sink())
    }

    pub fn stderr_sink(&self) -> Result<Live<'_, dyn StderrSink + '_>> {
        self.probe(Capability::Stderr, |s| s.as_stderr_sink())
    }
}

/// A capability borrowed from a [`Handle`].
///
/// Implements the same trait as the capability it wraps. Calls fail with
/// [`Error::ConnectionClosed`] once the connection is gone, including calls
/// already in flight when it closes.
pub struct Live<'a, T: ?Sized> {
    inner: &'a T,
    closed: &'a CancellationToken,
}

impl<T: ?Sized> Live<'_, T> {
    async fn guard<R, F>(&self, cancel: &CancellationToken, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(Error::ConnectionClosed),
            result = cancellable(cancel, fut) => result,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Live<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Live")
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

macro_rules! live {
    ($trait:ident, $method:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        #[async_trait]
        impl<'a> $trait for Live<'a, dyn $trait + 'a> {
            async fn $method(&self, cancel: &CancellationToken, $($arg: $ty),*) -> Result<$ret> {
                self.guard(cancel, self.inner.$method(cancel, $($arg),*)).await
            }
        }
    };
}

live!(Puller, pull(reference: &str) -> String);
live!(Pusher, push(reference: &str, id: &str) -> ());
live!(Mounter, mount(id: &str, target: &str) -> ());
live!(Creator, create(options: &CreateOptions) -> String);
live!(Starter, start(id: &str) -> ());
live!(Stopper, stop(id: &str, timeout: Duration) -> ());
live!(Killer, kill(id: &str, signal: Signal) -> ());
live!(Remover, remove(id: &str) -> ());
live!(Execer, exec(id: &str, argv: &[String]) -> ExecOutput);
live!(Inspector, stat(id: &str) -> Bytes);
live!(Lister, list() -> Vec<String>);
live!(StdinSource, stdin(id: &str) -> BoxWriter);
live!(StdoutSink, stdout(id: &str) -> BoxReader);
live!(StderrSink, stderr(id: &str) -> BoxReader);
