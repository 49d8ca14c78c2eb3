// ABOUTME: Recording stub driver for exercising the core without an engine.
// ABOUTME: Echoes references back, logs every backend call and fails on demand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ocidrv::capability::{CreateOptions, ExecOutput, Creator, Execer, Puller, Starter};
use ocidrv::client::Handler;
use ocidrv::driver::{Connection, Driver, Handle, Service};
use ocidrv::error::{Error, Result};
use ocidrv::request::{Body, Request, Response};
use ocidrv::types::Method;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared, ordered log of backend calls.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.0.lock().iter().any(|e| e.starts_with(prefix))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubOptions {
    /// `open` never completes and ignores its token.
    pub hang_on_open: bool,
    /// `begin` fails with a backend error.
    pub fail_begin: bool,
    /// `create` on this service fails.
    pub failing_service: Option<&'static str>,
    /// Services only offer Puller.
    pub pull_only: bool,
    /// Every pull takes this long, ignoring its token.
    pub pull_delay: Duration,
    /// Serve PULL through a driver-provided handler.
    pub override_pull: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StubDriver {
    pub options: StubOptions,
    pub recorder: Recorder,
}

impl StubDriver {
    pub fn new(options: StubOptions) -> Self {
        Self {
            options,
            recorder: Recorder::default(),
        }
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn open(&self, _cancel: &CancellationToken, uri: &str) -> Result<Box<dyn Connection>> {
        if self.options.hang_on_open {
            std::future::pending::<()>().await;
        }
        self.recorder.record(format!("open {uri}"));
        Ok(Box::new(StubConnection {
            options: self.options.clone(),
            recorder: self.recorder.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.recorder.record("driver close");
        Ok(())
    }

    fn handler(&self, method: Method) -> Option<Arc<dyn Handler>> {
        if self.options.override_pull && method == Method::Pull {
            Some(Arc::new(FixedHandler("overridden")))
        } else {
            None
        }
    }
}

struct FixedHandler(&'static str);

#[async_trait]
impl Handler for FixedHandler {
    async fn serve(&self, _handle: &Handle, _req: Request) -> Result<Response> {
        Ok(Response::new(Body::from_bytes(self.0)))
    }
}

struct StubConnection {
    options: StubOptions,
    recorder: Recorder,
}

#[async_trait]
impl Connection for StubConnection {
    async fn begin(&self, _cancel: &CancellationToken) -> Result<()> {
        self.recorder.record("begin");
        if self.options.fail_begin {
            return Err(Error::backend("stub.begin", "handshake refused"));
        }
        Ok(())
    }

    fn prepare(&self, service: &str) -> Result<Arc<dyn Service>> {
        self.recorder.record(format!("prepare {service}"));
        Ok(Arc::new(StubService {
            name: service.to_string(),
            options: self.options.clone(),
            recorder: self.recorder.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.recorder.record("close");
        Ok(())
    }
}

struct StubService {
    name: String,
    options: StubOptions,
    recorder: Recorder,
}

impl Service for StubService {
    fn as_puller(&self) -> Option<&dyn Puller> {
        Some(self)
    }
    fn as_creator(&self) -> Option<&dyn Creator> {
        (!self.options.pull_only).then_some(self as &dyn Creator)
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        (!self.options.pull_only).then_some(self as &dyn Starter)
    }
    fn as_execer(&self) -> Option<&dyn Execer> {
        (!self.options.pull_only).then_some(self as &dyn Execer)
    }
}

#[async_trait]
impl Puller for StubService {
    /// Echo the reference back as the id.
    async fn pull(&self, _cancel: &CancellationToken, reference: &str) -> Result<String> {
        if !self.options.pull_delay.is_zero() {
            tokio::time::sleep(self.options.pull_delay).await;
        }
        self.recorder.record(format!("pull {reference}"));
        Ok(reference.to_string())
    }
}

#[async_trait]
impl Creator for StubService {
    async fn create(&self, _cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        if self.options.failing_service == Some(self.name.as_str()) {
            self.recorder.record(format!("create {} failed", self.name));
            return Err(Error::backend(
                format!("{}.create", self.name),
                "quota exceeded",
            ));
        }
        self.recorder.record(format!("create {}", self.name));
        Ok(match &options.image {
            Some(image) => format!("{}-from-{image}", self.name),
            None => format!("{}-1", self.name),
        })
    }
}

#[async_trait]
impl Starter for StubService {
    async fn start(&self, _cancel: &CancellationToken, id: &str) -> Result<()> {
        self.recorder.record(format!("start {id}"));
        Ok(())
    }
}

#[async_trait]
impl Execer for StubService {
    async fn exec(
        &self,
        _cancel: &CancellationToken,
        id: &str,
        argv: &[String],
    ) -> Result<ExecOutput> {
        self.recorder.record(format!("exec {id} {}", argv.join(" ")));
        Ok(ExecOutput {
            exit_code: 0,
            stdout: Bytes::from(argv.join(" ")),
            stderr: Bytes::new(),
        })
    }
}
