// ABOUTME: Request handlers, one per Method, dispatching through capability probes.
// ABOUTME: Drivers may override any of them via Driver::handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{CreateOptions, Creator, Execer, Inspector, Puller, Pusher, Starter};
use crate::driver::Handle;
use crate::error::{Error, Result};
use crate::request::{Body, Request, Response};
use crate::types::Method;

/// Serves one request against a prepared service.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response>;
}

/// The built-in handler for `method`.
pub fn for_method(method: Method) -> Arc<dyn Handler> {
    match method {
        Method::Pull => Arc::new(PullHandler),
        Method::Push => Arc::new(PushHandler),
        Method::Inspect => Arc::new(InspectHandler),
        Method::Exec => Arc::new(ExecHandler),
        Method::Run => Arc::new(RunHandler),
    }
}

/// PULL: body is the id of the pulled resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullHandler;

#[async_trait]
impl Handler for PullHandler {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response> {
        let parts = req.into_parts();
        let puller = handle.puller()?;
        let id = puller.pull(&parts.cancel, &parts.reference).await?;
        Ok(Response::new(Body::from_bytes(id)))
    }
}

/// PUSH: pushes `id` to `reference`; empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushHandler;

#[async_trait]
impl Handler for PushHandler {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response> {
        let parts = req.into_parts();
        let pusher = handle.pusher()?;
        pusher.push(&parts.cancel, &parts.reference, &parts.id).await?;
        Ok(Response::empty())
    }
}

/// INSPECT: stats the id, falling back to the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectHandler;

#[async_trait]
impl Handler for InspectHandler {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response> {
        let parts = req.into_parts();
        let target = if parts.id.is_empty() {
            parts.reference
        } else {
            parts.id
        };
        if target.is_empty() {
            return Err(Error::InvalidRequest(
                "INSPECT requires an id or a reference".to_string(),
            ));
        }

        let inspector = handle.inspector()?;
        let stat = inspector.stat(&parts.cancel, &target).await?;
        Ok(Response::new(Body::from_bytes(stat)))
    }
}

/// EXEC: the request body is a JSON array of argv strings; body is stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecHandler;

#[async_trait]
impl Handler for ExecHandler {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response> {
        let parts = req.into_parts();
        if parts.id.is_empty() {
            return Err(Error::InvalidRequest(
                "EXEC requires a target id".to_string(),
            ));
        }
        let mut body = parts
            .body
            .ok_or_else(|| Error::InvalidRequest("EXEC requires an argv body".to_string()))?;

        let raw = body.bytes().await?;
        let argv: Vec<String> = serde_json::from_slice(&raw).map_err(|e| {
            Error::InvalidRequest(format!("EXEC body must be a JSON array of strings: {e}"))
        })?;
        if argv.is_empty() {
            return Err(Error::InvalidRequest("EXEC argv is empty".to_string()));
        }

        let execer = handle.execer()?;
        let output = execer
            .exec(&parts.cancel, &parts.id, &argv)
            .await?
            .into_result()?;
        Ok(Response::new(Body::from_bytes(output.stdout)))
    }
}

/// RUN: create from the reference, then start; body is the new id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunHandler;

#[async_trait]
impl Handler for RunHandler {
    async fn serve(&self, handle: &Handle, req: Request) -> Result<Response> {
        let parts = req.into_parts();
        if parts.reference.is_empty() {
            return Err(Error::InvalidRequest(
                "RUN requires an image reference".to_string(),
            ));
        }

        // Both probes first, so a missing Starter never leaves a created orphan.
        let creator = handle.creator()?;
        let starter = handle.starter()?;

        let id = creator
            .create(&parts.cancel, &CreateOptions::image(&parts.reference))
            .await?;
        starter.start(&parts.cancel, &id).await?;
        tracing::debug!(service = handle.service(), id = %id, "run started");
        Ok(Response::new(Body::from_bytes(id)))
    }
}
