// ABOUTME: Request/Response envelope for a single operation against a driver.
// ABOUTME: Requests are immutable once built and carry their own cancellation token.

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{Kind, Method};

/// An owned, readable byte stream.
///
/// Whoever holds the body owns it; dropping it closes the underlying stream.
pub struct Body {
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_reader(Cursor::new(bytes.into()))
    }

    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            reader: Box::pin(reader),
        }
    }

    /// Read the remaining stream to the end.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Read the remaining stream to the end as UTF-8 (lossy).
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Unwrap into the underlying reader.
    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

/// One operation: what to do, to which resource class, on which target.
#[derive(Debug)]
pub struct Request {
    method: Method,
    kind: Kind,
    reference: String,
    id: String,
    body: Option<Body>,
    cancel: CancellationToken,
}

/// A request taken apart by the handler that serves it.
#[derive(Debug)]
pub struct RequestParts {
    pub method: Method,
    pub kind: Kind,
    pub reference: String,
    pub id: String,
    pub body: Option<Body>,
    pub cancel: CancellationToken,
}

impl Request {
    pub fn builder(method: Method, kind: Kind) -> RequestBuilder {
        RequestBuilder {
            method,
            kind,
            reference: String::new(),
            id: String::new(),
            body: None,
            cancel: None,
        }
    }

    /// PULL an image by reference.
    pub fn pull(reference: impl Into<String>) -> Result<Self> {
        Self::builder(Method::Pull, Kind::Image)
            .reference(reference)
            .build()
    }

    /// EXEC a command inside a container. The argv travels as a JSON array body.
    pub fn exec(container: impl Into<String>, argv: &[String]) -> Result<Self> {
        let body = serde_json::to_vec(argv)?;
        Self::builder(Method::Exec, Kind::Container)
            .id(container)
            .body(Body::from_bytes(body))
            .build()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the body out of the request. Returns `None` on every later call.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn into_parts(self) -> RequestParts {
        RequestParts {
            method: self.method,
            kind: self.kind,
            reference: self.reference,
            id: self.id,
            body: self.body,
            cancel: self.cancel,
        }
    }
}

#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    kind: Kind,
    reference: String,
    id: String,
    body: Option<Body>,
    cancel: Option<CancellationToken>,
}

impl RequestBuilder {
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Tie the request to a caller-owned cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Request> {
        if self.method.requires_reference() && self.reference.trim().is_empty() {
            return Err(Error::InvalidRequest(format!(
                "{} requires a non-empty reference",
                self.method
            )));
        }

        Ok(Request {
            method: self.method,
            kind: self.kind,
            reference: self.reference,
            id: self.id,
            body: self.body,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// The result of a request. The caller owns the body.
#[derive(Debug)]
pub struct Response {
    pub body: Body,
}

impl Response {
    pub fn new(body: Body) -> Self {
        Self { body }
    }

    pub fn empty() -> Self {
        Self::new(Body::empty())
    }

    pub async fn bytes(mut self) -> Result<Bytes> {
        self.body.bytes().await
    }

    pub async fn text(mut self) -> Result<String> {
        self.body.text().await
    }
}
