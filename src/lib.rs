// ABOUTME: Library root for ocidrv - one interface over many container engines.
// ABOUTME: The CLI binary is in main.rs; bundled drivers live under backends.

pub mod backends;
pub mod capability;
pub mod chain;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod request;
pub mod types;

pub use chain::{Chain, ChainState};
pub use client::Client;
pub use driver::{Conn, Driver, Handle};
pub use error::{Error, ErrorKind, Result};
pub use request::{Body, Request, Response};
pub use types::{Kind, Method};
