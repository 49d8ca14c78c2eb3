// ABOUTME: Driver for Docker and Podman over the Docker-compatible Engine API.
// ABOUTME: Registered as "docker" and "podman"; connects over a unix socket with bollard.

mod detection;
mod services;

use std::sync::Arc;

use async_trait::async_trait;
use bollard::Docker;
use tokio_util::sync::CancellationToken;

use crate::driver::{Connection, Driver, Service, cancellable};
use crate::error::{Error, Result};

pub use detection::{Endpoint, Flavor, detect_local, resolve};
use services::{ContainerService, ImageService, NetworkService};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Driver for one engine flavor.
///
/// The flavor decides which socket auto-detection tries first and how exec
/// output is collected.
#[derive(Debug, Clone, Copy)]
pub struct DockerDriver {
    flavor: Flavor,
}

impl DockerDriver {
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor }
    }

    pub fn docker() -> Self {
        Self::new(Flavor::Docker)
    }

    pub fn podman() -> Self {
        Self::new(Flavor::Podman)
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }
}

#[async_trait]
impl Driver for DockerDriver {
    async fn open(&self, _cancel: &CancellationToken, uri: &str) -> Result<Box<dyn Connection>> {
        let endpoint = resolve(uri, self.flavor)?;
        let conn = DockerConnection::connect(&endpoint)?;
        tracing::debug!(
            driver = self.flavor.driver_name(),
            socket = %endpoint.socket_path,
            "engine client created"
        );
        Ok(Box::new(conn))
    }
}

/// One bollard client. The socket file must exist when the client is built;
/// it is first dialled by `begin`.
pub(crate) struct DockerConnection {
    client: Docker,
    flavor: Flavor,
}

impl DockerConnection {
    pub(crate) fn connect(endpoint: &Endpoint) -> Result<Self> {
        let client = Docker::connect_with_unix(
            &endpoint.socket_path,
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| Error::backend("engine.connect", e))?;
        Ok(Self {
            client,
            flavor: endpoint.flavor,
        })
    }
}

#[async_trait]
impl Connection for DockerConnection {
    async fn begin(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, async {
            self.client
                .ping()
                .await
                .map_err(|e| Error::backend("engine.ping", e))?;
            Ok(())
        })
        .await
    }

    fn prepare(&self, service: &str) -> Result<Arc<dyn Service>> {
        let client = self.client.clone();
        let service: Arc<dyn Service> = match service {
            "images" => Arc::new(ImageService { client }),
            "networks" => Arc::new(NetworkService { client }),
            "containers" => Arc::new(ContainerService {
                client,
                flavor: self.flavor,
            }),
            other => return Err(Error::UnsupportedService(other.to_string())),
        };
        Ok(service)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::driver::Handle;
    use std::os::unix::net::UnixListener;

    /// A connection to a socket nobody answers on. The tempdir keeps it alive.
    fn offline_connection() -> (tempfile::TempDir, UnixListener, DockerConnection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let conn = DockerConnection::connect(&Endpoint {
            flavor: Flavor::Docker,
            socket_path: path.to_string_lossy().into_owned(),
        })
        .unwrap();
        (dir, listener, conn)
    }

    fn handle(conn: &DockerConnection, service: &str) -> Handle {
        Handle::new(
            service,
            conn.prepare(service).unwrap(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn image_service_cannot_push_or_mount() {
        let (_dir, _listener, conn) = offline_connection();
        let images = handle(&conn, "images");
        assert_eq!(
            images.capabilities(),
            vec![Capability::Pull, Capability::Inspect, Capability::Remove]
        );
        assert!(images.pusher().err().unwrap().is_unsupported());
        assert!(images.mounter().err().unwrap().is_unsupported());
    }

    #[tokio::test]
    async fn container_service_has_no_kill_or_stdin() {
        let (_dir, _listener, conn) = offline_connection();
        let containers = handle(&conn, "containers");
        assert!(containers.supports(Capability::Exec));
        assert!(containers.supports(Capability::Stdout));
        assert!(!containers.supports(Capability::Kill));
        assert!(!containers.supports(Capability::Stdin));
    }

    #[tokio::test]
    async fn namespaces_are_not_served() {
        let (_dir, _listener, conn) = offline_connection();
        let err = conn.prepare("namespaces").err().unwrap();
        assert!(matches!(err, Error::UnsupportedService(_)));
    }

    #[tokio::test]
    async fn missing_socket_fails_at_connect() {
        let err = DockerConnection::connect(&Endpoint {
            flavor: Flavor::Docker,
            socket_path: "/nonexistent/ocidrv-test.sock".to_string(),
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::Backend { ref call, .. } if call == "engine.connect"));
    }
}
