// ABOUTME: Engine socket resolution for the docker and podman drivers.
// ABOUTME: Parses explicit uris and probes the well-known local sockets otherwise.

use std::path::Path;

use crate::error::{Error, Result};

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Which engine answers on a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Docker,
    Podman,
}

impl Flavor {
    pub fn driver_name(&self) -> &'static str {
        match self {
            Flavor::Docker => "docker",
            Flavor::Podman => "podman",
        }
    }
}

/// A socket to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub flavor: Flavor,
    pub socket_path: String,
}

/// Turn a driver uri into an endpoint.
///
/// `""` and `"auto"` probe the local sockets; `unix:///path` and absolute
/// paths are taken as given, with `preferred` as their flavor.
pub fn resolve(uri: &str, preferred: Flavor) -> Result<Endpoint> {
    match uri.trim() {
        "" | "auto" => detect_local(preferred).ok_or_else(|| Error::InvalidUri {
            uri: uri.to_string(),
            reason: "no container engine socket found (checked Podman and Docker)".to_string(),
        }),
        explicit => {
            let path = explicit.strip_prefix("unix://").unwrap_or(explicit);
            if !path.starts_with('/') {
                return Err(Error::InvalidUri {
                    uri: uri.to_string(),
                    reason: "expected unix:///path/to/socket or an absolute socket path"
                        .to_string(),
                });
            }
            Ok(Endpoint {
                flavor: preferred,
                socket_path: path.to_string(),
            })
        }
    }
}

/// Probe local sockets, trying the preferred engine first.
///
/// Podman order: rootless (`/run/user/$UID/podman/podman.sock`), then
/// rootful (`/run/podman/podman.sock`). Docker: `/var/run/docker.sock`.
pub fn detect_local(preferred: Flavor) -> Option<Endpoint> {
    let candidates = candidates(get_uid().as_deref());
    candidates
        .iter()
        .filter(|e| e.flavor == preferred)
        .chain(candidates.iter().filter(|e| e.flavor != preferred))
        .find(|e| Path::new(&e.socket_path).exists())
        .cloned()
}

fn candidates(uid: Option<&str>) -> Vec<Endpoint> {
    let mut sockets = Vec::with_capacity(3);
    if let Some(uid) = uid {
        sockets.push(Endpoint {
            flavor: Flavor::Podman,
            socket_path: format!("/run/user/{uid}/podman/podman.sock"),
        });
    }
    sockets.push(Endpoint {
        flavor: Flavor::Podman,
        socket_path: ROOTFUL_PODMAN.to_string(),
    });
    sockets.push(Endpoint {
        flavor: Flavor::Docker,
        socket_path: DOCKER_SOCKET.to_string(),
    });
    sockets
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}
