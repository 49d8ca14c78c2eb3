// ABOUTME: In-process container engine state shared by every memory connection.
// ABOUTME: Tracks images, networks, namespaces and containers with a small state machine.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::capability::{CreateOptions, ExecOutput, Signal};

/// Failure inside the memory engine. Services wrap it with the call name.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("no such {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("container {id} is {state}, expected {expected}")]
    InvalidState {
        id: String,
        state: ContainerStatus,
        expected: &'static str,
    },

    #[error("{kind} {id} is in use")]
    InUse { kind: &'static str, id: String },

    #[error("{kind} name '{name}' is already taken")]
    Conflict { kind: &'static str, name: String },

    #[error("reference cannot be empty")]
    EmptyReference,

    #[error("command cannot be empty")]
    EmptyCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Created => f.write_str("created"),
            ContainerStatus::Running => f.write_str("running"),
            ContainerStatus::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub id: String,
    pub reference: String,
    pub pulled_at: DateTime<Utc>,
    pub pushed_to: Vec<String>,
    pub mounts: Vec<String>,
}

/// A network or a namespace.
#[derive(Debug, Clone, Serialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub namespace: Option<String>,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub status: ContainerStatus,
    pub exit_code: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    stdout: Vec<u8>,
    #[serde(skip)]
    stderr: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    images: BTreeMap<String, ImageRecord>,
    networks: BTreeMap<String, GroupRecord>,
    namespaces: BTreeMap<String, GroupRecord>,
    containers: BTreeMap<String, ContainerRecord>,
}

/// Find a record by id or by its secondary key (reference or name).
fn resolve<'a, R>(
    table: &'a BTreeMap<String, R>,
    key: &str,
    secondary: impl Fn(&R) -> &str,
) -> Option<&'a String> {
    if let Some((id, _)) = table.get_key_value(key) {
        return Some(id);
    }
    table
        .iter()
        .find(|(_, r)| secondary(r) == key)
        .map(|(id, _)| id)
}

impl State {
    fn image_id(&self, key: &str) -> Result<String, MemoryError> {
        resolve(&self.images, key, |r| r.reference.as_str())
            .cloned()
            .ok_or_else(|| not_found("image", key))
    }

    fn network_id(&self, key: &str) -> Result<String, MemoryError> {
        resolve(&self.networks, key, |r| r.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("network", key))
    }

    fn namespace_id(&self, key: &str) -> Result<String, MemoryError> {
        resolve(&self.namespaces, key, |r| r.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("namespace", key))
    }

    fn container_mut(&mut self, key: &str) -> Result<&mut ContainerRecord, MemoryError> {
        let id = resolve(&self.containers, key, |r| r.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("container", key))?;
        self.containers
            .get_mut(&id)
            .ok_or_else(|| not_found("container", key))
    }
}

fn not_found(kind: &'static str, id: &str) -> MemoryError {
    MemoryError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Fake process execution: a handful of commands behave like their
/// coreutils namesakes, anything else is not found.
fn simulate(argv: &[String]) -> ExecOutput {
    let (cmd, args) = match argv.split_first() {
        Some(split) => split,
        None => return ExecOutput::default(),
    };
    match cmd.as_str() {
        "echo" => ExecOutput {
            exit_code: 0,
            stdout: Bytes::from(format!("{}\n", args.join(" "))),
            stderr: Bytes::new(),
        },
        "true" => ExecOutput::default(),
        "false" => ExecOutput {
            exit_code: 1,
            ..ExecOutput::default()
        },
        "exit" => ExecOutput {
            exit_code: args.first().and_then(|c| c.parse().ok()).unwrap_or(0),
            ..ExecOutput::default()
        },
        other => ExecOutput {
            exit_code: 127,
            stdout: Bytes::new(),
            stderr: Bytes::from(format!("{other}: command not found\n")),
        },
    }
}

/// The shared engine. Every memory connection sees the same state.
#[derive(Debug, Default)]
pub struct Engine {
    state: Mutex<State>,
    next_id: AtomicU64,
    connections: AtomicUsize,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        format!("{:012x}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(super) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Connections opened and not yet closed.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    // Images

    /// Pulling a reference twice returns the same id.
    pub fn pull(&self, reference: &str) -> Result<String, MemoryError> {
        if reference.trim().is_empty() {
            return Err(MemoryError::EmptyReference);
        }
        let mut state = self.state.lock();
        if let Ok(id) = state.image_id(reference) {
            return Ok(id);
        }
        let id = format!("sha256:{}", self.next_id());
        state.images.insert(
            id.clone(),
            ImageRecord {
                id: id.clone(),
                reference: reference.to_string(),
                pulled_at: Utc::now(),
                pushed_to: Vec::new(),
                mounts: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn push(&self, reference: &str, image: &str) -> Result<(), MemoryError> {
        if reference.trim().is_empty() {
            return Err(MemoryError::EmptyReference);
        }
        let mut state = self.state.lock();
        let key = if image.is_empty() { reference } else { image };
        let id = state.image_id(key)?;
        if let Some(record) = state.images.get_mut(&id)
            && !record.pushed_to.iter().any(|r| r == reference)
        {
            record.pushed_to.push(reference.to_string());
        }
        Ok(())
    }

    pub fn mount(&self, image: &str, target: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let id = state.image_id(image)?;
        if let Some(record) = state.images.get_mut(&id) {
            record.mounts.push(target.to_string());
        }
        Ok(())
    }

    pub fn image(&self, key: &str) -> Result<ImageRecord, MemoryError> {
        let state = self.state.lock();
        let id = state.image_id(key)?;
        state
            .images
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("image", key))
    }

    pub fn image_ids(&self) -> Vec<String> {
        self.state.lock().images.keys().cloned().collect()
    }

    /// Refuses images that a container still uses.
    pub fn remove_image(&self, key: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let id = state.image_id(key)?;
        if state.containers.values().any(|c| c.image == id) {
            return Err(MemoryError::InUse { kind: "image", id });
        }
        state.images.remove(&id);
        Ok(())
    }

    // Networks and namespaces

    pub fn create_network(&self, options: &CreateOptions) -> Result<String, MemoryError> {
        let id = self.next_id();
        let mut state = self.state.lock();
        let record = self.group(&id, "net", options, &state.networks, "network")?;
        state.networks.insert(id.clone(), record);
        Ok(id)
    }

    pub fn create_namespace(&self, options: &CreateOptions) -> Result<String, MemoryError> {
        let id = self.next_id();
        let mut state = self.state.lock();
        let record = self.group(&id, "ns", options, &state.namespaces, "namespace")?;
        state.namespaces.insert(id.clone(), record);
        Ok(id)
    }

    fn group(
        &self,
        id: &str,
        prefix: &str,
        options: &CreateOptions,
        existing: &BTreeMap<String, GroupRecord>,
        kind: &'static str,
    ) -> Result<GroupRecord, MemoryError> {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| format!("{prefix}-{id}"));
        if existing.values().any(|r| r.name == name) {
            return Err(MemoryError::Conflict { kind, name });
        }
        Ok(GroupRecord {
            id: id.to_string(),
            name,
            labels: options.labels.clone().into_iter().collect(),
            created_at: Utc::now(),
        })
    }

    pub fn network(&self, key: &str) -> Result<GroupRecord, MemoryError> {
        let state = self.state.lock();
        let id = state.network_id(key)?;
        state
            .networks
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("network", key))
    }

    pub fn namespace(&self, key: &str) -> Result<GroupRecord, MemoryError> {
        let state = self.state.lock();
        let id = state.namespace_id(key)?;
        state
            .namespaces
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("namespace", key))
    }

    pub fn network_ids(&self) -> Vec<String> {
        self.state.lock().networks.keys().cloned().collect()
    }

    pub fn namespace_ids(&self) -> Vec<String> {
        self.state.lock().namespaces.keys().cloned().collect()
    }

    /// Refuses networks that a container is attached to.
    pub fn remove_network(&self, key: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let id = state.network_id(key)?;
        if state
            .containers
            .values()
            .any(|c| c.network.as_deref() == Some(id.as_str()))
        {
            return Err(MemoryError::InUse { kind: "network", id });
        }
        state.networks.remove(&id);
        Ok(())
    }

    /// Refuses namespaces that hold a container.
    pub fn remove_namespace(&self, key: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let id = state.namespace_id(key)?;
        if state
            .containers
            .values()
            .any(|c| c.namespace.as_deref() == Some(id.as_str()))
        {
            return Err(MemoryError::InUse {
                kind: "namespace",
                id,
            });
        }
        state.namespaces.remove(&id);
        Ok(())
    }

    // Containers

    /// Image, network and namespace must already exist.
    pub fn create_container(&self, options: &CreateOptions) -> Result<String, MemoryError> {
        let id = self.next_id();
        let mut state = self.state.lock();

        let image_key = options.image.as_deref().ok_or(MemoryError::EmptyReference)?;
        let image = state.image_id(image_key)?;
        let network = options
            .network
            .as_deref()
            .map(|n| state.network_id(n))
            .transpose()?;
        let namespace = options
            .namespace
            .as_deref()
            .map(|n| state.namespace_id(n))
            .transpose()?;

        let name = options
            .name
            .clone()
            .unwrap_or_else(|| format!("ctr-{id}"));
        if state.containers.values().any(|c| c.name == name) {
            return Err(MemoryError::Conflict {
                kind: "container",
                name,
            });
        }

        state.containers.insert(
            id.clone(),
            ContainerRecord {
                id: id.clone(),
                name,
                image,
                network,
                namespace,
                command: options.command.clone(),
                labels: options.labels.clone().into_iter().collect(),
                status: ContainerStatus::Created,
                exit_code: None,
                created_at: Utc::now(),
                started_at: None,
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Start a created or stopped container. Its command runs once and its
    /// output lands in the container's logs.
    pub fn start(&self, key: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let container = state.container_mut(key)?;
        if container.status == ContainerStatus::Running {
            return Err(MemoryError::InvalidState {
                id: container.id.clone(),
                state: container.status,
                expected: "created or stopped",
            });
        }
        let output = simulate(&container.command);
        container.stdout.extend_from_slice(&output.stdout);
        container.stderr.extend_from_slice(&output.stderr);
        container.status = ContainerStatus::Running;
        container.exit_code = None;
        container.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn stop(&self, key: &str) -> Result<(), MemoryError> {
        self.halt(key, 0)
    }

    /// Stop with exit status 128 + signal number.
    pub fn kill(&self, key: &str, signal: Signal) -> Result<(), MemoryError> {
        self.halt(key, 128 + i64::from(signal.number()))
    }

    fn halt(&self, key: &str, exit_code: i64) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let container = state.container_mut(key)?;
        if container.status != ContainerStatus::Running {
            return Err(MemoryError::InvalidState {
                id: container.id.clone(),
                state: container.status,
                expected: "running",
            });
        }
        container.status = ContainerStatus::Stopped;
        container.exit_code = Some(exit_code);
        Ok(())
    }

    pub fn exec(&self, key: &str, argv: &[String]) -> Result<ExecOutput, MemoryError> {
        if argv.is_empty() {
            return Err(MemoryError::EmptyCommand);
        }
        let mut state = self.state.lock();
        let container = state.container_mut(key)?;
        if container.status != ContainerStatus::Running {
            return Err(MemoryError::InvalidState {
                id: container.id.clone(),
                state: container.status,
                expected: "running",
            });
        }
        Ok(simulate(argv))
    }

    pub fn container(&self, key: &str) -> Result<ContainerRecord, MemoryError> {
        let mut state = self.state.lock();
        state.container_mut(key).map(|c| c.clone())
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    /// Refuses running containers.
    pub fn remove_container(&self, key: &str) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let container = state.container_mut(key)?;
        if container.status == ContainerStatus::Running {
            return Err(MemoryError::InvalidState {
                id: container.id.clone(),
                state: container.status,
                expected: "created or stopped",
            });
        }
        let id = container.id.clone();
        state.containers.remove(&id);
        Ok(())
    }

    /// Whether `key` names a running container.
    pub fn is_running(&self, key: &str) -> Result<bool, MemoryError> {
        let mut state = self.state.lock();
        Ok(state.container_mut(key)?.status == ContainerStatus::Running)
    }

    pub fn append_stdout(&self, key: &str, data: &[u8]) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        state.container_mut(key)?.stdout.extend_from_slice(data);
        Ok(())
    }

    pub fn stdout_log(&self, key: &str) -> Result<Bytes, MemoryError> {
        let mut state = self.state.lock();
        Ok(Bytes::copy_from_slice(&state.container_mut(key)?.stdout))
    }

    pub fn stderr_log(&self, key: &str) -> Result<Bytes, MemoryError> {
        let mut state = self.state.lock();
        Ok(Bytes::copy_from_slice(&state.container_mut(key)?.stderr))
    }
}
