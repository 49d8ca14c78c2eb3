// ABOUTME: Capabilities the Docker-compatible Engine API offers, implemented with bollard.
// ABOUTME: Push, kill, mount and stdin are absent and probe as unsupported.

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, NetworkCreateRequest};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, InspectNetworkOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, RemoveImageOptions,
    StartContainerOptions, StopContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::detection::Flavor;
use crate::capability::{
    BoxReader, CreateOptions, Creator, ExecOutput, Execer, Inspector, Lister, Puller, Remover,
    Starter, StderrSink, StdoutSink, Stopper,
};
use crate::driver::{Service, cancellable};
use crate::error::{Error, Result};

const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn api(call: &'static str) -> impl FnOnce(bollard::errors::Error) -> Error {
    move |e| Error::backend(call, e)
}

fn to_json(value: &impl serde::Serialize) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec_pretty(value)?))
}

fn labels(options: &CreateOptions) -> Option<std::collections::HashMap<String, String>> {
    if options.labels.is_empty() {
        None
    } else {
        Some(options.labels.clone())
    }
}

pub(super) struct ImageService {
    pub client: Docker,
}

impl Service for ImageService {
    fn as_puller(&self) -> Option<&dyn Puller> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Puller for ImageService {
    /// Pull `reference` and return the local image id.
    async fn pull(&self, cancel: &CancellationToken, reference: &str) -> Result<String> {
        cancellable(cancel, async {
            let opts = CreateImageOptions {
                from_image: Some(reference.to_string()),
                ..Default::default()
            };

            // Pull returns a stream of progress updates; drain it
            let mut stream = self.client.create_image(Some(opts), None, None);
            while let Some(progress) = stream.next().await {
                progress.map_err(api("images.pull"))?;
            }

            let image = self
                .client
                .inspect_image(reference)
                .await
                .map_err(api("images.pull"))?;
            Ok(image.id.unwrap_or_else(|| reference.to_string()))
        })
        .await
    }
}

#[async_trait]
impl Inspector for ImageService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let details = cancellable(cancel, async {
            self.client
                .inspect_image(id)
                .await
                .map_err(api("images.stat"))
        })
        .await?;
        to_json(&details)
    }
}

#[async_trait]
impl Remover for ImageService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        let opts = RemoveImageOptions {
            force: false,
            ..Default::default()
        };
        cancellable(cancel, async {
            self.client
                .remove_image(id, Some(opts), None)
                .await
                .map_err(api("images.remove"))?;
            Ok(())
        })
        .await
    }
}

pub(super) struct NetworkService {
    pub client: Docker,
}

impl Service for NetworkService {
    fn as_creator(&self) -> Option<&dyn Creator> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Creator for NetworkService {
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        let name = options.name.clone().unwrap_or_else(|| {
            format!("ocidrv-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%6f"))
        });
        let request = NetworkCreateRequest {
            name,
            labels: labels(options),
            ..Default::default()
        };

        let response = cancellable(cancel, async {
            self.client
                .create_network(request)
                .await
                .map_err(api("networks.create"))
        })
        .await?;
        Ok(response.id)
    }
}

#[async_trait]
impl Inspector for NetworkService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let details = cancellable(cancel, async {
            self.client
                .inspect_network(id, None::<InspectNetworkOptions>)
                .await
                .map_err(api("networks.stat"))
        })
        .await?;
        to_json(&details)
    }
}

#[async_trait]
impl Remover for NetworkService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        cancellable(cancel, async {
            self.client
                .remove_network(id)
                .await
                .map_err(api("networks.remove"))
        })
        .await
    }
}

pub(super) struct ContainerService {
    pub client: Docker,
    pub flavor: Flavor,
}

impl Service for ContainerService {
    fn as_creator(&self) -> Option<&dyn Creator> {
        Some(self)
    }
    fn as_starter(&self) -> Option<&dyn Starter> {
        Some(self)
    }
    fn as_stopper(&self) -> Option<&dyn Stopper> {
        Some(self)
    }
    fn as_execer(&self) -> Option<&dyn Execer> {
        Some(self)
    }
    fn as_inspector(&self) -> Option<&dyn Inspector> {
        Some(self)
    }
    fn as_lister(&self) -> Option<&dyn Lister> {
        Some(self)
    }
    fn as_remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
    fn as_stdout_sink(&self) -> Option<&dyn StdoutSink> {
        Some(self)
    }
    fn as_stderr_sink(&self) -> Option<&dyn StderrSink> {
        Some(self)
    }
}

impl ContainerService {
    async fn exec_exit_code(&self, exec_id: &str) -> Result<(bool, i64)> {
        let details = self
            .client
            .inspect_exec(exec_id)
            .await
            .map_err(api("containers.exec"))?;
        Ok((
            details.running.unwrap_or(false),
            details.exit_code.unwrap_or(0),
        ))
    }

    /// Podman's attached exec streams do not always close, so start detached
    /// and poll. Output is not captured in this mode.
    async fn exec_detached(&self, exec_id: &str) -> Result<ExecOutput> {
        let opts = StartExecOptions {
            detach: true,
            ..Default::default()
        };
        self.client
            .start_exec(exec_id, Some(opts))
            .await
            .map_err(api("containers.exec"))?;

        loop {
            let (running, exit_code) = self.exec_exit_code(exec_id).await?;
            if !running {
                return Ok(ExecOutput {
                    exit_code,
                    ..ExecOutput::default()
                });
            }
            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    }

    async fn exec_attached(&self, exec_id: &str) -> Result<ExecOutput> {
        let opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let started = self
            .client
            .start_exec(exec_id, Some(opts))
            .await
            .map_err(api("containers.exec"))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(item) = output.next().await {
                match item.map_err(api("containers.exec"))? {
                    bollard::container::LogOutput::StdOut { message } => {
                        stdout.extend_from_slice(&message)
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        stderr.extend_from_slice(&message)
                    }
                    _ => {}
                }
            }
        }

        let (_, exit_code) = self.exec_exit_code(exec_id).await?;
        Ok(ExecOutput {
            exit_code,
            stdout: Bytes::from(stdout),
            stderr: Bytes::from(stderr),
        })
    }

    fn log_reader(&self, id: &str, stdout: bool) -> BoxReader {
        let opts = LogsOptions {
            stdout,
            stderr: !stdout,
            follow: false,
            tail: "all".to_string(),
            ..Default::default()
        };
        let chunks = self.client.logs(id, Some(opts)).filter_map(move |item| async move {
            match item {
                Ok(bollard::container::LogOutput::StdOut { message }) if stdout => {
                    Some(Ok(message))
                }
                Ok(bollard::container::LogOutput::StdErr { message }) if !stdout => {
                    Some(Ok(message))
                }
                Ok(_) => None,
                Err(e) => Some(Err(std::io::Error::other(e))),
            }
        });
        Box::pin(StreamReader::new(Box::pin(chunks)))
    }
}

#[async_trait]
impl Creator for ContainerService {
    async fn create(&self, cancel: &CancellationToken, options: &CreateOptions) -> Result<String> {
        if options.namespace.is_some() {
            return Err(Error::UnsupportedService("namespaces".to_string()));
        }

        let body = ContainerCreateBody {
            image: options.image.clone(),
            cmd: if options.command.is_empty() {
                None
            } else {
                Some(options.command.clone())
            },
            labels: labels(options),
            host_config: Some(HostConfig {
                network_mode: options.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let opts = CreateContainerOptions {
            name: options.name.clone(),
            ..Default::default()
        };

        let response = cancellable(cancel, async {
            self.client
                .create_container(Some(opts), body)
                .await
                .map_err(api("containers.create"))
        })
        .await?;
        Ok(response.id)
    }
}

#[async_trait]
impl Starter for ContainerService {
    async fn start(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        cancellable(cancel, async {
            self.client
                .start_container(id, None::<StartContainerOptions>)
                .await
                .map_err(api("containers.start"))
        })
        .await
    }
}

#[async_trait]
impl Stopper for ContainerService {
    async fn stop(&self, cancel: &CancellationToken, id: &str, timeout: Duration) -> Result<()> {
        let opts = StopContainerOptions {
            t: Some(i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)),
            signal: None,
        };
        cancellable(cancel, async {
            self.client
                .stop_container(id, Some(opts))
                .await
                .map_err(api("containers.stop"))
        })
        .await
    }
}

#[async_trait]
impl Execer for ContainerService {
    async fn exec(
        &self,
        cancel: &CancellationToken,
        id: &str,
        argv: &[String],
    ) -> Result<ExecOutput> {
        let config = bollard::models::ExecConfig {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        cancellable(cancel, async {
            let created = self
                .client
                .create_exec(id, config)
                .await
                .map_err(api("containers.exec"))?;

            match self.flavor {
                Flavor::Podman => self.exec_detached(&created.id).await,
                Flavor::Docker => self.exec_attached(&created.id).await,
            }
        })
        .await
    }
}

#[async_trait]
impl Inspector for ContainerService {
    async fn stat(&self, cancel: &CancellationToken, id: &str) -> Result<Bytes> {
        let details = cancellable(cancel, async {
            self.client
                .inspect_container(id, None::<InspectContainerOptions>)
                .await
                .map_err(api("containers.stat"))
        })
        .await?;
        to_json(&details)
    }
}

#[async_trait]
impl Lister for ContainerService {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let opts = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = cancellable(cancel, async {
            self.client
                .list_containers(Some(opts))
                .await
                .map_err(api("containers.list"))
        })
        .await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

#[async_trait]
impl Remover for ContainerService {
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        let opts = RemoveContainerOptions {
            force: false,
            ..Default::default()
        };
        cancellable(cancel, async {
            self.client
                .remove_container(id, Some(opts))
                .await
                .map_err(api("containers.remove"))
        })
        .await
    }
}

#[async_trait]
impl StdoutSink for ContainerService {
    async fn stdout(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self.log_reader(id, true))
    }
}

#[async_trait]
impl StderrSink for ContainerService {
    async fn stderr(&self, cancel: &CancellationToken, id: &str) -> Result<BoxReader> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self.log_reader(id, false))
    }
}
