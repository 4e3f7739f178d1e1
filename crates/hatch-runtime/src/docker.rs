//! Docker driver built on bollard.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::service::{HostConfig, PortBinding};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    ContainerEvent, ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus,
    CreatedContainer, Result,
};

/// Seconds docker waits before SIGKILL on stop.
const STOP_TIMEOUT_SECS: i64 = 10;
/// Buffer for the per-container event channel.
const EVENT_BUFFER: usize = 8;

/// Container runtime backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the environment's default daemon socket.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn spawn_event_pump(&self, id: String, tx: mpsc::Sender<ContainerEvent>) {
        let docker = self.docker.clone();
        tokio::spawn(async move {
            let mut filters = HashMap::new();
            filters.insert("type".to_string(), vec!["container".to_string()]);
            filters.insert("container".to_string(), vec![id.clone()]);

            let mut stream = docker.events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }));

            while let Some(message) = stream.next().await {
                let message = match message {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(container = %id, error = %e, "docker event stream error");
                        break;
                    }
                };

                let event = match message.action.as_deref() {
                    Some("start") => Some(ContainerEvent::Started),
                    // A container removed without ever running produces no
                    // "die"; "destroy" still marks termination for the owner.
                    Some("destroy") => Some(ContainerEvent::ExitSuccess),
                    Some("die") => {
                        let exit_code = message
                            .actor
                            .as_ref()
                            .and_then(|a| a.attributes.as_ref())
                            .and_then(|attrs| attrs.get("exitCode"))
                            .and_then(|c| c.parse::<i64>().ok())
                            .unwrap_or(-1);
                        if exit_code == 0 {
                            Some(ContainerEvent::ExitSuccess)
                        } else {
                            Some(ContainerEvent::ExitError)
                        }
                    }
                    _ => None,
                };

                if let Some(event) = event {
                    let terminal = matches!(
                        event,
                        ContainerEvent::ExitSuccess | ContainerEvent::ExitError
                    );
                    if tx.send(event).await.is_err() || terminal {
                        break;
                    }
                }
            }

            debug!(container = %id, "docker event pump finished");
        });
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<CreatedContainer> {
        let port_key = format!("{}/tcp", spec.exposed_port);

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        // Empty binding: the daemon picks an ephemeral host port.
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        );

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.spawn_event_pump(response.id.clone(), tx);

        debug!(container = %response.id, image = %spec.image, "created container");

        Ok(CreatedContainer {
            handle: Box::new(DockerHandle {
                docker: self.docker.clone(),
                id: response.id,
            }),
            events: rx,
        })
    }
}

struct DockerHandle {
    docker: Docker,
    id: String,
}

#[async_trait::async_trait]
impl ContainerHandle for DockerHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<()> {
        self.docker
            .start_container(&self.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Err(e) = self
            .docker
            .stop_container(&self.id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
        {
            // Already stopped is fine; removal below still applies.
            debug!(container = %self.id, error = %e, "stop_container");
        }

        self.docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn status(&self) -> Result<ContainerStatus> {
        let inspect = self
            .docker
            .inspect_container(&self.id, None::<InspectContainerOptions>)
            .await?;

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        let mut published_ports = HashMap::new();
        if let Some(ports) = inspect.network_settings.and_then(|n| n.ports) {
            for (key, bindings) in ports {
                let container_port = match key.split('/').next().and_then(|p| p.parse::<u16>().ok())
                {
                    Some(p) => p,
                    None => continue,
                };
                let host_port = bindings
                    .iter()
                    .flatten()
                    .find_map(|b| b.host_port.as_deref())
                    .and_then(|p| p.parse::<u16>().ok());
                if let Some(host_port) = host_port {
                    published_ports.insert(container_port, host_port);
                }
            }
        }

        Ok(ContainerStatus {
            id: self.id.clone(),
            running,
            published_ports,
        })
    }
}
