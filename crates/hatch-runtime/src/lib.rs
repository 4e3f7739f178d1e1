//! Container runtime seam.
//!
//! The pool engine drives containers exclusively through the traits in this
//! crate: [`ContainerRuntime`] creates containers, [`ContainerHandle`] drives
//! a single one. The Docker driver lives in [`docker`]; an in-process fake
//! for tests lives in [`fake`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod docker;
pub mod fake;

pub use docker::DockerRuntime;
pub use fake::FakeRuntime;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container {id} has no published binding for port {port}")]
    MissingPort { id: String, port: u16 },

    #[error("container runtime rejected the operation: {0}")]
    Rejected(String),
}

/// What a container needs to be created from.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    /// Environment entries, `KEY=VAL` form.
    pub env: Vec<String>,
    /// Primary TCP port the service listens on inside the container. The
    /// runtime publishes it on an ephemeral host port.
    pub exposed_port: u16,
    /// Labels applied to the container, used for identifying strays.
    pub labels: HashMap<String, String>,
}

/// Lifecycle notification from the runtime's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    Started,
    ExitSuccess,
    ExitError,
    StartFailed,
}

/// Inspection snapshot of a single container.
#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub id: String,
    pub running: bool,
    /// Exposed port to published host port.
    pub published_ports: HashMap<u16, u16>,
}

/// A freshly created container: the handle plus its event stream.
///
/// The stream is handed over exactly once; the receiver side belongs to
/// whoever owns the container.
pub struct CreatedContainer {
    pub handle: Box<dyn ContainerHandle>,
    pub events: mpsc::Receiver<ContainerEvent>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, spec: &ContainerSpec) -> Result<CreatedContainer>;
}

/// Capability to drive one container.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    fn id(&self) -> &str;

    async fn start(&self) -> Result<()>;

    /// Stop and release the container. Idempotent; a successful stop is
    /// eventually reflected as an exit event on the stream.
    async fn stop(&self) -> Result<()>;

    async fn status(&self) -> Result<ContainerStatus>;
}
