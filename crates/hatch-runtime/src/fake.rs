//! In-process fake runtime for engine tests.
//!
//! Containers are plain bookkeeping entries: `start` emits `Started`, `stop`
//! emits `ExitSuccess`, and tests can inject crashes or start failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    ContainerEvent, ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus,
    CreatedContainer, Result, RuntimeError,
};

const EVENT_BUFFER: usize = 8;
/// Base for fabricated published host ports.
const HOST_PORT_BASE: u16 = 49152;

#[derive(Default)]
pub struct FakeRuntime {
    counter: AtomicU64,
    /// The next N `create` calls fail.
    create_failures: AtomicU32,
    /// The next N `start` calls fail.
    start_failures: AtomicU32,
    containers: Arc<Mutex<HashMap<String, FakeControl>>>,
}

#[derive(Clone)]
struct FakeControl {
    events_tx: mpsc::Sender<ContainerEvent>,
    running: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` create calls fail.
    pub fn fail_next_creates(&self, n: u32) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` start calls fail.
    pub fn fail_next_starts(&self, n: u32) {
        self.start_failures.store(n, Ordering::SeqCst);
    }

    /// Simulate an unexpected container death.
    pub async fn crash(&self, id: &str) {
        let control = self.containers.lock().get(id).cloned();
        if let Some(control) = control {
            control.running.store(false, Ordering::SeqCst);
            if !control.exited.swap(true, Ordering::SeqCst) {
                let _ = control.events_tx.send(ContainerEvent::ExitError).await;
            }
        }
    }

    /// Ids of containers currently known to the runtime.
    pub fn live_ids(&self) -> Vec<String> {
        self.containers.lock().keys().cloned().collect()
    }

    /// Total containers ever created.
    pub fn created_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<CreatedContainer> {
        if Self::take_failure(&self.create_failures) {
            return Err(RuntimeError::Rejected("injected create failure".into()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("fake-{n:04}");
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let running = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));

        self.containers.lock().insert(
            id.clone(),
            FakeControl {
                events_tx: events_tx.clone(),
                running: running.clone(),
                exited: exited.clone(),
            },
        );

        let handle = FakeHandle {
            id,
            exposed_port: spec.exposed_port,
            host_port: HOST_PORT_BASE.wrapping_add(n as u16),
            running,
            exited,
            events_tx,
            fail_start: Self::take_failure(&self.start_failures),
            registry: self.containers.clone(),
        };

        Ok(CreatedContainer {
            handle: Box::new(handle),
            events: events_rx,
        })
    }
}

struct FakeHandle {
    id: String,
    exposed_port: u16,
    host_port: u16,
    running: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    events_tx: mpsc::Sender<ContainerEvent>,
    fail_start: bool,
    registry: Arc<Mutex<HashMap<String, FakeControl>>>,
}

#[async_trait::async_trait]
impl ContainerHandle for FakeHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(RuntimeError::Rejected("injected start failure".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        let _ = self.events_tx.send(ContainerEvent::Started).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.registry.lock().remove(&self.id);
        self.running.store(false, Ordering::SeqCst);
        // Always produce an exit, even for a container that never started;
        // the owner relies on the stream to observe termination.
        if !self.exited.swap(true, Ordering::SeqCst) {
            let _ = self.events_tx.send(ContainerEvent::ExitSuccess).await;
        }
        Ok(())
    }

    async fn status(&self) -> Result<ContainerStatus> {
        let mut published_ports = HashMap::new();
        published_ports.insert(self.exposed_port, self.host_port);
        Ok(ContainerStatus {
            id: self.id.clone(),
            running: self.running.load(Ordering::SeqCst),
            published_ports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: "scratch".to_string(),
            env: Vec::new(),
            exposed_port: 5432,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn start_then_stop_produces_lifecycle_events() {
        let runtime = FakeRuntime::new();
        let mut created = runtime.create(&spec()).await.unwrap();

        created.handle.start().await.unwrap();
        assert_eq!(created.events.recv().await, Some(ContainerEvent::Started));

        let status = created.handle.status().await.unwrap();
        assert!(status.running);
        assert!(status.published_ports.contains_key(&5432));

        created.handle.stop().await.unwrap();
        assert_eq!(
            created.events.recv().await,
            Some(ContainerEvent::ExitSuccess)
        );
    }

    #[tokio::test]
    async fn crash_emits_exit_error() {
        let runtime = FakeRuntime::new();
        let mut created = runtime.create(&spec()).await.unwrap();
        created.handle.start().await.unwrap();
        let _ = created.events.recv().await;

        runtime.crash(created.handle.id()).await;
        assert_eq!(created.events.recv().await, Some(ContainerEvent::ExitError));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let runtime = FakeRuntime::new();
        runtime.fail_next_creates(1);
        assert!(runtime.create(&spec()).await.is_err());
        assert!(runtime.create(&spec()).await.is_ok());

        runtime.fail_next_starts(1);
        let created = runtime.create(&spec()).await.unwrap();
        assert!(created.handle.start().await.is_err());
    }
}
