//! Event processor: folds the event stream into renderable rows.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hatch_common::events::{ContainerStatusEvent, PoolStatusEvent, UiEvent};

use crate::writer::StatusWriter;

/// Rendered state of one pool.
#[derive(Debug, Clone, Default)]
pub struct PoolRow {
    pub name: String,
    pub state: &'static str,
    pub error: Option<String>,
    pub num_items: usize,
    pub num_pending: usize,
    pub num_ready: usize,
}

/// Rendered state of one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerRow {
    pub pool: String,
    pub id: String,
    pub state: &'static str,
    pub phase: Option<&'static str>,
    pub action: String,
    pub attempt: u32,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ContainerRow {
    fn clear_action(&mut self) {
        self.phase = None;
        self.action.clear();
        self.attempt = 0;
        self.attempts = 0;
        self.error = None;
    }
}

/// Spawn the processor task; it runs until the emitter channel closes.
pub fn spawn_processor(
    rx: mpsc::Receiver<UiEvent>,
    writer: Box<dyn StatusWriter + Send>,
) -> JoinHandle<()> {
    let processor = Processor {
        rx,
        writer,
        pools: HashMap::new(),
        containers: HashMap::new(),
    };
    tokio::spawn(processor.run())
}

struct Processor {
    rx: mpsc::Receiver<UiEvent>,
    writer: Box<dyn StatusWriter + Send>,
    pools: HashMap<String, PoolRow>,
    containers: HashMap<String, ContainerRow>,
}

impl Processor {
    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.handle(event);
        }
        self.writer.stop();
    }

    fn handle(&mut self, event: UiEvent) {
        match event {
            UiEvent::Pool { pool, event } => self.handle_pool(pool, event),
            UiEvent::Container { pool, id, event } => self.handle_container(pool, id, event),
            UiEvent::ActionAttempt {
                pool,
                id,
                phase,
                action,
                attempt,
                attempts,
            } => {
                let row = self.container_row(&pool, &id);
                row.phase = Some(phase);
                row.action = action;
                row.attempt = attempt;
                row.attempts = attempts;
                row.error = None;
                self.flush_container(&id);
            }
            UiEvent::ActionResult {
                pool,
                id,
                phase,
                action,
                attempt,
                attempts,
                error,
            } => {
                let row = self.container_row(&pool, &id);
                row.phase = Some(phase);
                row.action = action;
                row.attempt = attempt;
                row.attempts = attempts;
                row.error = error;
                self.flush_container(&id);
            }
        }
    }

    fn handle_pool(&mut self, pool: String, event: PoolStatusEvent) {
        let row = self
            .pools
            .entry(pool.clone())
            .or_insert_with(|| PoolRow {
                name: pool,
                state: "initializing",
                ..Default::default()
            });

        match event {
            PoolStatusEvent::Initializing => row.state = "initializing",
            PoolStatusEvent::InitializeError(err) => {
                row.state = "error";
                row.error = Some(err);
            }
            PoolStatusEvent::Running => row.state = "running",
            PoolStatusEvent::Draining => row.state = "draining",
            PoolStatusEvent::Done => row.state = "stopped",
            PoolStatusEvent::NumItems(n) => row.num_items = n,
            PoolStatusEvent::NumPending(n) => row.num_pending = n,
            PoolStatusEvent::NumReady(n) => row.num_ready = n,
        }

        self.writer.update_pool(row);
    }

    fn handle_container(&mut self, pool: String, id: String, event: ContainerStatusEvent) {
        let row = self.container_row(&pool, &id);

        let state = match event {
            ContainerStatusEvent::Created => "created",
            ContainerStatusEvent::Started => "started",
            ContainerStatusEvent::Live => "live",
            ContainerStatusEvent::Ready => "ready",
            ContainerStatusEvent::Resetting => "resetting",
            ContainerStatusEvent::Exiting => "exiting",
            ContainerStatusEvent::Exited => "exited",
        };
        row.state = state;

        // Fresh phases start with a clean action column.
        if matches!(
            event,
            ContainerStatusEvent::Created
                | ContainerStatusEvent::Started
                | ContainerStatusEvent::Ready
                | ContainerStatusEvent::Resetting
        ) {
            row.clear_action();
        }

        if event == ContainerStatusEvent::Exited {
            if let Some(row) = self.containers.remove(&id) {
                self.writer.remove_container(&row);
            }
        } else {
            self.flush_container(&id);
        }
    }

    fn container_row(&mut self, pool: &str, id: &str) -> &mut ContainerRow {
        self.containers
            .entry(id.to_string())
            .or_insert_with(|| ContainerRow {
                pool: pool.to_string(),
                id: id.to_string(),
                state: "created",
                ..Default::default()
            })
    }

    fn flush_container(&mut self, id: &str) {
        if let Some(row) = self.containers.get(id) {
            self.writer.update_container(row);
        }
    }
}
