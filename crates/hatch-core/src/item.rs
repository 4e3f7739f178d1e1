//! Per-container state machine.
//!
//! Each item is a single-owner actor: one task receives container lifecycle
//! events, pool commands and action results, and is the only mutator of the
//! item's state. Action work runs in child tasks and reports back through
//! the signal channel, so transitions stay serial.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hatch_common::events::{ContainerEmitter, ContainerStatusEvent};
use hatch_common::Params;
use hatch_runtime::{ContainerEvent, ContainerHandle, CreatedContainer};

use crate::action::ActionError;
use crate::adapter::Adapter;
use crate::lifecycle::Lifecycle;

const CMD_BUFFER: usize = 4;
const SIGNAL_BUFFER: usize = 4;

/// Commands a pool may send its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemCommand {
    Start,
    /// The caller returned the item: run the reset phase, or exit when no
    /// reset action is configured.
    Reset,
    Kill,
}

/// Notifications an item sends its pool.
#[derive(Debug)]
pub(crate) enum ItemUpdate {
    Ready { id: String, params: Params },
    Exited { id: String },
}

/// Result of a lifecycle phase, posted back into the serial loop.
enum ItemSignal {
    Live,
    LiveError,
    Ready(Params),
    ReadyError,
    ResetError,
    StartFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemState {
    Created,
    Started,
    Live,
    Ready,
    Resetting,
    Exiting,
}

/// Pool-side handle to a running item actor.
pub(crate) struct ItemHandle {
    pub(crate) id: String,
    cmd_tx: mpsc::Sender<ItemCommand>,
}

impl ItemHandle {
    pub(crate) async fn send(&self, cmd: ItemCommand) {
        if self.cmd_tx.send(cmd).await.is_err() {
            debug!(container = %self.id, ?cmd, "command after item exit");
        }
    }
}

pub(crate) fn spawn(
    created: CreatedContainer,
    lifecycle: Arc<Lifecycle>,
    adapter: Arc<Adapter>,
    emitter: ContainerEmitter,
    parent: &CancellationToken,
    updates: mpsc::Sender<ItemUpdate>,
) -> ItemHandle {
    let container: Arc<dyn ContainerHandle> = Arc::from(created.handle);
    let id = container.id().to_string();
    let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);

    let actor = ItemActor {
        id: id.clone(),
        container,
        container_events: created.events,
        lifecycle,
        adapter,
        emitter,
        cancel: parent.child_token(),
        cmd_rx,
        signal_tx,
        signal_rx,
        updates,
        state: ItemState::Created,
        workers: JoinSet::new(),
    };
    tokio::spawn(actor.run());

    ItemHandle { id, cmd_tx }
}

struct ItemActor {
    id: String,
    container: Arc<dyn ContainerHandle>,
    container_events: mpsc::Receiver<ContainerEvent>,
    lifecycle: Arc<Lifecycle>,
    adapter: Arc<Adapter>,
    emitter: ContainerEmitter,
    cancel: CancellationToken,
    cmd_rx: mpsc::Receiver<ItemCommand>,
    signal_tx: mpsc::Sender<ItemSignal>,
    signal_rx: mpsc::Receiver<ItemSignal>,
    updates: mpsc::Sender<ItemUpdate>,
    state: ItemState,
    workers: JoinSet<()>,
}

impl ItemActor {
    async fn run(mut self) {
        self.emitter.emit(ContainerStatusEvent::Created);

        loop {
            tokio::select! {
                event = self.container_events.recv() => match event {
                    Some(ContainerEvent::Started) => self.on_container_started(),
                    Some(ContainerEvent::ExitSuccess)
                    | Some(ContainerEvent::ExitError)
                    | Some(ContainerEvent::StartFailed)
                    | None => break,
                },
                Some(cmd) = self.cmd_rx.recv() => match cmd {
                    ItemCommand::Start => self.on_start(),
                    ItemCommand::Reset => self.on_reset(),
                    ItemCommand::Kill => self.begin_exit(),
                },
                Some(signal) = self.signal_rx.recv() => self.on_signal(signal).await,
            }
        }

        self.finish().await;
    }

    fn on_start(&mut self) {
        if self.state != ItemState::Created {
            return;
        }
        let container = self.container.clone();
        let signals = self.signal_tx.clone();
        self.workers.spawn(async move {
            if let Err(e) = container.start().await {
                warn!(container = %container.id(), error = %e, "container start failed");
                let _ = signals.send(ItemSignal::StartFailed).await;
            }
        });
    }

    fn on_container_started(&mut self) {
        self.state = ItemState::Started;
        self.emitter.emit(ContainerStatusEvent::Started);

        let lifecycle = self.lifecycle.clone();
        let deps = self.phase_deps();
        self.workers.spawn(async move {
            let signal = match deps.params().await {
                Err(()) => ItemSignal::LiveError,
                Ok(params) => {
                    match lifecycle
                        .run_healthcheck(&params, &deps.cancel, &deps.emitter)
                        .await
                    {
                        Ok(()) => ItemSignal::Live,
                        Err(ActionError::Canceled) => return,
                        Err(_) => ItemSignal::LiveError,
                    }
                }
            };
            let _ = deps.signals.send(signal).await;
        });
    }

    async fn on_signal(&mut self, signal: ItemSignal) {
        if self.state == ItemState::Exiting {
            // A phase result that raced the exit decision; the container is
            // already stopping, so only the exit event matters now.
            return;
        }
        match signal {
            ItemSignal::Live => {
                self.state = ItemState::Live;
                self.emitter.emit(ContainerStatusEvent::Live);
                self.spawn_initialize();
            }
            ItemSignal::Ready(params) => {
                self.state = ItemState::Ready;
                self.emitter.emit(ContainerStatusEvent::Ready);
                let _ = self
                    .updates
                    .send(ItemUpdate::Ready {
                        id: self.id.clone(),
                        params,
                    })
                    .await;
            }
            ItemSignal::LiveError
            | ItemSignal::ReadyError
            | ItemSignal::ResetError
            | ItemSignal::StartFailed => self.begin_exit(),
        }
    }

    fn spawn_initialize(&mut self) {
        let lifecycle = self.lifecycle.clone();
        let deps = self.phase_deps();
        self.workers.spawn(async move {
            let signal = match deps.params().await {
                Err(()) => ItemSignal::ReadyError,
                Ok(params) => {
                    match lifecycle
                        .run_initialize(&params, &deps.cancel, &deps.emitter)
                        .await
                    {
                        Ok(()) => ItemSignal::Ready(params),
                        Err(ActionError::Canceled) => return,
                        Err(_) => ItemSignal::ReadyError,
                    }
                }
            };
            let _ = deps.signals.send(signal).await;
        });
    }

    fn on_reset(&mut self) {
        if self.state == ItemState::Exiting {
            return;
        }
        self.state = ItemState::Resetting;
        self.emitter.emit(ContainerStatusEvent::Resetting);

        if !self.lifecycle.has_reset() {
            self.begin_exit();
            return;
        }

        let lifecycle = self.lifecycle.clone();
        let deps = self.phase_deps();
        self.workers.spawn(async move {
            let signal = match deps.params().await {
                Err(()) => ItemSignal::ResetError,
                Ok(params) => {
                    match lifecycle
                        .run_reset(&params, &deps.cancel, &deps.emitter)
                        .await
                    {
                        Ok(()) => ItemSignal::Ready(params),
                        Err(ActionError::Canceled) => return,
                        Err(_) => ItemSignal::ResetError,
                    }
                }
            };
            let _ = deps.signals.send(signal).await;
        });
    }

    fn begin_exit(&mut self) {
        if self.state == ItemState::Exiting {
            return;
        }
        self.state = ItemState::Exiting;
        self.emitter.emit(ContainerStatusEvent::Exiting);
        // Abort in-flight phase work; the container exit event ends the loop.
        self.cancel.cancel();

        let container = self.container.clone();
        self.workers.spawn(async move {
            if let Err(e) = container.stop().await {
                warn!(container = %container.id(), error = %e, "container stop failed");
            }
        });
    }

    async fn finish(mut self) {
        self.emitter.emit(ContainerStatusEvent::Exited);
        let _ = self
            .updates
            .send(ItemUpdate::Exited {
                id: self.id.clone(),
            })
            .await;

        self.cancel.cancel();

        // Let workers wind down, discarding anything they still report.
        loop {
            tokio::select! {
                joined = self.workers.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                Some(_) = self.signal_rx.recv() => {}
                Some(cmd) = self.cmd_rx.recv() => {
                    debug!(container = %self.id, ?cmd, "stale command discarded");
                }
            }
        }
    }

    fn phase_deps(&self) -> PhaseDeps {
        PhaseDeps {
            container: self.container.clone(),
            adapter: self.adapter.clone(),
            emitter: self.emitter.clone(),
            cancel: self.cancel.clone(),
            signals: self.signal_tx.clone(),
        }
    }
}

/// Everything a phase worker task needs, detached from the actor.
struct PhaseDeps {
    container: Arc<dyn ContainerHandle>,
    adapter: Arc<Adapter>,
    emitter: ContainerEmitter,
    cancel: CancellationToken,
    signals: mpsc::Sender<ItemSignal>,
}

impl PhaseDeps {
    async fn params(&self) -> Result<Params, ()> {
        let status = match self.container.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(container = %self.container.id(), error = %e, "inspect failed");
                return Err(());
            }
        };
        self.adapter.make_params(&status).map_err(|e| {
            warn!(container = %self.container.id(), error = %e, "params unavailable");
        })
    }
}
