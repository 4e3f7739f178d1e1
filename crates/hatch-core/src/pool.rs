//! Pool supervisor: population upkeep, checkout matching, drain.
//!
//! The supervisor task is the sole owner of the item table, the ready list
//! and the ticket queue. It never performs container I/O itself; creation
//! and per-item work run in child tasks that report back over channels.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hatch_common::events::{Emitter, PoolEmitter, PoolStatusEvent};
use hatch_common::Params;
use hatch_runtime::{ContainerRuntime, ContainerSpec, CreatedContainer, RuntimeError};

use crate::adapter::Adapter;
use crate::error::PoolError;
use crate::item::{self, ItemCommand, ItemHandle, ItemUpdate};
use crate::lifecycle::Lifecycle;
use crate::Result;

const CHECKOUT_BUFFER: usize = 16;
const CHECKIN_BUFFER: usize = 16;
const UPDATE_BUFFER: usize = 32;
const CREATION_BUFFER: usize = 16;

/// First retry delay after a replacement failure.
const CREATE_BACKOFF_BASE: Duration = Duration::from_millis(250);
/// Backoff ceiling.
const CREATE_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Everything needed to start a pool.
pub struct PoolOptions {
    pub name: String,
    /// Target population.
    pub size: usize,
    pub container: ContainerSpec,
    pub lifecycle: Lifecycle,
    pub adapter: Adapter,
}

/// A checked-out item. Return it with [`Pool::checkin`].
#[derive(Debug, Clone)]
pub struct Lease {
    pub params: Params,
}

impl Lease {
    pub fn id(&self) -> &str {
        &self.params.id
    }
}

/// Point-in-time pool accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub target: usize,
    /// Items currently alive (any non-exited state).
    pub items: usize,
    /// Creations in flight.
    pub pending: usize,
    /// Items on the ready list.
    pub ready: usize,
    pub draining: bool,
    pub done: bool,
}

struct CheckoutRequest {
    reply: oneshot::Sender<Result<Lease>>,
    cancel: CancellationToken,
}

/// A pool of interchangeable ready containers.
pub struct Pool {
    name: String,
    checkout_tx: mpsc::Sender<CheckoutRequest>,
    checkin_tx: mpsc::Sender<String>,
    status_rx: watch::Receiver<PoolStatus>,
    cancel: CancellationToken,
}

impl Pool {
    /// Spawn the supervisor and begin populating.
    pub fn start(
        options: PoolOptions,
        runtime: Arc<dyn ContainerRuntime>,
        emitter: &Emitter,
    ) -> Self {
        let (checkout_tx, checkout_rx) = mpsc::channel(CHECKOUT_BUFFER);
        let (checkin_tx, checkin_rx) = mpsc::channel(CHECKIN_BUFFER);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (creations_tx, creations_rx) = mpsc::channel(CREATION_BUFFER);
        let (status_tx, status_rx) = watch::channel(PoolStatus {
            target: options.size,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            name: options.name.clone(),
            target: options.size,
            container_spec: options.container,
            runtime,
            lifecycle: Arc::new(options.lifecycle),
            adapter: Arc::new(options.adapter),
            emitter: emitter.for_pool(&options.name),
            cancel: cancel.clone(),
            items: HashMap::new(),
            ready: VecDeque::new(),
            tickets: VecDeque::new(),
            pending_creates: 0,
            churn_failures: 0,
            updates_tx,
            updates_rx,
            creations_tx,
            creations_rx,
            checkout_rx,
            checkin_rx,
            status_tx,
            draining: false,
            announced_running: false,
            last_counts: (0, 0, 0),
        };
        tokio::spawn(supervisor.run());

        Self {
            name: options.name,
            checkout_tx,
            checkin_tx,
            status_rx,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> PoolStatus {
        self.status_rx.borrow().clone()
    }

    /// Check out a ready item, waiting for one if necessary.
    pub async fn checkout(&self) -> Result<Lease> {
        self.checkout_with_cancel(CancellationToken::new()).await
    }

    /// Check out a ready item; `cancel` withdraws the request.
    ///
    /// Cancellation after the pool already matched an item returns the item
    /// unused (it goes through reset like a normal return).
    pub async fn checkout_with_cancel(&self, cancel: CancellationToken) -> Result<Lease> {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let request = CheckoutRequest {
            reply: reply_tx,
            cancel: cancel.clone(),
        };
        if self.checkout_tx.send(request).await.is_err() {
            return Err(PoolError::Draining);
        }

        tokio::select! {
            result = &mut reply_rx => match result {
                Ok(result) => result,
                // A dropped reply either means the pool is going away or the
                // supervisor discarded this ticket after our cancellation.
                Err(_) if cancel.is_cancelled() => Err(PoolError::Canceled),
                Err(_) => Err(PoolError::Draining),
            },
            _ = cancel.cancelled() => {
                // Close first so no lease can slip in afterwards, then
                // reclaim one that already arrived.
                reply_rx.close();
                if let Ok(Ok(lease)) = reply_rx.try_recv() {
                    self.checkin(lease).await;
                }
                Err(PoolError::Canceled)
            }
        }
    }

    /// Return a checked-out item to the pool.
    ///
    /// Returns are accepted even while draining; the item is then destroyed
    /// instead of reset. A lease whose container already exited is ignored.
    pub async fn checkin(&self, lease: Lease) {
        if self
            .checkin_tx
            .send(lease.params.id.clone())
            .await
            .is_err()
        {
            debug!(pool = %self.name, container = %lease.params.id, "return after pool shutdown");
        }
    }

    /// Wait until the pool holds its full target of ready items.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.status_rx.clone();
        loop {
            {
                let status = rx.borrow_and_update();
                if status.draining || status.done {
                    return Err(PoolError::Draining);
                }
                if status.ready >= status.target {
                    return Ok(());
                }
            }
            if rx.changed().await.is_err() {
                return Err(PoolError::Draining);
            }
        }
    }

    /// Drain and shut down, returning once every item has exited.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut rx = self.status_rx.clone();
        loop {
            if rx.borrow_and_update().done {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

enum CreationResult {
    Created(CreatedContainer),
    Failed(RuntimeError),
    Aborted,
}

struct ItemEntry {
    handle: ItemHandle,
    params: Option<Params>,
    checked_out: bool,
    became_ready: bool,
}

struct Supervisor {
    name: String,
    target: usize,
    container_spec: ContainerSpec,
    runtime: Arc<dyn ContainerRuntime>,
    lifecycle: Arc<Lifecycle>,
    adapter: Arc<Adapter>,
    emitter: PoolEmitter,
    cancel: CancellationToken,

    items: HashMap<String, ItemEntry>,
    ready: VecDeque<String>,
    tickets: VecDeque<CheckoutRequest>,

    pending_creates: usize,
    /// Consecutive create failures or short-lived items; drives backoff.
    churn_failures: u32,

    updates_tx: mpsc::Sender<ItemUpdate>,
    updates_rx: mpsc::Receiver<ItemUpdate>,
    creations_tx: mpsc::Sender<CreationResult>,
    creations_rx: mpsc::Receiver<CreationResult>,
    checkout_rx: mpsc::Receiver<CheckoutRequest>,
    checkin_rx: mpsc::Receiver<String>,
    status_tx: watch::Sender<PoolStatus>,

    draining: bool,
    announced_running: bool,
    last_counts: (usize, usize, usize),
}

impl Supervisor {
    async fn run(mut self) {
        info!(pool = %self.name, target = self.target, "pool starting");
        self.emitter.emit(PoolStatusEvent::Initializing);
        self.replenish();
        self.publish();

        loop {
            tokio::select! {
                Some(update) = self.updates_rx.recv() => self.handle_update(update).await,
                Some(result) = self.creations_rx.recv() => self.handle_creation(result).await,
                Some(request) = self.checkout_rx.recv() => self.handle_checkout(request).await,
                Some(id) = self.checkin_rx.recv() => self.handle_checkin(&id).await,
                _ = self.cancel.cancelled(), if !self.draining => self.begin_drain().await,
            }

            if self.draining && self.items.is_empty() && self.pending_creates == 0 {
                break;
            }
            self.publish();
        }

        info!(pool = %self.name, "pool drained");
        self.emitter.emit(PoolStatusEvent::Done);
        self.status_tx.send_modify(|s| {
            s.draining = true;
            s.done = true;
            s.items = 0;
            s.pending = 0;
            s.ready = 0;
        });
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    fn replenish(&mut self) {
        if self.draining {
            return;
        }
        while self.items.len() + self.pending_creates < self.target {
            self.spawn_create();
        }
    }

    fn spawn_create(&mut self) {
        self.pending_creates += 1;
        let delay = self.create_delay();
        let runtime = self.runtime.clone();
        let spec = self.container_spec.clone();
        let results = self.creations_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = results.send(CreationResult::Aborted).await;
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => CreationResult::Aborted,
                created = runtime.create(&spec) => match created {
                    Ok(created) => CreationResult::Created(created),
                    Err(e) => CreationResult::Failed(e),
                },
            };
            let _ = results.send(result).await;
        });
    }

    fn create_delay(&self) -> Duration {
        if self.churn_failures == 0 {
            return Duration::ZERO;
        }
        let shift = (self.churn_failures - 1).min(16);
        CREATE_BACKOFF_CAP.min(CREATE_BACKOFF_BASE * 2u32.saturating_pow(shift))
    }

    async fn handle_creation(&mut self, result: CreationResult) {
        self.pending_creates = self.pending_creates.saturating_sub(1);
        match result {
            CreationResult::Created(created) => {
                if self.draining {
                    // Arrived after drain began; dispose of it directly.
                    let handle = created.handle;
                    tokio::spawn(async move {
                        let _ = handle.stop().await;
                    });
                    return;
                }
                let id = created.handle.id().to_string();
                debug!(pool = %self.name, container = %id, "item created");
                let handle = item::spawn(
                    created,
                    self.lifecycle.clone(),
                    self.adapter.clone(),
                    self.emitter.for_container(&id),
                    &self.cancel,
                    self.updates_tx.clone(),
                );
                handle.send(ItemCommand::Start).await;
                self.items.insert(
                    id,
                    ItemEntry {
                        handle,
                        params: None,
                        checked_out: false,
                        became_ready: false,
                    },
                );
            }
            CreationResult::Failed(e) => {
                warn!(pool = %self.name, error = %e, "container create failed");
                self.emitter
                    .emit(PoolStatusEvent::InitializeError(e.to_string()));
                self.churn_failures += 1;
            }
            CreationResult::Aborted => {}
        }
        self.replenish();
    }

    // ------------------------------------------------------------------
    // Item updates
    // ------------------------------------------------------------------

    async fn handle_update(&mut self, update: ItemUpdate) {
        match update {
            ItemUpdate::Ready { id, params } => {
                let Some(entry) = self.items.get_mut(&id) else {
                    return;
                };
                entry.params = Some(params);
                entry.checked_out = false;
                if !entry.became_ready {
                    entry.became_ready = true;
                    self.churn_failures = 0;
                }
                if self.draining {
                    entry.handle.send(ItemCommand::Kill).await;
                    return;
                }
                self.ready.push_back(id);
                self.try_match().await;
                if !self.announced_running && self.ready.len() >= self.target {
                    self.announced_running = true;
                    self.emitter.emit(PoolStatusEvent::Running);
                }
            }
            ItemUpdate::Exited { id } => {
                let was_immature = self
                    .items
                    .remove(&id)
                    .map(|entry| !entry.became_ready)
                    .unwrap_or(false);
                self.ready.retain(|ready_id| ready_id != &id);
                if was_immature && !self.draining {
                    self.churn_failures += 1;
                }
                debug!(pool = %self.name, container = %id, "item exited");
                self.replenish();
            }
        }
    }

    // ------------------------------------------------------------------
    // Checkout / return
    // ------------------------------------------------------------------

    async fn handle_checkout(&mut self, request: CheckoutRequest) {
        if self.draining {
            let _ = request.reply.send(Err(PoolError::Draining));
            return;
        }
        self.tickets.push_back(request);
        self.try_match().await;
    }

    async fn handle_checkin(&mut self, id: &str) {
        let Some(entry) = self.items.get_mut(id) else {
            debug!(pool = %self.name, container = %id, "return for unknown item");
            return;
        };
        if !entry.checked_out {
            debug!(pool = %self.name, container = %id, "return for item not checked out");
            return;
        }
        entry.checked_out = false;
        if self.draining {
            entry.handle.send(ItemCommand::Kill).await;
        } else {
            entry.handle.send(ItemCommand::Reset).await;
        }
    }

    async fn try_match(&mut self) {
        while !self.ready.is_empty() {
            let Some(ticket) = self.tickets.pop_front() else {
                break;
            };
            if ticket.cancel.is_cancelled() || ticket.reply.is_closed() {
                continue;
            }
            let Some(id) = self.ready.pop_front() else {
                self.tickets.push_front(ticket);
                break;
            };

            let lease = match self.items.get_mut(&id) {
                Some(entry) => match &entry.params {
                    Some(params) => {
                        entry.checked_out = true;
                        Lease {
                            params: params.clone(),
                        }
                    }
                    None => {
                        self.tickets.push_front(ticket);
                        continue;
                    }
                },
                None => {
                    self.tickets.push_front(ticket);
                    continue;
                }
            };

            if ticket.reply.send(Ok(lease)).is_err() {
                // Caller vanished between match and delivery: the item was
                // never used, recycle it through reset.
                self.handle_checkin(&id).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    async fn begin_drain(&mut self) {
        info!(pool = %self.name, "pool draining");
        self.draining = true;
        self.emitter.emit(PoolStatusEvent::Draining);
        self.status_tx.send_modify(|s| s.draining = true);

        for ticket in self.tickets.drain(..) {
            let _ = ticket.reply.send(Err(PoolError::Draining));
        }
        self.ready.clear();

        for entry in self.items.values() {
            if !entry.checked_out {
                entry.handle.send(ItemCommand::Kill).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    fn publish(&mut self) {
        let status = PoolStatus {
            target: self.target,
            items: self.items.len(),
            pending: self.pending_creates,
            ready: self.ready.len(),
            draining: self.draining,
            done: false,
        };

        let counts = (status.items, status.pending, status.ready);
        if counts != self.last_counts {
            let (items, pending, ready) = counts;
            self.emitter.emit(PoolStatusEvent::NumItems(items));
            self.emitter.emit(PoolStatusEvent::NumPending(pending));
            self.emitter.emit(PoolStatusEvent::NumReady(ready));
            self.last_counts = counts;
        }

        self.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
    }
}
