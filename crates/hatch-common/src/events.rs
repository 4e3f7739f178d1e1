//! Status events and the non-blocking emitter.
//!
//! Pools and items report progress through an [`Emitter`]. Submission never
//! blocks the producer: events go over a bounded channel with `try_send` and
//! are dropped when the consumer falls behind.

use tokio::sync::mpsc;

/// Default buffer size for the event channel.
const EVENT_BUFFER: usize = 64;

/// Pool-level status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolStatusEvent {
    Initializing,
    InitializeError(String),
    Running,
    Draining,
    /// The pool finished draining. Purely informational.
    Done,
    NumItems(usize),
    NumPending(usize),
    NumReady(usize),
}

/// Lifecycle state of one container, as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatusEvent {
    Created,
    Started,
    Live,
    Ready,
    Resetting,
    Exiting,
    Exited,
}

/// A single event delivered to the UI sink.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Pool {
        pool: String,
        event: PoolStatusEvent,
    },
    Container {
        pool: String,
        id: String,
        event: ContainerStatusEvent,
    },
    /// An action attempt is starting (`attempt` of `attempts`).
    ActionAttempt {
        pool: String,
        id: String,
        phase: &'static str,
        action: String,
        attempt: u32,
        attempts: u32,
    },
    /// An action attempt finished, possibly with an error.
    ActionResult {
        pool: String,
        id: String,
        phase: &'static str,
        action: String,
        attempt: u32,
        attempts: u32,
        error: Option<String>,
    },
}

/// Entry point for event submission.
///
/// Cloning is cheap; every clone feeds the same channel.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: Option<mpsc::Sender<UiEvent>>,
}

impl Emitter {
    /// An emitter whose events go nowhere. Used in tests.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// An emitter backed by a bounded channel, plus the receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn for_pool(&self, pool: &str) -> PoolEmitter {
        PoolEmitter {
            pool: pool.to_string(),
            tx: self.tx.clone(),
        }
    }

    fn send(tx: &Option<mpsc::Sender<UiEvent>>, event: UiEvent) {
        if let Some(tx) = tx {
            // Drop on full: the UI must never stall a producer.
            let _ = tx.try_send(event);
        }
    }
}

/// Emitter scoped to one pool.
#[derive(Debug, Clone)]
pub struct PoolEmitter {
    pool: String,
    tx: Option<mpsc::Sender<UiEvent>>,
}

impl PoolEmitter {
    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    pub fn emit(&self, event: PoolStatusEvent) {
        Emitter::send(
            &self.tx,
            UiEvent::Pool {
                pool: self.pool.clone(),
                event,
            },
        );
    }

    pub fn for_container(&self, id: &str) -> ContainerEmitter {
        ContainerEmitter {
            pool: self.pool.clone(),
            id: id.to_string(),
            tx: self.tx.clone(),
        }
    }
}

/// Emitter scoped to one container.
#[derive(Debug, Clone)]
pub struct ContainerEmitter {
    pool: String,
    id: String,
    tx: Option<mpsc::Sender<UiEvent>>,
}

impl ContainerEmitter {
    pub fn emit(&self, event: ContainerStatusEvent) {
        Emitter::send(
            &self.tx,
            UiEvent::Container {
                pool: self.pool.clone(),
                id: self.id.clone(),
                event,
            },
        );
    }

    pub fn action_attempt(&self, phase: &'static str, action: &str, attempt: u32, attempts: u32) {
        Emitter::send(
            &self.tx,
            UiEvent::ActionAttempt {
                pool: self.pool.clone(),
                id: self.id.clone(),
                phase,
                action: action.to_string(),
                attempt,
                attempts,
            },
        );
    }

    pub fn action_result(
        &self,
        phase: &'static str,
        action: &str,
        attempt: u32,
        attempts: u32,
        error: Option<&dyn std::fmt::Display>,
    ) {
        Emitter::send(
            &self.tx,
            UiEvent::ActionResult {
                pool: self.pool.clone(),
                id: self.id.clone(),
                phase,
                action: action.to_string(),
                attempt,
                attempts,
                error: error.map(|e| e.to_string()),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_emitter_delivers_scoped_events() {
        let (emitter, mut rx) = Emitter::channel();
        let pool = emitter.for_pool("pg");
        pool.emit(PoolStatusEvent::Initializing);
        pool.for_container("c1").emit(ContainerStatusEvent::Created);

        match rx.recv().await {
            Some(UiEvent::Pool { pool, event }) => {
                assert_eq!(pool, "pg");
                assert_eq!(event, PoolStatusEvent::Initializing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await {
            Some(UiEvent::Container { id, event, .. }) => {
                assert_eq!(id, "c1");
                assert_eq!(event, ContainerStatusEvent::Created);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn noop_emitter_is_silent() {
        let emitter = Emitter::noop();
        emitter.for_pool("p").emit(PoolStatusEvent::Running);
    }
}
