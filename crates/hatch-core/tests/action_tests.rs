//! Action runner tests: retry budget, timeout, delay and cancellation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hatch_common::events::{ContainerEmitter, Emitter, UiEvent};
use hatch_common::Params;
use hatch_core::{run_action, Action, ActionConfig, ActionError};

/// Action whose behavior is scripted by the test.
struct ScriptedAction {
    config: ActionConfig,
    calls: AtomicU32,
    /// Fail this many leading attempts.
    fail_first: u32,
    /// Never complete an attempt.
    hang: bool,
}

impl ScriptedAction {
    fn new(config: ActionConfig) -> Self {
        Self {
            config,
            calls: AtomicU32::new(0),
            fail_first: 0,
            hang: false,
        }
    }

    fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for ScriptedAction {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, _params: &Params) -> Result<(), ActionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return Ok(());
        }
        if call <= self.fail_first {
            return Err(ActionError::Failed(format!("scripted failure {call}")));
        }
        Ok(())
    }
}

fn params() -> Params {
    Params {
        id: "c-1".to_string(),
        hostname: "127.0.0.1".to_string(),
        port: 49200,
        ports: Default::default(),
        username: String::new(),
        password: String::new(),
        database: String::new(),
        url: String::new(),
    }
}

fn emitter() -> ContainerEmitter {
    Emitter::noop().for_pool("test").for_container("c-1")
}

fn fast_config(retries: u32) -> ActionConfig {
    ActionConfig {
        retries,
        timeout: Duration::from_millis(200),
        delay: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn succeeds_on_first_attempt() {
    let action = ScriptedAction::new(fast_config(3));
    let cancel = CancellationToken::new();

    let result = run_action("initialize", "test", &action, &params(), &cancel, &emitter()).await;

    assert!(result.is_ok());
    assert_eq!(action.calls(), 1);
}

#[tokio::test]
async fn retries_until_success() {
    let action = ScriptedAction::new(fast_config(3)).failing_first(2);
    let cancel = CancellationToken::new();

    let result = run_action("initialize", "test", &action, &params(), &cancel, &emitter()).await;

    assert!(result.is_ok());
    assert_eq!(action.calls(), 3);
}

#[tokio::test]
async fn never_exceeds_the_attempt_budget() {
    let action = ScriptedAction::new(fast_config(3)).failing_first(u32::MAX);
    let cancel = CancellationToken::new();

    let result = run_action("initialize", "test", &action, &params(), &cancel, &emitter()).await;

    match result {
        Err(ActionError::Failed(msg)) => assert!(msg.contains("3"), "last error reported: {msg}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(action.calls(), 3);
}

#[tokio::test]
async fn timed_out_attempts_are_abandoned_and_retried() {
    let action = ScriptedAction::new(ActionConfig {
        retries: 2,
        timeout: Duration::from_millis(20),
        delay: Duration::from_millis(5),
    })
    .hanging();
    let cancel = CancellationToken::new();

    let result = run_action("healthcheck", "test", &action, &params(), &cancel, &emitter()).await;

    assert!(matches!(result, Err(ActionError::Timeout)));
    assert_eq!(action.calls(), 2);
}

#[tokio::test]
async fn canceled_parent_aborts_without_running() {
    let action = ScriptedAction::new(fast_config(3));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = run_action("reset", "test", &action, &params(), &cancel, &emitter()).await;

    assert!(matches!(result, Err(ActionError::Canceled)));
    assert_eq!(action.calls(), 0);
}

#[tokio::test]
async fn cancellation_interrupts_the_inter_attempt_delay() {
    let action = Arc::new(
        ScriptedAction::new(ActionConfig {
            retries: 5,
            timeout: Duration::from_millis(100),
            delay: Duration::from_secs(60),
        })
        .failing_first(u32::MAX),
    );
    let cancel = CancellationToken::new();

    let task = {
        let action = action.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_action("reset", "test", &*action, &params(), &cancel, &emitter()).await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runner must stop promptly")
        .expect("task must not panic");

    assert!(matches!(result, Err(ActionError::Canceled)));
    assert_eq!(action.calls(), 1);
}

#[tokio::test]
async fn emits_attempt_and_result_events() {
    let (emitter, mut rx) = Emitter::channel();
    let scoped = emitter.for_pool("test").for_container("c-1");
    let action = ScriptedAction::new(fast_config(2)).failing_first(u32::MAX);
    let cancel = CancellationToken::new();

    let _ = run_action("initialize", "probe", &action, &params(), &cancel, &scoped).await;
    drop(emitter);

    let mut attempts = 0;
    let mut results = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            UiEvent::ActionAttempt {
                phase,
                ref action,
                attempts: budget,
                ..
            } => {
                assert_eq!(phase, "initialize");
                assert_eq!(action, "probe");
                assert_eq!(budget, 2);
                attempts += 1;
            }
            UiEvent::ActionResult { error, .. } => {
                assert!(error.is_some());
                results += 1;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(attempts, 2);
    assert_eq!(results, 2);
}
