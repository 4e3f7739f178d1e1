//! The per-pool action set: healthcheck, initialize, reset.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hatch_common::events::ContainerEmitter;
use hatch_common::{LifecycleSpec, Params};

use crate::action::{run_action, Action, ActionError};
use crate::error::PoolError;
use crate::registry::resolve_action;

pub const PHASE_HEALTHCHECK: &str = "healthcheck";
pub const PHASE_INITIALIZE: &str = "initialize";
pub const PHASE_RESET: &str = "reset";

#[derive(Clone)]
struct NamedAction {
    name: String,
    action: Arc<dyn Action>,
}

/// Lifecycle actions configured for one pool. All three phases are optional.
#[derive(Clone, Default)]
pub struct Lifecycle {
    healthcheck: Option<NamedAction>,
    initialize: Option<NamedAction>,
    reset: Option<NamedAction>,
}

impl Lifecycle {
    pub fn builder() -> LifecycleBuilder {
        LifecycleBuilder::default()
    }

    /// Resolve a declaration against the plugin registry.
    pub fn from_spec(spec: &LifecycleSpec) -> Result<Self, PoolError> {
        let mut builder = Self::builder();
        if let Some(s) = &spec.healthcheck {
            builder = builder.healthcheck(&s.kind, resolve_action(s)?);
        }
        if let Some(s) = &spec.initialize {
            builder = builder.initialize(&s.kind, resolve_action(s)?);
        }
        if let Some(s) = &spec.reset {
            builder = builder.reset(&s.kind, resolve_action(s)?);
        }
        Ok(builder.build())
    }

    pub fn has_healthcheck(&self) -> bool {
        self.healthcheck.is_some()
    }

    pub fn has_initialize(&self) -> bool {
        self.initialize.is_some()
    }

    pub fn has_reset(&self) -> bool {
        self.reset.is_some()
    }

    pub(crate) async fn run_healthcheck(
        &self,
        params: &Params,
        cancel: &CancellationToken,
        emitter: &ContainerEmitter,
    ) -> Result<(), ActionError> {
        Self::run_phase(PHASE_HEALTHCHECK, &self.healthcheck, params, cancel, emitter).await
    }

    pub(crate) async fn run_initialize(
        &self,
        params: &Params,
        cancel: &CancellationToken,
        emitter: &ContainerEmitter,
    ) -> Result<(), ActionError> {
        Self::run_phase(PHASE_INITIALIZE, &self.initialize, params, cancel, emitter).await
    }

    pub(crate) async fn run_reset(
        &self,
        params: &Params,
        cancel: &CancellationToken,
        emitter: &ContainerEmitter,
    ) -> Result<(), ActionError> {
        Self::run_phase(PHASE_RESET, &self.reset, params, cancel, emitter).await
    }

    async fn run_phase(
        phase: &'static str,
        slot: &Option<NamedAction>,
        params: &Params,
        cancel: &CancellationToken,
        emitter: &ContainerEmitter,
    ) -> Result<(), ActionError> {
        match slot {
            Some(named) => {
                run_action(phase, &named.name, &*named.action, params, cancel, emitter).await
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct LifecycleBuilder {
    healthcheck: Option<NamedAction>,
    initialize: Option<NamedAction>,
    reset: Option<NamedAction>,
}

impl LifecycleBuilder {
    pub fn healthcheck(mut self, name: &str, action: Arc<dyn Action>) -> Self {
        self.healthcheck = Some(NamedAction {
            name: name.to_string(),
            action,
        });
        self
    }

    pub fn initialize(mut self, name: &str, action: Arc<dyn Action>) -> Self {
        self.initialize = Some(NamedAction {
            name: name.to_string(),
            action,
        });
        self
    }

    pub fn reset(mut self, name: &str, action: Arc<dyn Action>) -> Self {
        self.reset = Some(NamedAction {
            name: name.to_string(),
            action,
        });
        self
    }

    pub fn build(self) -> Lifecycle {
        Lifecycle {
            healthcheck: self.healthcheck,
            initialize: self.initialize,
            reset: self.reset,
        }
    }
}
