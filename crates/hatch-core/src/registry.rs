//! Process-global registry of action plugins.
//!
//! Plugins are `(type-name, parser)` pairs registered once at process start;
//! configuration resolution looks declared actions up by type name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::RwLock;

use hatch_common::ActionSpec;

use crate::action::Action;
use crate::error::PoolError;

/// Builds an action instance from its raw declaration.
pub type ActionParser = fn(&ActionSpec) -> Result<Arc<dyn Action>, PoolError>;

fn parsers() -> &'static RwLock<BTreeMap<&'static str, ActionParser>> {
    static PARSERS: OnceLock<RwLock<BTreeMap<&'static str, ActionParser>>> = OnceLock::new();
    PARSERS.get_or_init(Default::default)
}

/// Register a plugin under its type name. Last registration wins.
pub fn register_action(kind: &'static str, parser: ActionParser) {
    parsers().write().insert(kind, parser);
}

/// Resolve a declared action to an instance via its registered plugin.
pub fn resolve_action(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    let parser = parsers()
        .read()
        .get(spec.kind.as_str())
        .copied()
        .ok_or_else(|| PoolError::Config(format!("unknown action type: {}", spec.kind)))?;
    parser(spec)
}

/// Type names currently registered, sorted.
pub fn registered_actions() -> Vec<&'static str> {
    parsers().read().keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionConfig, ActionError};
    use async_trait::async_trait;
    use hatch_common::Params;

    struct NoopAction(ActionConfig);

    #[async_trait]
    impl Action for NoopAction {
        fn config(&self) -> &ActionConfig {
            &self.0
        }
        async fn run(&self, _params: &Params) -> Result<(), ActionError> {
            Ok(())
        }
    }

    fn parse_noop(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
        Ok(Arc::new(NoopAction(ActionConfig::from_spec(
            spec,
            ActionConfig::default(),
        ))))
    }

    #[test]
    fn resolves_registered_kind() {
        register_action("test.noop", parse_noop);
        let spec = ActionSpec::of_kind("test.noop");
        let action = resolve_action(&spec).unwrap();
        assert_eq!(action.config().retries, 3);
        assert!(registered_actions().contains(&"test.noop"));
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let spec = ActionSpec::of_kind("no.such.plugin");
        match resolve_action(&spec) {
            Err(PoolError::Config(msg)) => assert!(msg.contains("no.such.plugin")),
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("expected config error, got an action"),
        }
    }

    #[test]
    fn spec_retry_fields_override_defaults() {
        register_action("test.noop2", parse_noop);
        let mut spec = ActionSpec::of_kind("test.noop2");
        spec.retries = Some(7);
        spec.timeout = Some(50);
        let action = resolve_action(&spec).unwrap();
        assert_eq!(action.config().retries, 7);
        assert_eq!(action.config().timeout, std::time::Duration::from_millis(50));
    }
}
