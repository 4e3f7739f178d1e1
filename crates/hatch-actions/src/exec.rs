//! Process exec: run an argv, exit code zero counts as success.
//!
//! The connection parameters are exported to the child through
//! `HATCHERY_*` environment variables.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use hatch_common::{ActionSpec, Params};
use hatch_core::{Action, ActionConfig, ActionError, PoolError};

const DEFAULTS: ActionConfig = ActionConfig {
    retries: 3,
    timeout: Duration::from_secs(5),
    delay: Duration::from_millis(500),
};

#[derive(Debug, Deserialize)]
struct Fields {
    command: Vec<String>,
}

pub fn parse(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    let fields: Fields = spec
        .plugin_fields()
        .map_err(|e| PoolError::Config(format!("exec: {e}")))?;
    if fields.command.is_empty() {
        return Err(PoolError::Config("exec: command must not be empty".to_string()));
    }
    Ok(Arc::new(Exec {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        command: fields.command,
    }))
}

struct Exec {
    config: ActionConfig,
    command: Vec<String>,
}

#[async_trait]
impl Action for Exec {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        let status = Command::new(&self.command[0])
            .args(&self.command[1..])
            .env("HATCHERY_ID", &params.id)
            .env("HATCHERY_HOSTNAME", &params.hostname)
            .env("HATCHERY_PORT", params.port.to_string())
            .env("HATCHERY_USERNAME", &params.username)
            .env("HATCHERY_PASSWORD", &params.password)
            .env("HATCHERY_DATABASE", &params.database)
            .env("HATCHERY_URL", &params.url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(ActionError::failed)?;

        if !status.success() {
            return Err(ActionError::Failed(format!(
                "{} exited with {status}",
                self.command[0]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn spec_with_command(argv: &[&str]) -> ActionSpec {
        let mut spec = ActionSpec::of_kind("exec");
        spec.rest.insert(
            "command".to_string(),
            serde_json::Value::Array(
                argv.iter()
                    .map(|s| serde_json::Value::String(s.to_string()))
                    .collect(),
            ),
        );
        spec
    }

    #[tokio::test]
    async fn exit_zero_is_success() {
        let action = parse(&spec_with_command(&["true"])).unwrap();
        action.run(&params()).await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let action = parse(&spec_with_command(&["false"])).unwrap();
        assert!(action.run(&params()).await.is_err());
    }

    #[tokio::test]
    async fn params_are_exported_through_the_environment() {
        let action = parse(&spec_with_command(&[
            "sh",
            "-c",
            "test \"$HATCHERY_PORT\" = 49200",
        ]))
        .unwrap();
        action.run(&params()).await.unwrap();
    }

    #[test]
    fn empty_command_is_a_config_error() {
        let mut spec = ActionSpec::of_kind("exec");
        spec.rest.insert(
            "command".to_string(),
            serde_json::Value::Array(Vec::new()),
        );
        assert!(parse(&spec).is_err());
    }

    #[test]
    fn missing_command_is_a_config_error() {
        assert!(parse(&ActionSpec::of_kind("exec")).is_err());
    }
}
