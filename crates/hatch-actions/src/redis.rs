//! Redis actions: ping and truncate (FLUSHALL).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hatch_common::{ActionSpec, Params};
use hatch_core::{Action, ActionConfig, ActionError, PoolError};

const DEFAULTS: ActionConfig = ActionConfig {
    retries: 10,
    timeout: Duration::from_millis(500),
    delay: Duration::from_millis(100),
};

pub fn parse_ping(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    Ok(Arc::new(RedisCommand {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        command: "PING",
    }))
}

pub fn parse_truncate(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    Ok(Arc::new(RedisCommand {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        command: "FLUSHALL",
    }))
}

struct RedisCommand {
    config: ActionConfig,
    command: &'static str,
}

impl RedisCommand {
    fn url(params: &Params) -> String {
        if params.url.is_empty() {
            format!("redis://{}:{}", params.hostname, params.port)
        } else {
            params.url.clone()
        }
    }
}

#[async_trait]
impl Action for RedisCommand {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        let client = redis::Client::open(Self::url(params)).map_err(ActionError::failed)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(ActionError::failed)?;
        redis::cmd(self.command)
            .query_async::<()>(&mut conn)
            .await
            .map_err(ActionError::failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_falls_back_to_host_and_port() {
        let params = Params {
            id: "c".to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 49300,
            ports: Default::default(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            url: String::new(),
        };
        assert_eq!(RedisCommand::url(&params), "redis://127.0.0.1:49300");
    }
}
