//! Generic TCP dial: the service is live once its port accepts a connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use hatch_common::{ActionSpec, Params};
use hatch_core::{Action, ActionConfig, ActionError, PoolError};

const DEFAULTS: ActionConfig = ActionConfig {
    retries: 10,
    timeout: Duration::from_secs(1),
    delay: Duration::from_millis(250),
};

pub fn parse(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    Ok(Arc::new(TcpConnect {
        config: ActionConfig::from_spec(spec, DEFAULTS),
    }))
}

struct TcpConnect {
    config: ActionConfig,
}

#[async_trait]
impl Action for TcpConnect {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        TcpStream::connect((params.hostname.as_str(), params.port))
            .await
            .map_err(ActionError::failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn params(port: u16) -> Params {
        Params {
            id: "c-1".to_string(),
            hostname: "127.0.0.1".to_string(),
            port,
            ports: Default::default(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn connects_to_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let action = parse(&ActionSpec::of_kind("tcp.connect")).unwrap();
        action.run(&params(port)).await.unwrap();
    }

    #[tokio::test]
    async fn fails_when_nothing_listens() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let action = parse(&ActionSpec::of_kind("tcp.connect")).unwrap();
        assert!(action.run(&params(port)).await.is_err());
    }
}
