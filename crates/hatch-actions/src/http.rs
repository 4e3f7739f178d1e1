//! HTTP GET probe: any 2xx response counts as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use hatch_common::{ActionSpec, Params};
use hatch_core::{Action, ActionConfig, ActionError, PoolError};

const DEFAULTS: ActionConfig = ActionConfig {
    retries: 10,
    timeout: Duration::from_secs(2),
    delay: Duration::from_millis(250),
};

#[derive(Debug, Default, Deserialize)]
struct Fields {
    /// Path probed on the container's published port. When absent the
    /// pool's rendered URL is used as-is.
    #[serde(default)]
    path: Option<String>,
}

pub fn parse(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    let fields: Fields = spec
        .plugin_fields()
        .map_err(|e| PoolError::Config(format!("http.get: {e}")))?;
    Ok(Arc::new(HttpGet {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        path: fields.path,
        client: reqwest::Client::new(),
    }))
}

struct HttpGet {
    config: ActionConfig,
    path: Option<String>,
    client: reqwest::Client,
}

impl HttpGet {
    fn url(&self, params: &Params) -> String {
        match &self.path {
            Some(path) => format!("http://{}:{}{}", params.hostname, params.port, path),
            None => params.url.clone(),
        }
    }
}

#[async_trait]
impl Action for HttpGet {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        let url = self.url(params);
        if url.is_empty() {
            return Err(ActionError::Failed(
                "no url template and no path configured".to_string(),
            ));
        }
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ActionError::failed)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Failed(format!("{url}: status {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
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

    async fn one_shot_server(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
                let _ = socket.write_all(body.as_bytes()).await;
            }
        });
        port
    }

    fn action(path: &str) -> Arc<dyn Action> {
        let mut spec = ActionSpec::of_kind("http.get");
        spec.rest.insert(
            "path".to_string(),
            serde_json::Value::String(path.to_string()),
        );
        parse(&spec).unwrap()
    }

    #[tokio::test]
    async fn accepts_2xx() {
        let port = one_shot_server("HTTP/1.1 204 No Content").await;
        action("/healthz").run(&params(port)).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_5xx() {
        let port = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        assert!(action("/healthz").run(&params(port)).await.is_err());
    }

    #[tokio::test]
    async fn empty_url_and_path_is_an_error() {
        let action = parse(&ActionSpec::of_kind("http.get")).unwrap();
        assert!(action.run(&params(1)).await.is_err());
    }
}
