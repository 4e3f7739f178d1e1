//! Configuration loading for pool definitions.
//!
//! The file is a YAML document of named pools (see [`PoolsFile`]). Parsing
//! validates structure and bounds; action type names are resolved later,
//! against the plugin registry, when pools are constructed.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use hatch_common::PoolsFile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load and validate a configuration file.
pub fn load(path: &Path) -> Result<PoolsFile, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let file = parse(&raw)?;
    info!(path = %path.display(), pools = file.pools.len(), "configuration loaded");
    Ok(file)
}

/// Parse and validate a configuration document.
pub fn parse(raw: &str) -> Result<PoolsFile, ConfigError> {
    let file: PoolsFile = serde_yaml::from_str(raw)?;
    validate(&file)?;
    Ok(file)
}

fn validate(file: &PoolsFile) -> Result<(), ConfigError> {
    if file.pools.is_empty() {
        return Err(ConfigError::Invalid("no pools defined".to_string()));
    }
    for (name, spec) in &file.pools {
        if spec.image.is_empty() {
            return Err(ConfigError::Invalid(format!("pool {name}: image is required")));
        }
        if spec.size == 0 {
            return Err(ConfigError::Invalid(format!(
                "pool {name}: size must be at least 1"
            )));
        }
        if spec.port == 0 {
            return Err(ConfigError::Invalid(format!("pool {name}: port is required")));
        }
        for entry in &spec.container.env {
            if !entry.contains('=') {
                return Err(ConfigError::Invalid(format!(
                    "pool {name}: env entry {entry:?} is not KEY=VAL"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pools:
  postgres:
    image: postgres:16
    size: 3
    port: 5432
    container:
      env:
        - POSTGRES_PASSWORD=secret
        - POSTGRES_DB=app
    params:
      username: postgres
      password: secret
      database: app
      url: "postgres://{{.Username}}:{{.Password}}@{{.Hostname}}:{{.Port}}/{{.Database}}"
    actions:
      healthcheck:
        type: postgres.ping
        retries: 10
        timeout: 500
        delay: 100
      reset:
        type: postgres.truncate
  redis:
    image: redis:7
    size: 2
    port: 6379
    actions:
      healthcheck:
        type: redis.ping
      reset:
        type: redis.truncate
"#;

    #[test]
    fn parses_a_full_document() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.pools.len(), 2);

        let pg = &file.pools["postgres"];
        assert_eq!(pg.size, 3);
        assert_eq!(pg.port, 5432);
        assert_eq!(pg.container.env.len(), 2);
        assert_eq!(pg.params.username, "postgres");

        let healthcheck = pg.actions.healthcheck.as_ref().unwrap();
        assert_eq!(healthcheck.kind, "postgres.ping");
        assert_eq!(healthcheck.retries, Some(10));
        assert_eq!(healthcheck.timeout, Some(500));

        assert!(pg.actions.initialize.is_none());
        assert!(pg.actions.reset.is_some());
    }

    #[test]
    fn pool_order_follows_the_document() {
        let file = parse(SAMPLE).unwrap();
        let names: Vec<_> = file.pools.keys().cloned().collect();
        assert_eq!(names, vec!["postgres", "redis"]);
    }

    #[test]
    fn plugin_fields_stay_available() {
        let raw = r#"
pools:
  web:
    image: nginx:1
    size: 1
    port: 80
    actions:
      healthcheck:
        type: http.get
        path: /healthz
"#;
        let file = parse(raw).unwrap();
        let healthcheck = file.pools["web"].actions.healthcheck.as_ref().unwrap();
        assert_eq!(
            healthcheck.rest.get("path").and_then(|v| v.as_str()),
            Some("/healthz")
        );
    }

    #[test]
    fn rejects_zero_size() {
        let raw = "pools:\n  p:\n    image: x\n    size: 0\n    port: 80\n";
        assert!(matches!(parse(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_missing_image() {
        let raw = "pools:\n  p:\n    image: \"\"\n    size: 1\n    port: 80\n";
        assert!(matches!(parse(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_env_entries() {
        let raw = "pools:\n  p:\n    image: x\n    size: 1\n    port: 80\n    container:\n      env: [JUSTAKEY]\n";
        assert!(matches!(parse(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_documents() {
        assert!(matches!(parse("pools: {}\n"), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_pool_fields() {
        let raw = "pools:\n  p:\n    image: x\n    size: 1\n    port: 80\n    bogus: true\n";
        assert!(matches!(parse(raw), Err(ConfigError::Yaml(_))));
    }
}
