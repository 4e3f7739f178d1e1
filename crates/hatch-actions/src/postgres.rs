//! Postgres actions: ping, truncate, exec-query.
//!
//! Each attempt opens a fresh connection against the rendered URL; pooling
//! would defeat the point of probing a container that may still be starting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgConnection;
use sqlx::Connection;

use hatch_common::{ActionSpec, Params};
use hatch_core::{Action, ActionConfig, ActionError, PoolError};

const DEFAULTS: ActionConfig = ActionConfig {
    retries: 10,
    timeout: Duration::from_millis(750),
    delay: Duration::from_millis(250),
};

/// Empties every table in the public schema.
const TRUNCATE_SQL: &str = r#"
DO $$
DECLARE
    r RECORD;
BEGIN
    FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = 'public') LOOP
        EXECUTE 'TRUNCATE TABLE public.' || quote_ident(r.tablename) || ' CASCADE';
    END LOOP;
END $$;
"#;

pub fn parse_ping(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    Ok(Arc::new(PgQuery {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        query: "SELECT 1".to_string(),
    }))
}

pub fn parse_truncate(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    Ok(Arc::new(PgQuery {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        query: TRUNCATE_SQL.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct ExecFields {
    query: String,
}

pub fn parse_exec(spec: &ActionSpec) -> Result<Arc<dyn Action>, PoolError> {
    let fields: ExecFields = spec
        .plugin_fields()
        .map_err(|e| PoolError::Config(format!("postgres.exec: {e}")))?;
    Ok(Arc::new(PgQuery {
        config: ActionConfig::from_spec(spec, DEFAULTS),
        query: fields.query,
    }))
}

struct PgQuery {
    config: ActionConfig,
    query: String,
}

#[async_trait]
impl Action for PgQuery {
    fn config(&self) -> &ActionConfig {
        &self.config
    }

    async fn run(&self, params: &Params) -> Result<(), ActionError> {
        let mut conn = PgConnection::connect(&params.url)
            .await
            .map_err(ActionError::failed)?;
        let result = sqlx::query(&self.query).execute(&mut conn).await;
        let _ = conn.close().await;
        result.map_err(ActionError::failed)?;
        Ok(())
    }
}
