//! The named pools hosted by one process.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use indexmap::IndexMap;
use tracing::info;

use hatch_common::events::Emitter;
use hatch_common::PoolsFile;
use hatch_runtime::{ContainerRuntime, ContainerSpec};

use crate::adapter::Adapter;
use crate::error::PoolError;
use crate::lifecycle::Lifecycle;
use crate::pool::{Lease, Pool, PoolOptions, PoolStatus};
use crate::Result;

/// Label applied to every managed container.
pub const POOL_LABEL: &str = "io.hatchery.pool";

/// Independent pools indexed by name, in declaration order.
pub struct PoolSet {
    pools: IndexMap<String, Pool>,
}

impl PoolSet {
    /// Build and start every pool in the configuration document.
    ///
    /// All declarations are resolved before any pool starts, so a bad
    /// action type fails construction without leaving containers behind.
    pub fn from_file(
        file: &PoolsFile,
        runtime: Arc<dyn ContainerRuntime>,
        emitter: &Emitter,
    ) -> Result<Self> {
        let mut resolved = Vec::with_capacity(file.pools.len());
        for (name, spec) in &file.pools {
            if spec.size == 0 {
                return Err(PoolError::Config(format!(
                    "pool {name}: size must be at least 1"
                )));
            }
            let lifecycle = Lifecycle::from_spec(&spec.actions)
                .map_err(|e| PoolError::Config(format!("pool {name}: {e}")))?;
            let adapter = Adapter::new(spec.port, spec.params.clone());
            let container = ContainerSpec {
                image: spec.image.clone(),
                env: spec.container.env.clone(),
                exposed_port: spec.port,
                labels: HashMap::from([(POOL_LABEL.to_string(), name.clone())]),
            };
            resolved.push(PoolOptions {
                name: name.clone(),
                size: spec.size,
                container,
                lifecycle,
                adapter,
            });
        }

        let mut pools = IndexMap::new();
        for options in resolved {
            let name = options.name.clone();
            pools.insert(name, Pool::start(options, runtime.clone(), emitter));
        }
        info!(pools = pools.len(), "pool set started");
        Ok(Self { pools })
    }

    pub fn get(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Pool)> {
        self.pools.iter()
    }

    /// Per-pool status snapshots, in declaration order.
    pub fn statuses(&self) -> Vec<(String, PoolStatus)> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.status()))
            .collect()
    }

    fn pool(&self, name: &str) -> Result<&Pool> {
        self.pools
            .get(name)
            .ok_or_else(|| PoolError::PoolNotFound(name.to_string()))
    }

    pub async fn checkout(&self, name: &str) -> Result<Lease> {
        self.pool(name)?.checkout().await
    }

    pub async fn checkin(&self, name: &str, lease: Lease) -> Result<()> {
        self.pool(name)?.checkin(lease).await;
        Ok(())
    }

    /// Wait until every pool holds its full ready target.
    pub async fn wait_ready(&self) -> Result<()> {
        future::try_join_all(self.pools.values().map(|pool| pool.wait_ready())).await?;
        Ok(())
    }

    /// Drain all pools concurrently; returns once every item has exited.
    pub async fn stop(&self) {
        future::join_all(self.pools.values().map(|pool| pool.stop())).await;
        info!("pool set stopped");
    }
}
