use thiserror::Error;

use hatch_runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("pool is draining")]
    Draining,

    #[error("checkout canceled")]
    Canceled,

    #[error("pool not found: {0}")]
    PoolNotFound(String),
}
