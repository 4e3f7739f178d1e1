//! Pool lifecycle engine.
//!
//! This crate keeps warm populations of containerized backing services and
//! hands them out to callers:
//! - [`Pool`]: supervisor maintaining a target population, matching checkout
//!   requests to ready containers FIFO, and draining on stop
//! - item actors: one serial state machine per container
//! - [`Action`]/[`run_action`]: the lifecycle action contract with
//!   retry/timeout/delay semantics
//! - [`Lifecycle`]: the healthcheck/initialize/reset action set of a pool
//! - [`Adapter`]: connection parameters from an inspection snapshot
//! - [`PoolSet`]: the named pools hosted by one process

pub mod action;
pub mod adapter;
pub mod error;
mod item;
pub mod lifecycle;
pub mod pool;
pub mod poolset;
pub mod registry;

pub use action::{run_action, Action, ActionConfig, ActionError};
pub use adapter::Adapter;
pub use error::PoolError;
pub use lifecycle::{Lifecycle, LifecycleBuilder};
pub use pool::{Lease, Pool, PoolOptions, PoolStatus};
pub use poolset::PoolSet;
pub use registry::{register_action, registered_actions, resolve_action, ActionParser};

pub type Result<T> = std::result::Result<T, PoolError>;
