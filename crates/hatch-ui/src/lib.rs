//! Passive status sink.
//!
//! A processor task consumes [`UiEvent`]s from the engine's emitter channel,
//! keeps per-pool and per-container rows, and renders changes through a
//! [`StatusWriter`]. It never talks back to the engine.
//!
//! [`UiEvent`]: hatch_common::events::UiEvent

pub mod processor;
pub mod writer;

pub use processor::{spawn_processor, ContainerRow, PoolRow};
pub use writer::{ConsoleWriter, LogWriter, StatusWriter};
