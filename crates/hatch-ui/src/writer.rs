//! Row renderers.

use tracing::info;

use crate::processor::{ContainerRow, PoolRow};

/// Where processed rows go.
pub trait StatusWriter {
    fn update_pool(&mut self, row: &PoolRow);
    fn update_container(&mut self, row: &ContainerRow);
    fn remove_container(&mut self, row: &ContainerRow);
    fn stop(&mut self);
}

/// Emits rows as structured log lines.
#[derive(Debug, Default)]
pub struct LogWriter;

impl StatusWriter for LogWriter {
    fn update_pool(&mut self, row: &PoolRow) {
        info!(
            pool = %row.name,
            state = row.state,
            items = row.num_items,
            pending = row.num_pending,
            ready = row.num_ready,
            error = row.error.as_deref(),
            "pool status"
        );
    }

    fn update_container(&mut self, row: &ContainerRow) {
        info!(
            pool = %row.pool,
            container = %row.id,
            state = row.state,
            phase = row.phase,
            action = %row.action,
            attempt = row.attempt,
            attempts = row.attempts,
            error = row.error.as_deref(),
            "container status"
        );
    }

    fn remove_container(&mut self, row: &ContainerRow) {
        info!(pool = %row.pool, container = %row.id, "container gone");
    }

    fn stop(&mut self) {}
}

/// Compact one-line-per-change terminal output.
#[derive(Debug, Default)]
pub struct ConsoleWriter;

impl ConsoleWriter {
    fn short_id(id: &str) -> &str {
        if id.len() > 12 {
            &id[..12]
        } else {
            id
        }
    }
}

impl StatusWriter for ConsoleWriter {
    fn update_pool(&mut self, row: &PoolRow) {
        match &row.error {
            Some(error) => println!(
                "[{}] {} ({} items, {} pending, {} ready) error: {}",
                row.name, row.state, row.num_items, row.num_pending, row.num_ready, error
            ),
            None => println!(
                "[{}] {} ({} items, {} pending, {} ready)",
                row.name, row.state, row.num_items, row.num_pending, row.num_ready
            ),
        }
    }

    fn update_container(&mut self, row: &ContainerRow) {
        let mut line = format!(
            "[{}] {} {}",
            row.pool,
            Self::short_id(&row.id),
            row.state
        );
        if let Some(phase) = row.phase {
            line.push_str(&format!(
                " {}:{} {}/{}",
                phase, row.action, row.attempt, row.attempts
            ));
        }
        if let Some(error) = &row.error {
            line.push_str(&format!(" error: {error}"));
        }
        println!("{line}");
    }

    fn remove_container(&mut self, row: &ContainerRow) {
        println!("[{}] {} removed", row.pool, Self::short_id(&row.id));
    }

    fn stop(&mut self) {}
}
