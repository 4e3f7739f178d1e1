//! Structured logging configuration.
//!
//! Log output defaults to discard: when the terminal UI is active it owns
//! stdout, so logs only go where the operator explicitly points them.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines are written.
#[derive(Debug, Clone, Default)]
pub enum LogOutput {
    /// Drop everything.
    #[default]
    Discard,
    Stdout,
    File(std::path::PathBuf),
}

/// Initialize the global tracing subscriber.
///
/// `level` is the default filter (`debug`, `info`, `warn`, `error`);
/// `RUST_LOG` still takes precedence when set.
pub fn init_logging(level: &str, output: LogOutput) -> io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    match output {
        LogOutput::Discard => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(io::sink))
                .init();
        }
        LogOutput::Stdout => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true).with_ansi(true))
                .init();
        }
        LogOutput::File(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
    }

    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}
