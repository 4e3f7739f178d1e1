//! Hatchery host binary.
//!
//! Keeps warm pools of containerized backing services for integration test
//! suites and exposes checkout/return over HTTP. Pools drain gracefully on
//! SIGINT/SIGQUIT; the process exits once every container is gone.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use hatch_common::events::Emitter;
use hatch_common::logging::{init_logging, LogOutput};
use hatch_core::PoolSet;
use hatch_runtime::{ContainerRuntime, DockerRuntime};
use hatch_server::AppState;
use hatch_ui::{spawn_processor, ConsoleWriter, LogWriter, StatusWriter};

#[derive(Debug, Parser)]
#[command(name = "hatchery", version, about = "Warm pools of ephemeral test containers")]
struct Cli {
    /// RPC listen port.
    #[arg(short = 'p', long, default_value_t = hatch_server::DEFAULT_PORT)]
    port: u16,

    /// Pool configuration file.
    #[arg(short = 'f', long = "config")]
    config: PathBuf,

    /// Log level.
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,

    /// Log file; logs are discarded when unset.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Terminal status output.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    gui: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let output = match &cli.log_file {
        Some(path) => LogOutput::File(path.clone()),
        None => LogOutput::Discard,
    };
    init_logging(&cli.log_level, output).context("cannot open log file")?;

    hatch_actions::register_builtins();

    let config = hatch_config::load(&cli.config)
        .with_context(|| format!("config {}", cli.config.display()))?;

    let (emitter, ui_events) = Emitter::channel();
    let writer: Box<dyn StatusWriter + Send> = if cli.gui {
        Box::new(ConsoleWriter)
    } else {
        Box::new(LogWriter)
    };
    let ui_task = spawn_processor(ui_events, writer);

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::connect().context("cannot reach the container runtime")?);

    let pools = Arc::new(
        PoolSet::from_file(&config, runtime, &emitter).context("cannot build pools")?,
    );

    let listener = TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("cannot bind port {}", cli.port))?;
    let shutdown = CancellationToken::new();
    let server = {
        let state = AppState::new(pools.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum_serve(listener, state, shutdown).await;
        })
    };

    info!(port = cli.port, "hatchery started");

    shutdown_signal().await;
    info!("shutdown signal received, draining pools");

    shutdown.cancel();
    pools.stop().await;
    let _ = server.await;

    // The emitter owned here is the last sender; dropping it ends the UI task.
    drop(emitter);
    let _ = ui_task.await;

    info!("hatchery stopped");
    Ok(())
}

async fn axum_serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) {
    let app = hatch_server::router(state).layer(TraceLayer::new_for_http());
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "rpc server error");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let quit = async {
        signal::unix::signal(signal::unix::SignalKind::quit())
            .expect("failed to install SIGQUIT handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let quit = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = quit => {},
    }
}
