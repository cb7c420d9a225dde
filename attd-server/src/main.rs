use attd_core::notify::{create_sink, Notifier};
use attd_core::{AttdConfig, HackHourClient};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use attd_server::router::DaemonContext;
use attd_server::server;
use attd_server::subsystems::reminder::ReminderScheduler;

#[derive(Parser, Debug)]
#[command(author, version, about = "Arcade Time Tracker daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "attd.toml")]
    config: String,

    /// Set the path for the pipe
    #[arg(long = "pipe-path", env = "ATTD_PIPE_PATH")]
    pipe_path: Option<String>,

    /// Log notifications instead of showing them on the desktop
    #[arg(long)]
    no_desktop: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = match AttdConfig::load(&args.config) {
        Ok(c) => c.with_socket_path(args.pipe_path),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if args.no_desktop {
        config.notifications.enabled = false;
    }

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let notifier = Notifier::new(create_sink(&config.notifications), &config.notifications.title);
    let daemon_notifier = notifier.with_title(&config.notifications.daemon_title);
    let socket_path = config.service.socket_path.clone();

    tracing::info!("Starting daemon with pipe path: {}", socket_path);
    daemon_notifier.notify(&format!("Starting daemon with pipe path: {}", socket_path));

    let socket = match server::bind_socket(&socket_path) {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("Failed to listen on pipe: {}", e);
            daemon_notifier.notify(&format!("Failed to listen on pipe: {}", e));
            std::process::exit(1);
        }
    };
    if socket.removed_stale {
        daemon_notifier.notify(&format!("Pipe file already exists, removing: {}", socket_path));
    }

    let api = HackHourClient::new(&config.api)?;
    let scheduler = ReminderScheduler::new(notifier.clone(), &config.reminders);
    let ctx = Arc::new(DaemonContext {
        api: Arc::new(api),
        notifier,
        scheduler: scheduler.clone(),
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    daemon_notifier.notify(&format!("Daemon started and listening on {}", socket_path));
    server::serve(socket, ctx, config.service.linger(), tx.subscribe()).await;

    let cancelled = scheduler.shutdown().await;
    tracing::info!(cancelled, "Daemon stopped");

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
