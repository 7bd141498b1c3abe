use std::sync::Arc;

use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::server;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: Option<String>,
    pub admin_listen: Option<String>,
}

/// Startup failures are split so `main` can map them to the exit codes §6
/// requires: 1 for a bad config, 2 for an unreachable coordination store.
pub enum BootstrapError {
    Config(anyhow::Error),
    Coordination(anyhow::Error),
}

impl From<BootstrapError> for anyhow::Error {
    fn from(e: BootstrapError) -> Self {
        match e {
            BootstrapError::Config(e) => e,
            BootstrapError::Coordination(e) => e,
        }
    }
}

/// Service lifecycle: init → connect → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<(), BootstrapError> {
    init_tracing();

    let mut config = AppConfig::load(&args.config_path).map_err(BootstrapError::Config)?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(admin_listen) = args.admin_listen {
        config.server.admin_listen_addr = admin_listen;
    }

    let node_id = node_identity();
    tracing::info!("server: starting, node_id={}", node_id);

    // Phase 1: connect to the coordination store. Exhausting the retry
    // budget here is the only startup failure that maps to exit code 2 —
    // everything else (bad config, bad bind address) is exit code 1.
    let state = server::AppState::new(config.clone(), node_id)
        .await
        .map_err(BootstrapError::Coordination)?;

    // Phase 2: start the admin listener (health/ready/metrics) and the
    // main admission listener, each on its own accept loop.
    let shutdown = Arc::new(Notify::new());
    start_admin_server(&state, &config, &shutdown);

    let drain_timeout = std::time::Duration::from_secs(config.server.drain_timeout_secs);
    let admission_handle = tokio::spawn({
        let listen = config.server.listen_addr.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move {
            server::run_admission_server(&listen, state, shutdown, drain_timeout).await
        }
    });

    // Phase 3: block until signal, then drain.
    wait_for_shutdown(&shutdown).await;

    if let Err(e) = admission_handle.await {
        tracing::error!("server: admission task error: {}", e);
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn node_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{}-{}", host, std::process::id())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

fn start_admin_server(state: &server::AppState, config: &AppConfig, shutdown: &Arc<Notify>) {
    let s = state.clone();
    let admin_addr = config.server.admin_listen_addr.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = server::run_admin_server(&admin_addr, s) => {
                if let Err(e) = result {
                    tracing::error!("server: admin failed, error={}", e);
                }
            }
            _ = shutdown.notified() => {}
        }
    });
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
