use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arc_swap::ArcSwap;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::coordination::CoordinationClient;
use crate::engine::{AdmissionEngine, ConfigResolver};
use crate::metrics::Metrics;

/// Shared application state, cheaply cloneable. Config is hot-swappable via
/// `ArcSwap` even though this repo only ever loads it once at startup — kept
/// for the same reason the gateway this codebase is descended from treats
/// config as reloadable infrastructure, not a one-shot constant.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<AppConfig>>,
    pub metrics: Metrics,
    pub engine: Arc<AdmissionEngine>,
    pub resolver: Arc<ConfigResolver>,
    /// Bounds total concurrent in-admission requests per node (§5
    /// Overloaded); acquiring a permit fails fast rather than queuing
    /// unboundedly behind a slow coordination store.
    inflight: Arc<Semaphore>,
    active_conns: Arc<AtomicI64>,
}

impl AppState {
    pub async fn new(config: AppConfig, node_id: String) -> Result<Self> {
        let coordination = CoordinationClient::new(
            &config.coordination.url,
            config.coordination.pool_size,
            Duration::from_millis(config.coordination.acquire_timeout_ms),
            Duration::from_millis(config.coordination.command_timeout_ms),
        )?;

        connect_with_retry(&coordination, &config).await?;

        let engine = AdmissionEngine::new(
            coordination,
            node_id,
            config.admission.window_seconds,
        );
        let resolver = ConfigResolver::new(config.tiers.clone(), config.overrides.clone());
        let metrics = Metrics::install();
        let max_inflight = config.admission.max_inflight;

        Ok(Self {
            config: Arc::new(ArcSwap::new(Arc::new(config))),
            metrics,
            engine: Arc::new(engine),
            resolver: Arc::new(resolver),
            inflight: Arc::new(Semaphore::new(max_inflight)),
            active_conns: Arc::new(AtomicI64::new(0)),
        })
    }

    /// Try to reserve one in-flight slot. `None` means the node is at
    /// capacity and the caller should return 503 without ever calling AE.
    pub fn try_acquire_inflight(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        self.inflight.clone().try_acquire_owned().ok()
    }

    pub fn active_connections(&self) -> &Arc<AtomicI64> {
        &self.active_conns
    }
}

/// Connect-with-retry at startup. Exhausting the retry budget here is
/// reported to the caller, which maps it to exit code 2 (§6).
async fn connect_with_retry(coordination: &CoordinationClient, config: &AppConfig) -> Result<()> {
    let mut attempt = 0;
    loop {
        match coordination.ping().await {
            Ok(()) => {
                tracing::info!("coordination: connected, url={}", config.coordination.url);
                return Ok(());
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.coordination.connect_retries {
                    anyhow::bail!(
                        "coordination store unreachable after {} attempts: {}",
                        attempt,
                        e
                    );
                }
                tracing::warn!(
                    "coordination: connect attempt {} failed, retrying: {}",
                    attempt,
                    e
                );
                tokio::time::sleep(Duration::from_millis(
                    config.coordination.connect_retry_backoff_ms,
                ))
                .await;
            }
        }
    }
}
