//! # Initialization
//!
//! Operator startup: rustls provider, tracing, metrics, HTTP server,
//! Kubernetes client and the reconciler context.

use crate::config::OperatorConfig;
use crate::constants::DEFAULT_VERSION_ENV_VAR;
use crate::controller::events::{EventSink, KubeEventSink};
use crate::controller::preflight::PreflightGate;
use crate::controller::reconciler::Context;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::crd::DefaultVersion;
use crate::observability;
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub config: OperatorConfig,
    pub context: Arc<Context<KubeStore>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kubeturbo_operator=info".into()),
        )
        .init();

    info!("Starting Kubeturbo operator v{}", env!("CARGO_PKG_VERSION"));

    let config = OperatorConfig::from_env();
    info!(
        "Watching {}",
        config
            .watch_namespace
            .as_deref()
            .map_or_else(|| "all namespaces".to_string(), |ns| format!("namespace {ns}"))
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let default_version = Arc::new(DefaultVersion::from_env());
    match default_version.get() {
        Some(version) => info!("Default kubeturbo version: {}", version),
        None => warn!(
            "{} is not set; resources relying on the default version will not be reconciled",
            DEFAULT_VERSION_ENV_VAR
        ),
    }

    let events: Arc<dyn EventSink> =
        Arc::new(KubeEventSink::new(client.clone(), config.pod_name.clone()));
    let context = Arc::new(Context::new(
        KubeStore::new(client.clone()),
        events,
        default_version,
        PreflightGate::new(),
    ));

    info!("Operator initialized, starting controller...");

    Ok(InitializationResult {
        client,
        config,
        context,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &OperatorConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(config.poll_interval()).await;
    }
}
