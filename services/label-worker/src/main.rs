//! Carrier Label Worker
//!
//! Single-binary Rust service that:
//! 1. Keeps a pool of carrier-portal accounts seeded and healthy
//! 2. Refreshes one authenticated session per enabled account every cycle
//! 3. Tops up postage when the pool's summed balance drops below the floor
//! 4. Runs queued label jobs against the active session and reports the outcome
//! 5. Serves the operator admin API, health and Prometheus metrics

mod acquirer;
mod admin;
mod carrier_impl;
mod config;
mod error;
mod explainer;
mod jobs;
mod metrics;
mod notifier;
mod queue;
mod scheduler;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use carrier::CarrierClient;
use metrics_exporter_prometheus::PrometheusHandle;
use session_pool::{AccountStore, FileKv, FileLedger, LabelLedger, SessionStore};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::acquirer::SidecarAcquirer;
use crate::admin::AdminState;
use crate::config::Config;
use crate::explainer::{ErrorExplainer, OpenAiExplainer, PassthroughExplainer};
use crate::jobs::{LabelJob, LabelJobHandler, SessionJob, SessionJobHandler};
use crate::notifier::{LogNotifier, Notifier, WebhookNotifier};
use crate::queue::{JobQueue, WorkerOptions};
use crate::scheduler::TopUpPolicy;

/// Session jobs get one retry after a transient failure.
const SESSION_JOB_RETRIES: u32 = 1;

/// Label failures are reported, never retried.
const LABEL_JOB_RETRIES: u32 = 0;

/// Shared state for the health and metrics handlers
#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionStore>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with health, metrics and the admin API.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, admin: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(admin::build_admin_router(admin))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting label-worker");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.admin.listen_addr,
        carrier_url = %config.carrier.base_url,
        data_dir = %config.store.data_dir.display(),
        explainer = config.explainer.is_some(),
        notifier = config.notifier.is_some(),
        "configuration loaded"
    );

    // --- Stores ---
    let kv = Arc::new(
        FileKv::open(&config.store.data_dir)
            .await
            .with_context(|| format!("failed to open store at {}", config.store.data_dir.display()))?,
    );
    let accounts = Arc::new(AccountStore::new(kv.clone()));
    let sessions = Arc::new(SessionStore::new(kv));
    let ledger: Arc<dyn LabelLedger> =
        Arc::new(FileLedger::new(config.store.data_dir.join("labels.jsonl")));

    // No stored pool and no usable seed is fatal
    let pool_size = accounts
        .ensure_seeded(&config.store.accounts_seed)
        .await
        .with_context(|| {
            format!(
                "no account pool available (seed: {})",
                config.store.accounts_seed.display()
            )
        })?;
    info!(accounts = pool_size, "account pool ready");

    // --- Collaborators ---
    let http = reqwest::Client::new();
    let carrier = Arc::new(CarrierClient::new(
        http.clone(),
        config.carrier.base_url.clone(),
        Duration::from_secs(config.carrier.timeout_secs),
    ));
    let acquirer = Arc::new(SidecarAcquirer::new(
        http.clone(),
        config.acquirer.endpoint.clone(),
        Duration::from_secs(config.acquirer.timeout_secs),
        carrier.as_ref().clone(),
    ));

    let explainer: Arc<dyn ErrorExplainer> = match &config.explainer {
        Some(cfg) => {
            if cfg.api_key.is_none() {
                warn!("explainer configured without EXPLAINER_API_KEY or api_key_file");
            }
            Arc::new(OpenAiExplainer::new(
                http.clone(),
                cfg.base_url.clone(),
                cfg.model.clone(),
                cfg.api_key.clone(),
                Duration::from_secs(cfg.timeout_secs),
            ))
        }
        None => Arc::new(PassthroughExplainer),
    };
    let notifier: Arc<dyn Notifier> = match &config.notifier {
        Some(cfg) => Arc::new(WebhookNotifier::new(
            http.clone(),
            cfg.webhook_url.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )),
        None => {
            info!("no notifier configured, label outcomes are logged only");
            Arc::new(LogNotifier)
        }
    };

    // --- Queues ---
    let (session_queue, session_rx) = JobQueue::<SessionJob>::channel("sessions");
    let (label_queue, label_rx) = JobQueue::<LabelJob>::channel("labels");

    queue::spawn_workers(
        &session_queue,
        session_rx,
        Arc::new(SessionJobHandler::new(
            acquirer,
            accounts.clone(),
            sessions.clone(),
        )),
        WorkerOptions {
            concurrency: config.queues.session_concurrency,
            max_retries: SESSION_JOB_RETRIES,
            retry_delay: Duration::from_secs(config.queues.retry_delay_secs),
        },
    );
    queue::spawn_workers(
        &label_queue,
        label_rx,
        Arc::new(LabelJobHandler::new(
            sessions.clone(),
            ledger.clone(),
            carrier.clone(),
            explainer,
            notifier,
        )),
        WorkerOptions {
            concurrency: config.queues.label_concurrency,
            max_retries: LABEL_JOB_RETRIES,
            retry_delay: Duration::ZERO,
        },
    );

    // --- Scheduler ---
    let refresh_task = scheduler::spawn_refresh_task(
        accounts.clone(),
        sessions.clone(),
        session_queue.clone(),
        Duration::from_secs(config.scheduler.refresh_interval_secs),
    );
    let top_up_task = scheduler::spawn_top_up_task(
        sessions.clone(),
        carrier,
        TopUpPolicy {
            floor: config.scheduler.balance_floor,
            min_amount: config.scheduler.top_up_min,
            max_amount: config.scheduler.top_up_max,
        },
        Duration::from_secs(config.scheduler.top_up_interval_secs),
    );

    // --- Admin listener ---
    let app_state = AppState {
        sessions: sessions.clone(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };
    let admin_state = AdminState::new(accounts, sessions, ledger, session_queue, label_queue);
    let app = build_router(app_state, admin_state, config.admin.max_connections);

    let listen_addr = config.admin.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin server failed")?;

    refresh_task.abort();
    top_up_task.abort();
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: uptime plus session pool state.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();

    let (status_code, body) = match state.sessions.list().await {
        Ok(all) => {
            let fresh = all.iter().filter(|s| s.is_fresh()).count();
            (
                axum::http::StatusCode::OK,
                serde_json::json!({
                    "status": "healthy",
                    "sessions": all.len(),
                    "fresh_sessions": fresh,
                    "uptime_seconds": uptime,
                }),
            )
        }
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "degraded",
                "error": e.to_string(),
                "uptime_seconds": uptime,
            }),
        ),
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

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
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
