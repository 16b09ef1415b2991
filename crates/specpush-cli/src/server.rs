//! HTTP endpoint accepting specification documents.
//!
//! `POST /v1/api/generate` takes a JSON body and answers with the plain text
//! token `done` or `failed`. Each request runs on the blocking pool with its
//! own workspace.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use specpush_core::config::ProvisionerConfig;
use specpush_core::provision::{Outcome, Provisioner};

#[derive(Clone)]
pub struct AppState {
    provisioner: Arc<Provisioner>,
    request_timeout: Duration,
}

/// Network operations per run: remote listing, clone, push.
const NETWORK_OPS_PER_RUN: u64 = 3;

impl AppState {
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self> {
        let provisioner = Provisioner::from_config(config)?;
        let request_timeout = request_timeout(config, provisioner.strategies().len());
        Ok(Self {
            provisioner: Arc::new(provisioner),
            request_timeout,
        })
    }
}

/// `server.request_timeout_secs`, raised when needed so that it never fires
/// before every per-operation deadline of every run could have.
fn request_timeout(config: &ProvisionerConfig, runs: usize) -> Duration {
    let network_budget = config
        .provision
        .timeout_secs
        .saturating_mul(NETWORK_OPS_PER_RUN)
        .saturating_mul(runs as u64);
    let secs = config.server.request_timeout_secs.max(network_budget);
    if secs > config.server.request_timeout_secs {
        tracing::info!(
            configured_secs = config.server.request_timeout_secs,
            effective_secs = secs,
            "raised request timeout to cover per-operation deadlines"
        );
    }
    Duration::from_secs(secs)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/api/generate", post(generate))
        .with_state(state)
}

/// Run the server until Ctrl-C.
pub fn run(config: ProvisionerConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: ProvisionerConfig) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", config.server.bind))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn health() -> &'static str {
    "ok"
}

/// POST /v1/api/generate
async fn generate(State(state): State<AppState>, Json(specification): Json<Value>) -> &'static str {
    let provisioner = Arc::clone(&state.provisioner);
    let task = tokio::task::spawn_blocking(move || provisioner.generate(&specification));

    let outcome = match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "provisioning task aborted");
            Outcome::Failed
        }
        Err(_) => {
            // The blocking run is not cancelled. It still releases its
            // workspace, and its push may land after `failed` was returned.
            tracing::warn!(
                timeout_secs = state.request_timeout.as_secs(),
                "provisioning exceeded request deadline; a push may still land"
            );
            Outcome::Failed
        }
    };
    outcome.as_str()
}
