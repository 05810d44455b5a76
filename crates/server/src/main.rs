//! `convo-server` binary entry point.
//!
//! Runs the real-time voice conversation backend: a single WebSocket route
//! bridging client audio to the STT/LLM pipeline in `convo-core`.
//!
//! # Environment Variables
//!
//! - `BIND_ADDRESS` (default `127.0.0.1:8090`)
//! - `STT_PROVIDER` (`mock` | `http`, default `mock`); `http` reads
//!   `STT_API_KEY`, `STT_BASE_URL`, `STT_MODEL`.
//! - `LLM_PROVIDER` (`mock` | `openai`, default `mock`); `openai` reads
//!   `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`.
//! - `STT_LANGUAGES`, `POOL_SIZES`, `THRESHOLDS_ENERGY`, `THRESHOLDS_SILENCE_MS`,
//!   `MAX_BUFFER_MS`, `CTX_TTL_MS`.
//! - `RUST_LOG` (default `info`).

mod config;
mod forwarder;
mod pipeline;
mod protocol;
mod state;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use convo_core::provider::{LlmProvider, SttProvider};
use convo_llm::{MockLlmProvider, OpenAiProvider};
use convo_stt::{HttpSttProvider, MockSttProvider};

use config::{LlmBackend, ServerConfig, SttBackend};
use state::AppState;

fn build_stt(backend: SttBackend) -> Arc<dyn SttProvider> {
    match backend {
        SttBackend::Http => match HttpSttProvider::from_env() {
            Ok(provider) => Arc::new(provider),
            Err(err) => {
                warn!(error = %err, "falling back to mock STT provider");
                Arc::new(MockSttProvider::default())
            }
        },
        SttBackend::Mock => Arc::new(MockSttProvider::default()),
    }
}

fn build_llm(backend: LlmBackend) -> Arc<dyn LlmProvider> {
    match backend {
        LlmBackend::OpenAi => match OpenAiProvider::from_env() {
            Ok(provider) => Arc::new(provider),
            Err(err) => {
                warn!(error = %err, "falling back to mock LLM provider");
                Arc::new(MockLlmProvider::default())
            }
        },
        LlmBackend::Mock => Arc::new(MockLlmProvider::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    let bind_address = config.bind_address.clone();

    info!(version = env!("CARGO_PKG_VERSION"), %bind_address, "conversation backend starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("convo-server")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let stt = build_stt(config.stt_backend);
        let llm = build_llm(config.llm_backend);
        let state = AppState::build(config, stt, llm);

        let app = Router::new()
            .route("/ws", get(ws::upgrade))
            .route("/healthz", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(&bind_address).await.map_err(|e| {
            error!(error = %e, "failed to bind");
            e
        })?;

        info!(%bind_address, "listening for connections");
        axum::serve(listener, app).await.map_err(|e| {
            error!(error = %e, "server error");
            e
        })?;

        Ok::<(), std::io::Error>(())
    })?;

    info!("conversation backend shutdown complete");
    Ok(())
}
