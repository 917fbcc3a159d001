//! # Learn Language AI - Main Application Entry Point
//!
//! HTTP backend for a language-learning app: vocabulary quizzes, sentence
//! similarity, translation, speech synthesis and transcription, and
//! conversation practice.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: Every request handler and model call is asynchronous
//! - **modules**: Each component lives in its own module with its own error type
//! - **Result<T, E>**: Startup uses `anyhow::Result`, handlers return `AppError`
//! - **Arc**: Services are shared between worker threads without copying
//! - **static**: The shutdown flag lives for the entire program duration
//!
//! ## Application Architecture:
//! - **adapters**: Clients for the external text, speech and similarity models
//! - **translation**: Language normalization, model route resolution, local Marian models
//! - **audio**: Audio input normalization and generated audio artifacts
//! - **transcription**: Speech-to-text over any normalized audio source
//! - **dialog**: Per-session conversation contexts
//! - **quiz**: Quiz prompting and decoding
//! - **config / state / health / middleware / handlers / error**: Service plumbing

mod adapters;     // External model clients (adapters/ directory)
mod audio;        // Audio inputs and artifacts (audio/ directory)
mod config;       // Configuration management (config.rs)
mod device;       // Compute device selection (device.rs)
mod dialog;       // Conversation practice (dialog/ directory)
mod error;        // Error handling types (error.rs)
mod handlers;     // HTTP request handlers (handlers/ directory)
mod health;       // Health check endpoints (health.rs)
mod middleware;   // Custom middleware (middleware/ directory)
mod quiz;         // Quiz generation (quiz/ directory)
mod state;        // Application state management (state.rs)
mod transcription; // Speech-to-text (transcription/ directory)
mod translation;  // Translation routing (translation/ directory)

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a termination signal arrives; the main task polls it.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// How often idle conversations are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Builds the services** (model clients, translation resolver, dialog manager, ...)
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting learn-language-ai v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config.redacted());

    let app_state = AppState::from_config(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();
    spawn_session_sweeper(app_state.clone());

    info!("Starting HTTP server on {}", bind_addr);

    let max_json_bytes = config.performance.max_json_bytes;
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Malformed JSON bodies get the same error shape as every other failure
        let json_config = web::JsonConfig::default()
            .limit(max_json_bytes)
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into());

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(json_config)
            // Middleware executes in reverse order for responses
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure)
    });

    let server = if config.performance.workers > 0 {
        server.workers(config.performance.workers)
    } else {
        server
    };

    let server = server.bind(&bind_addr)?.run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "info", "learn_language_ai=trace")
/// - If not set, defaults to "learn_language_ai=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learn_language_ai=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag.
///
/// If a handler cannot be installed the server keeps running; it can still be
/// stopped by actix's own signal handling.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Periodically drop conversations nobody has used for a while.
fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
                break;
            }
            state.services.dialog.prune_idle().await;
        }
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
