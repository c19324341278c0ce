//! Callpilot server binary — wires config, datastore, vendor clients, and
//! the HTTP API together, then serves until SIGINT/SIGTERM.

use callpilot_server::{app, background, config, middleware::RateLimiter, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CALLPILOT_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = callpilot_db::create_pool(
        &config.database.path,
        callpilot_db::SqliteSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            callpilot_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Vendor clients
    let dialer = callpilot_dialer::AgentApiClient::new(config.dialer.client.clone())
        .expect("failed to build dialer client");
    if !dialer.is_enabled() {
        tracing::warn!("dialer.base_url is empty — call control endpoints will return 503");
    }

    let sessions = callpilot_dialer::SessionManager::new(dialer.clone(), pool.clone());
    match sessions.load_persisted().await {
        Ok(count) if count > 0 => tracing::info!(count, "restored agent sessions"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to restore persisted sessions"),
    }

    let ami = Arc::new(callpilot_ami::AmiClient::new(config.ami.clone()));
    if !ami.is_enabled() {
        tracing::warn!("ami.host is empty — hand-off endpoints will return 503");
    }

    let stt = callpilot_voice::SttClient::new(config.stt.clone());
    let tts = callpilot_voice::TtsClient::new(config.tts.clone())
        .expect("failed to build tts client");

    let api_key = if config.auth.api_key.is_empty() {
        tracing::warn!("auth.api_key is empty — the API is unauthenticated");
        None
    } else {
        Some(config.auth.api_key.clone())
    };

    let (observe_tx, _) = tokio::sync::broadcast::channel(256);

    let state = AppState {
        pool,
        dialer,
        sessions,
        ami,
        transfer: config.transfer.clone(),
        stt,
        tts,
        engine: callpilot_dialogue::DialogueEngine::new(config.dialogue),
        rate_limiter: RateLimiter::new(),
        rate_limit_per_minute: config.limits.per_minute,
        api_key,
        default_agent_pass: config.dialer.default_agent_pass.clone(),
        observe_tx,
    };
    let state = Arc::new(state);

    // Background session sync
    tokio::spawn(background::start_sync_task(
        state.clone(),
        config.sync.interval_seconds,
        config.sync.session_max_age_seconds,
    ));

    let app = app(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting callpilot server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("callpilot server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
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
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
