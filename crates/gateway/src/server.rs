use std::{any::Any, collections::BTreeMap, sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    tokio::sync::Notify,
    tower_http::{
        catch_panic::CatchPanicLayer,
        cors::{Any as AnyOrigin, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use {beacon_common::TeamMappingStore, beacon_config::BeaconConfig, beacon_oauth::CredentialStore};

use crate::{
    auth_routes::auth_router,
    error::ApiError,
    relay::WebhookReply,
    state::GatewayState,
    team_store::{SqliteTeamMappingStore, connect_with_retry, ping, run_migrations},
};

/// Build the router (shared between production startup and tests).
pub fn build_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/api/slack/events", post(webhook_handler))
        .route("/slack/events", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/api/debug/integrations", get(integrations_handler))
        .merge(auth_router().with_state(Arc::clone(&state.auth)))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Connect storage, bind, and serve until Ctrl-C or SIGTERM.
pub async fn start_server(config: BeaconConfig) -> anyhow::Result<()> {
    let pool = connect_with_retry(&config.database).await?;
    run_migrations(&pool).await?;
    let teams: Arc<dyn TeamMappingStore> = Arc::new(SqliteTeamMappingStore::new(pool.clone()));
    info!(integrations = teams.list().await?.len(), "team mappings loaded");

    let credentials = Arc::new(CredentialStore::open(&config.credentials.file_path)?);
    let state = GatewayState::from_config(&config, credentials, teams, Some(pool))?;
    let app = build_app(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "beacon listening");

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stop = Arc::clone(&stop);
        async move { stop.notified().await }
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        res = &mut server => return Ok(res??),
        () = shutdown_signal() => {},
    }

    stop.notify_one();
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(res) => res??,
        Err(_) => warn!(grace_secs = grace.as_secs(), "in-flight requests still running, forcing exit"),
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %detail, "request handler panicked");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn webhook_handler(State(state): State<Arc<GatewayState>>, body: Bytes) -> WebhookReply {
    state.relay.handle(&body).await
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Response {
    if let Some(pool) = &state.db
        && let Err(e) = ping(pool).await
    {
        warn!(error = %e, "health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Database connection error: {e}"),
        )
            .into_response();
    }
    (StatusCode::OK, "OK - Service is healthy").into_response()
}

async fn integrations_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<impl IntoResponse, ApiError> {
    let mappings = state.teams.list().await.map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error listing integrations: {e}"),
        )
    })?;
    let integrations: BTreeMap<_, _> = mappings
        .into_iter()
        .map(|m| (m.team_id, m.user_id))
        .collect();
    Ok(Json(serde_json::json!({
        "count": integrations.len(),
        "integrations": integrations,
    })))
}
