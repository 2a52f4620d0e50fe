use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::{Query, State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Redirect},
        routing::{get, post},
    },
    serde::Deserialize,
    tracing::{info, warn},
};

use beacon_oauth::{AuthorizationFlow, CredentialsRequest};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
}

/// `/api/auth/credentials` and `/oauth/callback`.
pub fn auth_router() -> Router<Arc<AuthorizationFlow>> {
    Router::new()
        .route("/api/auth/credentials", post(credentials_handler))
        .route("/oauth/callback", get(callback_handler))
}

async fn credentials_handler(
    State(flow): State<Arc<AuthorizationFlow>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "unreadable credentials request");
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;
    let user_id = req.user_id.clone();
    let auth_url = flow.initiate(req).await.inspect_err(|e| {
        warn!(user_id = %user_id, error = %e, "credential registration failed");
    })?;
    info!(user_id = %user_id, "issued authorization url");
    Ok(Json(serde_json::json!({ "auth_url": auth_url })))
}

async fn callback_handler(
    State(flow): State<Arc<AuthorizationFlow>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let success_url = flow
        .complete(&query.state, &query.code)
        .await
        .inspect_err(|e| warn!(error = %e, "oauth callback failed"))?;
    Ok(Redirect::temporary(&success_url))
}
