use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// JSON error body: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<beacon_oauth::Error> for ApiError {
    fn from(e: beacon_oauth::Error) -> Self {
        let status = match &e {
            beacon_oauth::Error::NotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            beacon_oauth::Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            beacon_oauth::Error::TokenEndpoint { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}
