use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{error, warn};
use marketscope_core::EngineError;
use serde_json::json;

/// An engine failure rendered as `{ "error": ... }` with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::UnknownTable(_) | EngineError::UnknownAggregation { .. } => StatusCode::NOT_FOUND,
            EngineError::Source(_) => StatusCode::BAD_GATEWAY,
            EngineError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.0.is_upstream() || status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketscope_core::SourceError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(EngineError::UnknownTable("x".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(EngineError::Source(SourceError::Unavailable("down".to_string()))).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(EngineError::DeadlineExceeded(Duration::from_secs(1))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
