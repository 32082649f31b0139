use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub type HttpResponse = Response;

#[derive(Debug, Serialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
}

pub(crate) fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn too_many_requests(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
}

pub fn service_unavailable(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "AT_CAPACITY", message)
}

/// Router-wide fallback for any path that doesn't match a route.
pub async fn not_found_fallback() -> HttpResponse {
    not_found("no such route")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(response: Response, expected_status: StatusCode, expected_code: &str) {
        assert_eq!(response.status(), expected_status);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: HttpErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, expected_code);
    }

    #[tokio::test]
    async fn not_found_sets_not_found_contract() {
        assert_error_response(not_found("missing"), StatusCode::NOT_FOUND, "NOT_FOUND").await;
    }

    #[tokio::test]
    async fn too_many_requests_sets_rate_limited_contract() {
        assert_error_response(
            too_many_requests("slow down"),
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
        )
        .await;
    }

    #[tokio::test]
    async fn service_unavailable_sets_at_capacity_contract() {
        assert_error_response(
            service_unavailable("relay down"),
            StatusCode::SERVICE_UNAVAILABLE,
            "AT_CAPACITY",
        )
        .await;
    }

    #[tokio::test]
    async fn fallback_reports_not_found() {
        assert_error_response(not_found_fallback().await, StatusCode::NOT_FOUND, "NOT_FOUND").await;
    }
}
