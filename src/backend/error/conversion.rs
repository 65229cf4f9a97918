/**
 * Error Conversion
 *
 * This module provides conversion implementations for backend errors,
 * allowing them to be returned directly from Axum handlers.
 *
 * # Response Format
 *
 * Error responses follow the wire shape every endpoint uses:
 * ```json
 * {
 *   "success": false,
 *   "error": "Validation failed: cannot determine file type"
 * }
 * ```
 *
 * Server errors (5xx) are logged before the response is built; validation
 * failures and 404s are the caller's problem and stay quiet.
 */

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("[Server] {}", message);
        }

        let body = serde_json::json!({
            "success": false,
            "error": message,
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap_or_else(
                |_| format!(r#"{{"success":false,"error":"{}"}}"#, message),
            )))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal Server Error"))
                    .unwrap()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = BackendError::validation("missing owner").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Validation failed: missing owner");
    }

    #[tokio::test]
    async fn test_not_found_response_status() {
        let response = BackendError::not_found("File not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
