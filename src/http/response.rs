//! Outcome → HTTP status.
//!
//! # Design Decisions
//! - The body is always the JSON response envelope, success or not
//! - Status follows the error taxonomy so clients can branch without parsing
//! - Provider timeouts become 504 Gateway Timeout

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::gateway::{GatewayError, GatewayResponse, Generation};
use crate::resilience::{ClassifiedError, ErrorKind};
use crate::vault::VaultError;

pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ContentPolicy => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Network
        | ErrorKind::InvalidResponse
        | ErrorKind::ParseError
        | ErrorKind::StructuredParseError => StatusCode::BAD_GATEWAY,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn status_for_error(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        GatewayError::Credential(VaultError::NotFound { .. }) => StatusCode::NOT_FOUND,
        GatewayError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Classified(e) => status_for_kind(e.kind()),
    }
}

/// Render an orchestrator result.
pub fn into_http(result: Result<Generation, GatewayError>) -> Response {
    match result {
        Ok(generation) => (
            StatusCode::OK,
            Json(GatewayResponse::success(
                generation.content,
                generation.raw_content,
                generation.cached,
            )),
        )
            .into_response(),
        Err(e) => {
            let status = status_for_error(&e);
            (status, Json(GatewayResponse::failure(e.to_classified()))).into_response()
        }
    }
}

/// The request deadline passed before the gateway finished.
pub fn request_timeout(limit: Duration) -> Response {
    let error = ClassifiedError::new(
        ErrorKind::Timeout,
        format!("request exceeded {}ms", limit.as_millis()),
        None,
        None,
        None,
    );
    (status_for_kind(ErrorKind::Timeout), Json(GatewayResponse::failure(error))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(status_for_kind(ErrorKind::RateLimit), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for_kind(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for_kind(ErrorKind::ContentPolicy), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for_kind(ErrorKind::StructuredParseError), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for_kind(ErrorKind::Unknown), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_mapping() {
        let missing = GatewayError::Credential(VaultError::NotFound {
            owner: "a".to_string(),
            provider: ProviderKind::OpenAi,
        });
        assert_eq!(status_for_error(&missing), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_error(&GatewayError::Credential(VaultError::Tampered)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for_error(&GatewayError::UnknownProvider(ProviderKind::Xai)),
            StatusCode::NOT_FOUND
        );

        let classified = ClassifiedError::new(ErrorKind::Network, "connection refused", None, None, None);
        assert_eq!(
            status_for_error(&GatewayError::Classified(classified)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_request_timeout_is_typed_envelope() {
        let response = request_timeout(Duration::from_secs(2));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["kind"], "Timeout");
        assert!(body["error"]["message"].as_str().unwrap().contains("2000ms"));
    }
}
