//! API error envelope
//!
//! Every failure leaves the server as `{ok: false, error, message}` with a
//! status matching the error class.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use plugbridge_cloud::CloudError;
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub vendor_code: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    ok: bool,
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor_code: Option<i64>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            vendor_code: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "not_authenticated",
            "Not logged in to eWeLink",
        )
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "auth_failed", message)
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "config_missing", message)
    }

    fn with_vendor_code(mut self, code: i64) -> Self {
        self.vendor_code = Some(code);
        self
    }
}

impl From<CloudError> for ApiError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::NotAuthenticated => ApiError::not_authenticated(),
            CloudError::Auth { code, message } => {
                ApiError::auth_failed(message).with_vendor_code(code)
            }
            CloudError::InvalidOAuthState => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_oauth_state",
                "OAuth state is unknown, expired or already used",
            ),
            CloudError::Vendor { code, message } => {
                ApiError::new(StatusCode::BAD_GATEWAY, "vendor_error", message)
                    .with_vendor_code(code)
            }
            CloudError::Network(e) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "vendor_unreachable",
                format!("eWeLink cloud unreachable: {}", e),
            ),
            CloudError::Server { status, message } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "vendor_unreachable",
                format!("eWeLink cloud answered {}: {}", status, message),
            ),
            CloudError::Serialization(e) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "vendor_error",
                format!("Unexpected eWeLink response: {}", e),
            ),
            CloudError::Validation(message) => ApiError::bad_request(message),
            CloudError::Config(message) => ApiError::config_missing(message),
            CloudError::UrlParse(e) => {
                ApiError::config_missing(format!("Invalid configured URL: {}", e))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} ({}): {}", self.code, self.status, self.message);
        }
        (
            self.status,
            Json(ErrorBody {
                ok: false,
                error: self.code,
                message: &self.message,
                vendor_code: self.vendor_code,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_error_mapping() {
        let cases = [
            (CloudError::NotAuthenticated, StatusCode::UNAUTHORIZED, "not_authenticated"),
            (CloudError::auth(10001, "bad password"), StatusCode::UNAUTHORIZED, "auth_failed"),
            (CloudError::InvalidOAuthState, StatusCode::UNAUTHORIZED, "invalid_oauth_state"),
            (CloudError::vendor(4002, "offline"), StatusCode::BAD_GATEWAY, "vendor_error"),
            (
                CloudError::Server {
                    status: 503,
                    message: "down".to_string(),
                },
                StatusCode::BAD_GATEWAY,
                "vendor_unreachable",
            ),
            (CloudError::validation("bad"), StatusCode::BAD_REQUEST, "invalid_request"),
            (
                CloudError::Config("missing".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_missing",
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_vendor_code_is_kept() {
        let api = ApiError::from(CloudError::vendor(4002, "offline"));
        assert_eq!(api.vendor_code, Some(4002));
        assert_eq!(api.message, "offline");
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError::from(CloudError::vendor(4002, "offline")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "ok": false,
                "error": "vendor_error",
                "message": "offline",
                "vendorCode": 4002
            })
        );
    }
}
