//! Application error type and its mapping onto HTTP responses.

use std::collections::BTreeMap;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection},
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Field name -> human readable messages, rendered as the 400 body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request body could not be extracted; keeps the extractor's status (400, 415, 422, ...).
    #[error("rejected request body ({0}): {1}")]
    Rejection(StatusCode, String),

    #[error("authentication credentials were not provided")]
    NotAuthenticated,

    #[error("no active account found with the given credentials")]
    InvalidCredentials,

    #[error("authentication failed: {detail}")]
    AuthenticationFailed { detail: String, code: &'static str },

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn token_not_valid(detail: impl Into<String>) -> Self {
        AppError::AuthenticationFailed {
            detail: detail.into(),
            code: "token_not_valid",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejection(status, _) => *status,
            AppError::NotAuthenticated
            | AppError::InvalidCredentials
            | AppError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({}).", e.code))
                })
                .collect();
            out.insert(field.to_string(), messages);
        }
        AppError::Validation(out)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejection(
            rejection.status(),
            format!("JSON parse error - {}", rejection.body_text()),
        )
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Rejection(
            rejection.status(),
            format!("Form parse error - {}", rejection.body_text()),
        )
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Rejection(
            rejection.status(),
            format!("Multipart form parse error - {}", rejection.body_text()),
        )
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Rejection(
            err.status(),
            format!("Multipart form parse error - {}", err.body_text()),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(fields) => json!(fields),
            AppError::BadRequest(detail) | AppError::Rejection(_, detail) => {
                json!({ "detail": detail })
            }
            AppError::NotAuthenticated => {
                json!({ "detail": "Authentication credentials were not provided." })
            }
            AppError::InvalidCredentials => {
                json!({ "detail": "No active account found with the given credentials" })
            }
            AppError::AuthenticationFailed { detail, code } => {
                json!({ "detail": detail, "code": code })
            }
            AppError::Db(e) => {
                error!(error = %e, "database error");
                json!({ "detail": "Internal server error" })
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                json!({ "detail": "Internal server error" })
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            (
                status,
                [(header::WWW_AUTHENTICATE, r#"Bearer realm="api""#)],
                Json(body),
            )
                .into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_renders_field_map() {
        let res = AppError::field("username", "This field is required.").into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["username"][0], "This field is required.");
    }

    #[tokio::test]
    async fn unauthorized_carries_challenge_header() {
        let res = AppError::NotAuthenticated.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            r#"Bearer realm="api""#
        );
    }

    #[tokio::test]
    async fn token_errors_expose_code() {
        let res = AppError::token_not_valid("Token is invalid or expired").into_response();
        let json = body_json(res).await;
        assert_eq!(json["code"], "token_not_valid");
        assert_eq!(json["detail"], "Token is invalid or expired");
    }

    #[tokio::test]
    async fn rejection_keeps_its_status() {
        let res = AppError::Rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported media type".into(),
        )
        .into_response();
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(res).await["detail"], "Unsupported media type");
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_cause() {
        let res = AppError::Internal(anyhow::anyhow!("pool exhausted")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(res).await;
        assert_eq!(json["detail"], "Internal server error");
    }
}
