use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Multipart, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Form, Json,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::User};
use crate::{error::AppError, state::AppState};

/// Request body accepted as JSON, url-encoded form or multipart form,
/// chosen by `Content-Type`. Anything else is a 415.
pub struct ApiBody<T>(pub T);

#[derive(Debug, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
}

fn body_kind(headers: &HeaderMap) -> Result<BodyKind, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/x-www-form-urlencoded" => Ok(BodyKind::Form),
        "multipart/form-data" => Ok(BodyKind::Multipart),
        m if m == "application/json" || (m.starts_with("application/") && m.ends_with("+json")) => {
            Ok(BodyKind::Json)
        }
        _ => Err(AppError::Rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("Unsupported media type \"{}\" in request.", content_type),
        )),
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match body_kind(req.headers())? {
            BodyKind::Json => {
                let Json(value) = Json::<T>::from_request(req, state).await?;
                Ok(ApiBody(value))
            }
            BodyKind::Form => {
                let Form(value) = Form::<T>::from_request(req, state).await?;
                Ok(ApiBody(value))
            }
            BodyKind::Multipart => {
                let mut multipart = Multipart::from_request(req, state).await?;
                // Text fields only; a repeated name keeps the last value.
                let mut fields = Map::new();
                while let Some(field) = multipart.next_field().await? {
                    let Some(name) = field.name().map(str::to_string) else {
                        continue;
                    };
                    let text = field.text().await?;
                    fields.insert(name, Value::String(text));
                }
                let value = serde_json::from_value(Value::Object(fields)).map_err(|e| {
                    AppError::BadRequest(format!("Multipart form parse error - {}", e))
                })?;
                Ok(ApiBody(value))
            }
        }
    }
}

/// Extracts and validates the bearer access token, then loads the active user.
pub struct AuthUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::NotAuthenticated)?;

    let mut pieces = auth.split_whitespace();
    match pieces.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {}
        _ => return Err(AppError::NotAuthenticated),
    }
    match (pieces.next(), pieces.next()) {
        (Some(token), None) => Ok(token),
        _ => Err(AppError::AuthenticationFailed {
            detail: "Authorization header must contain two space-delimited values".into(),
            code: "bad_authorization_header",
        }),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            AppError::token_not_valid("Given token not valid for any token type")
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::AuthenticationFailed {
                detail: "User not found".into(),
                code: "user_not_found",
            })?;

        if !user.is_active {
            warn!(user_id = %user.id, "inactive user presented a token");
            return Err(AppError::AuthenticationFailed {
                detail: "User is inactive".into(),
                code: "user_inactive",
            });
        }

        Ok(AuthUser(user))
    }
}
