use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::{
    auth::{
        dto::{AccessToken, RefreshRequest, SigninRequest, SignupRequest, SignupResponse, TokenPair},
        extractors::{ApiBody, AuthUser},
        jwt::JwtKeys,
        password::{hash_password, verify_dummy, verify_password},
        repo_types::NewUser,
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup/", post(signup))
        .route("/signin/", post(signin))
        .route("/token/refresh/", post(refresh))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/protected/", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ApiBody(payload): ApiBody<SignupRequest>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let payload = payload.normalized();
    if let Err(e) = payload.validate() {
        warn!(username = %payload.username, "signup validation failed");
        return Err(e.into());
    }

    let password_hash = hash_password(&payload.password)?;
    let username = payload.username;
    let user = state
        .users
        .create(NewUser {
            username: username.clone(),
            email: payload.email.unwrap_or_default(),
            password_hash,
        })
        .await
        .map_err(|e| {
            if let AppError::Validation(_) = e {
                warn!(username = %username, "username already registered");
            }
            e
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(SignupResponse::from(user))))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    ApiBody(payload): ApiBody<SigninRequest>,
) -> AppResult<Json<TokenPair>> {
    payload.check_present()?;
    let username = payload.username.trim();

    let user = match state.users.find_by_username(username).await? {
        Some(u) => u,
        None => {
            verify_dummy(&payload.password);
            warn!(username = %username, "signin unknown username");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "signin invalid password");
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_active {
        warn!(user_id = %user.id, "signin inactive user");
        return Err(AppError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let access = keys.sign_access(user.id)?;
    let refresh = keys.sign_refresh(user.id)?;

    info!(user_id = %user.id, "user signed in");
    Ok(Json(TokenPair { refresh, access }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiBody(payload): ApiBody<RefreshRequest>,
) -> AppResult<Json<AccessToken>> {
    if payload.refresh.trim().is_empty() {
        return Err(AppError::field("refresh", "This field may not be blank."));
    }

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(payload.refresh.trim()).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AppError::from(e)
    })?;

    match state.users.find_by_id(claims.sub).await? {
        Some(user) if user.is_active => {}
        Some(_) => {
            return Err(AppError::AuthenticationFailed {
                detail: "User is inactive".into(),
                code: "user_inactive",
            })
        }
        None => {
            return Err(AppError::AuthenticationFailed {
                detail: "User not found".into(),
                code: "user_not_found",
            })
        }
    }

    let access = keys.sign_access(claims.sub)?;
    debug!(user_id = %claims.sub, "access token refreshed");
    Ok(Json(AccessToken { access }))
}

pub async fn protected(AuthUser(user): AuthUser) -> Json<Value> {
    debug!(user_id = %user.id, "protected resource served");
    Json(json!({ "message": "This is body" }))
}
