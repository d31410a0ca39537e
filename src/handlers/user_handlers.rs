//! HTTP handlers for account creation and token issuance.
//!
//! bcrypt is CPU-bound, so hashing and verification run on the blocking pool.

use crate::{
    AppState,
    auth::AuthError,
    errors::{AppError, ErrorResponse},
    models::User,
    services::repository::RepositoryError,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GetTokenInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessToken {
    pub access_token: String,
}

/// `POST /users`: responds with `{id, name, email}`.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserInput,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Hashing or persistence failed", body = ErrorResponse)
    ),
    tags = ["users"]
)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;

    let user = tokio::task::spawn_blocking(move || {
        User::new(input.name, input.email, &input.password)
    })
    .await
    .map_err(|err| AppError::internal(format!("password hashing task failed: {err}")))??;

    state.users.create(&user).await?;
    tracing::info!(id = %user.id, "user created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /users/token`
#[utoipa::path(
    post,
    path = "/users/token",
    request_body = GetTokenInput,
    responses(
        (status = 200, description = "Access token issued", body = AccessToken),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Email or password invalid", body = ErrorResponse)
    ),
    tags = ["users"]
)]
pub async fn get_token(
    State(state): State<AppState>,
    payload: Result<Json<GetTokenInput>, JsonRejection>,
) -> Result<Json<AccessToken>, AppError> {
    let Json(input) = payload?;

    let user = match state.users.find_by_email(&input.email).await {
        Ok(user) => user,
        Err(RepositoryError::NotFound) => return Err(AuthError::InvalidCredentials.into()),
        Err(err) => return Err(err.into()),
    };

    let id = user.id;
    let matches = tokio::task::spawn_blocking(move || user.validate_password(&input.password))
        .await
        .map_err(|err| AppError::internal(format!("password check task failed: {err}")))?;
    if !matches {
        return Err(AuthError::InvalidCredentials.into());
    }

    let access_token = state.tokens.issue(&id.to_string())?;
    tracing::info!(%id, "access token issued");

    Ok(Json(AccessToken { access_token }))
}
