//! Defines routes for user and measurement operations.
//!
//! ## Structure
//! - **Probes** (mounted at root)
//!   - `GET    /healthz`
//!   - `GET    /readyz`
//!
//! - **Public endpoints** under `/{version}`
//!   - `POST   /users`: create a user
//!   - `POST   /users/token`: exchange credentials for a JWT
//!
//! - **Docs** under `/{version}`
//!   - `GET    /docs`: Swagger UI
//!   - `GET    /docs/doc.json`: OpenAPI document
//!
//! - **Bearer-protected endpoints** under `/{version}`
//!   - `GET    /measurements`: list (supports page, limit, sort)
//!   - `POST   /measurements`: create from a meter photograph
//!   - `GET    /measurements/{id}`
//!   - `PUT    /measurements/{id}`
//!   - `DELETE /measurements/{id}`
//!   - `GET    /measurements/{id}/image`

use crate::{
    AppState,
    auth::require_bearer,
    docs::api_doc,
    handlers::{
        health_handlers::{healthz, readyz},
        measurement_handlers::{
            create_measurement, delete_measurement, get_measurement, get_measurement_image,
            list_measurements, update_measurement,
        },
        user_handlers::{create_user, get_token},
    },
};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use utoipa_swagger_ui::SwaggerUi;

/// Build the full router with its state applied.
///
/// `api_version` is the bare prefix segment, e.g. `v1`.
pub fn routes(state: AppState, api_version: &str) -> Router {
    let prefix = format!("/{}", api_version.trim_matches('/'));

    let public = Router::new()
        .route("/users", post(create_user))
        .route("/users/token", post(get_token));

    let protected = Router::new()
        .route(
            "/measurements",
            get(list_measurements).post(create_measurement),
        )
        .route(
            "/measurements/{id}",
            get(get_measurement)
                .put(update_measurement)
                .delete(delete_measurement),
        )
        .route("/measurements/{id}/image", get(get_measurement_image))
        .route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            require_bearer,
        ));

    let docs = SwaggerUi::new(format!("{prefix}/docs"))
        .url(format!("{prefix}/docs/doc.json"), api_doc(api_version));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest(&prefix, public.merge(protected))
        .merge(docs)
        .with_state(state)
}
