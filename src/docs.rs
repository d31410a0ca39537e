//! OpenAPI documentation.
//!
//! [`ApiDoc`] lists every versioned endpoint with paths relative to the
//! version prefix; [`api_doc`] sets that prefix as the server URL. The
//! document is served at `/{version}/docs/doc.json` with Swagger UI at
//! `/{version}/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::{
        Components, Server,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};

use crate::{
    errors::ErrorResponse,
    handlers::{
        measurement_handlers::{CreateMeasurementInput, UpdateMeasurementInput},
        user_handlers::{AccessToken, CreateUserInput, GetTokenInput},
    },
    models::{Measurement, User},
};

/// Adds the JWT bearer scheme referenced by the measurement endpoints.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Components::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    info(
        title = "Meter readings API",
        description = "Reads water and gas meter photographs and manages the readings."
    ),
    paths(
        crate::handlers::user_handlers::create_user,
        crate::handlers::user_handlers::get_token,
        crate::handlers::measurement_handlers::create_measurement,
        crate::handlers::measurement_handlers::list_measurements,
        crate::handlers::measurement_handlers::get_measurement,
        crate::handlers::measurement_handlers::update_measurement,
        crate::handlers::measurement_handlers::delete_measurement,
        crate::handlers::measurement_handlers::get_measurement_image,
    ),
    components(schemas(
        Measurement,
        User,
        CreateMeasurementInput,
        UpdateMeasurementInput,
        CreateUserInput,
        GetTokenInput,
        AccessToken,
        ErrorResponse,
    )),
    tags(
        (name = "users", description = "Account creation and access tokens"),
        (name = "measurements", description = "Meter readings")
    )
)]
pub struct ApiDoc;

/// The OpenAPI document for routes nested under `/{api_version}`.
pub fn api_doc(api_version: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(format!(
        "/{}",
        api_version.trim_matches('/')
    ))]);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_every_endpoint() {
        let doc = api_doc("v1");
        let paths = &doc.paths.paths;

        for path in [
            "/users",
            "/users/token",
            "/measurements",
            "/measurements/{id}",
            "/measurements/{id}/image",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn test_server_prefix_and_security() {
        let doc = api_doc("/v2/");
        assert_eq!(doc.servers.as_ref().unwrap()[0].url, "/v2");

        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("Measurement"));
        assert!(components.schemas.contains_key("ErrorResponse"));
    }

    #[test]
    fn test_measurement_schema_uses_wire_names() {
        let json = serde_json::to_value(api_doc("v1")).unwrap();
        let properties = &json["components"]["schemas"]["Measurement"]["properties"];

        assert!(properties.get("type").is_some());
        assert!(properties.get("kind").is_none());
        assert!(properties.get("created_at").is_some());

        let user = &json["components"]["schemas"]["User"]["properties"];
        assert!(user.get("password_hash").is_none());
    }
}
