//! HTTP handlers for measurement operations.
//!
//! Creation drives the external collaborators in sequence: the meter reader
//! extracts the value, the image store keeps the photograph, and only then
//! is the measurement built and persisted.

use crate::{
    AppState,
    auth::Claims,
    errors::{AppError, ErrorResponse},
    models::{
        Id, ImageEncoding, Measurement, parse_id,
        measurement::{decode_base64, unwrap_base64, validate_image},
    },
    services::{
        downstream::ImagePayload,
        image_store::StoredImage,
        meter_reader::parse_reading,
        repository::{DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, SortOrder},
    },
};
use axum::{
    Extension, Json,
    extract::{
        OriginalUri, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Body of `POST /measurements`. The value is always taken from the image.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMeasurementInput {
    /// Ignored; the reading is extracted from the image.
    #[serde(default)]
    pub value: Option<i64>,
    /// Standard base64 photograph of the meter.
    #[serde(default)]
    pub image: String,
    /// MIME type of the photograph, `image/jpeg` when absent.
    #[serde(default)]
    pub mime: Option<String>,
    /// `"1"` for water, `"2"` for gas.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Id of the owning user.
    #[serde(default)]
    pub user: String,
}

/// Body of `PUT /measurements/{id}`: the full replacement record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMeasurementInput {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub image: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub user: String,
}

/// Query params accepted by the list endpoint. Kept as strings so bad input
/// gets a precise message instead of a generic rejection.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMeasurementsQuery {
    /// 1-based page number, default 1.
    pub page: Option<String>,
    /// Page size, default 10, at most 100.
    pub limit: Option<String>,
    /// `asc` or `desc` by creation time, default `desc`.
    pub sort: Option<String>,
}

/// `POST /measurements`
///
/// The `image` of the returned record is a link to the image endpoint.
#[utoipa::path(
    post,
    path = "/measurements",
    request_body = CreateMeasurementInput,
    responses(
        (status = 201, description = "Measurement created", body = Measurement),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Reading, storage or persistence failed", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn create_measurement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    payload: Result<Json<CreateMeasurementInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;
    if input.value.is_some() {
        tracing::debug!("ignoring client-supplied value; reading comes from the image");
    }

    // The raw upload is always base64, whatever the stored representation is.
    validate_image(&input.image, ImageEncoding::Base64)?;
    let image = ImagePayload::new(unwrap_base64(&input.image), input.mime);

    let raw_reading = state.reader.read(&image).await?;
    let value = parse_reading(&raw_reading)?;
    tracing::debug!(value, "meter reading extracted");

    let stored = state.images.store(&image).await?;

    let measurement = match Measurement::new(
        value,
        stored.reference.clone(),
        input.kind,
        input.user,
        state.image_encoding,
    ) {
        Ok(measurement) => measurement,
        Err(err) => {
            discard_upload(&state, &stored).await;
            return Err(err.into());
        }
    };

    let mut created = match state.measurements.create(measurement).await {
        Ok(created) => created,
        Err(err) => {
            discard_upload(&state, &stored).await;
            return Err(err.into());
        }
    };

    tracing::info!(
        id = %created.id,
        value = created.value,
        requested_by = %claims.sub,
        "measurement created"
    );

    created.image = image_link(&headers, &uri, created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /measurements?page=&limit=&sort=`
#[utoipa::path(
    get,
    path = "/measurements",
    params(ListMeasurementsQuery),
    responses(
        (status = 200, description = "One page of measurements", body = [Measurement]),
        (status = 400, description = "Invalid page, limit or sort", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn list_measurements(
    State(state): State<AppState>,
    query: Result<Query<ListMeasurementsQuery>, QueryRejection>,
) -> Result<Json<Vec<Measurement>>, AppError> {
    let Query(q) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let page = int_param(q.page.as_deref(), DEFAULT_PAGE, "page")?;
    let limit = int_param(q.limit.as_deref(), DEFAULT_PAGE_LIMIT, "limit")?;
    let sort = match q.sort.as_deref().map(str::trim) {
        None | Some("") => SortOrder::default(),
        Some(token) => token
            .parse::<SortOrder>()
            .map_err(|_| AppError::bad_request("sort is invalid"))?,
    };

    let rows = state.measurements.find_all(page, limit, sort).await?;
    Ok(Json(rows))
}

/// `GET /measurements/{id}`
#[utoipa::path(
    get,
    path = "/measurements/{id}",
    params(("id" = String, Path, description = "Measurement id")),
    responses(
        (status = 200, description = "The measurement", body = Measurement),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "No such measurement", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn get_measurement(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Measurement>, AppError> {
    let id = path_id(path)?;
    let measurement = state.measurements.find_by_id(id).await?;
    Ok(Json(measurement))
}

/// `PUT /measurements/{id}`: full-record replace. `created_at` is kept.
#[utoipa::path(
    put,
    path = "/measurements/{id}",
    params(("id" = String, Path, description = "Measurement id")),
    request_body = UpdateMeasurementInput,
    responses(
        (status = 200, description = "The replaced measurement", body = Measurement),
        (status = 400, description = "Invalid id or record", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "No such measurement", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn update_measurement(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateMeasurementInput>, JsonRejection>,
) -> Result<Json<Measurement>, AppError> {
    let id = path_id(path)?;
    let Json(input) = payload?;

    let existing = state.measurements.find_by_id(id).await?;
    let measurement = Measurement {
        id,
        value: input.value,
        image: input.image,
        kind: input.kind,
        confirmed: input.confirmed,
        user: input.user,
        created_at: existing.created_at,
    };
    measurement.validate(state.image_encoding)?;

    state.measurements.update(&measurement).await?;
    tracing::info!(%id, "measurement updated");
    Ok(Json(measurement))
}

/// `DELETE /measurements/{id}`
#[utoipa::path(
    delete,
    path = "/measurements/{id}",
    params(("id" = String, Path, description = "Measurement id")),
    responses(
        (status = 204, description = "Measurement deleted"),
        (status = 400, description = "Invalid id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "No such measurement", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn delete_measurement(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = path_id(path)?;
    state.measurements.delete(id).await?;
    tracing::info!(%id, "measurement deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /measurements/{id}/image`: raw bytes for inline images, a redirect
/// for hosted ones.
#[utoipa::path(
    get,
    path = "/measurements/{id}/image",
    params(("id" = String, Path, description = "Measurement id")),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/jpeg"),
        (status = 307, description = "Redirect to the hosted image"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "No such measurement", body = ErrorResponse),
        (status = 500, description = "Stored image is corrupt", body = ErrorResponse)
    ),
    tags = ["measurements"],
    security(("bearer_auth" = []))
)]
pub async fn get_measurement_image(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let id = path_id(path)?;
    let measurement = state.measurements.find_by_id(id).await?;

    match state.image_encoding {
        ImageEncoding::Url => Ok(Redirect::temporary(&measurement.image).into_response()),
        ImageEncoding::Base64 => {
            let bytes = decode_base64(&measurement.image)
                .map_err(|err| AppError::internal(format!("stored image is corrupt: {err}")))?;
            let content_type = sniff_content_type(&bytes);
            Ok(([(header::CONTENT_TYPE, content_type)], Bytes::from(bytes)).into_response())
        }
    }
}

async fn discard_upload(state: &AppState, stored: &StoredImage) {
    if let Err(err) = state.images.discard(stored).await {
        tracing::warn!(reference = %stored.reference, "failed to discard uploaded image: {}", err);
    }
}

fn path_id(path: Result<Path<String>, PathRejection>) -> Result<Id, AppError> {
    let Path(raw) = path?;
    parse_path_id(&raw)
}

fn parse_path_id(raw: &str) -> Result<Id, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::bad_request("id is required"));
    }
    Ok(parse_id(raw)?)
}

fn int_param(raw: Option<&str>, default: i64, name: &str) -> Result<i64, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| AppError::bad_request(format!("{name} is invalid"))),
    }
}

/// Absolute URL of the image endpoint for `id`, relative to the collection
/// the request was sent to.
fn image_link(headers: &HeaderMap, uri: &Uri, id: Id) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    let path = uri.path().trim_end_matches('/');

    format!("{scheme}://{host}{path}/{id}/image")
}

/// Guess the image type from its magic bytes, defaulting to JPEG.
fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_int_param() {
        assert_eq!(int_param(None, 10, "limit").unwrap(), 10);
        assert_eq!(int_param(Some(""), 10, "limit").unwrap(), 10);
        assert_eq!(int_param(Some("5"), 10, "limit").unwrap(), 5);
        assert_eq!(int_param(Some("0"), 1, "page").unwrap(), 0);

        let err = int_param(Some("abc"), 1, "page").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "page is invalid");
    }

    #[test]
    fn test_parse_path_id() {
        assert_eq!(parse_path_id("  ").unwrap_err().message, "id is required");
        assert_eq!(parse_path_id("nope").unwrap_err().message, "id is invalid");

        let id = crate::models::new_id();
        assert_eq!(parse_path_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_image_link() {
        let id = crate::models::new_id();
        let uri: Uri = "/v1/measurements".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("meters.local:8000"));
        assert_eq!(
            image_link(&headers, &uri, id),
            format!("http://meters.local:8000/v1/measurements/{id}/image")
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(
            image_link(&headers, &uri, id),
            format!("https://meters.local:8000/v1/measurements/{id}/image")
        );

        let absolute: Uri = "http://api.example.com/v2/measurements/".parse().unwrap();
        assert_eq!(
            image_link(&HeaderMap::new(), &absolute, id),
            format!("http://api.example.com/v2/measurements/{id}/image")
        );
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(sniff_content_type(b"GIF89a..."), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"\xff\xd8\xff\xe0"), "image/jpeg");
        assert_eq!(sniff_content_type(b""), "image/jpeg");
    }
}
