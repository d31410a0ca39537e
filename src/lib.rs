//! Meter readings service library.
//!
//! Exposes the router, state and domain types so the binary and the
//! integration tests build the service the same way.

pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use config::AppConfig;
pub use errors::AppError;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{
    auth::TokenAuthority,
    models::ImageEncoding,
    services::{
        image_store::ImageStore, measurement_repository::MeasurementRepository,
        meter_reader::MeterReader, user_repository::UserRepository,
    },
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pool used by the readiness probe.
    pub db: SqlitePool,
    pub measurements: Arc<dyn MeasurementRepository>,
    pub users: Arc<dyn UserRepository>,
    pub reader: Arc<dyn MeterReader>,
    pub images: Arc<dyn ImageStore>,
    pub tokens: TokenAuthority,
    pub image_encoding: ImageEncoding,
}
