use anyhow::{Context, Result};
use axum::Router;
use meter_readings::{
    AppConfig, AppState,
    auth::TokenAuthority,
    db,
    models::ImageEncoding,
    routes,
    services::{
        image_store::{CloudinaryImageStore, ImageStore, InlineImageStore},
        measurement_repository::SqliteMeasurementRepository,
        meter_reader::GeminiMeterReader,
        user_repository::SqliteUserRepository,
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meter_readings=info,tower_http=info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting meter-readings with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = db::connect(&cfg.database_url).await?;

    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize collaborators ---
    let mut reader = GeminiMeterReader::new(
        cfg.gemini_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.http_timeout,
    )
    .context("building vision API client")?;
    if let Some(endpoint) = &cfg.gemini_endpoint {
        tracing::info!("Using vision API endpoint {}", endpoint);
        reader = reader.with_endpoint(endpoint.clone());
    }

    let images: Arc<dyn ImageStore> = match (&cfg.image_encoding, &cfg.storage) {
        (ImageEncoding::Url, Some(storage)) => Arc::new(
            CloudinaryImageStore::new(
                storage.name.clone(),
                storage.api_key.clone(),
                storage.api_secret.clone(),
                cfg.http_timeout,
            )
            .context("building image storage client")?,
        ),
        (ImageEncoding::Url, None) => anyhow::bail!("url image encoding needs storage credentials"),
        (ImageEncoding::Base64, _) => Arc::new(InlineImageStore),
    };
    tracing::info!("Images stored as {}", cfg.image_encoding);

    let state = AppState {
        db: db.clone(),
        measurements: Arc::new(SqliteMeasurementRepository::new(db.clone())),
        users: Arc::new(SqliteUserRepository::new(db)),
        reader: Arc::new(reader),
        images,
        tokens: TokenAuthority::new(&cfg.jwt_secret, cfg.jwt_expires_in),
        image_encoding: cfg.image_encoding,
    };

    // --- Build router ---
    let app: Router =
        routes::routes::routes(state, &cfg.api_version).layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{}/{}",
        listener.local_addr()?,
        cfg.api_version
    );
    axum::serve(listener, app).await?;

    Ok(())
}
