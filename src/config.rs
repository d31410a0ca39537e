use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

use crate::models::ImageEncoding;

/// Cloudinary account used when images are stored as URLs.
#[derive(Clone)]
pub struct StorageConfig {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub api_version: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expires_in: i64,
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// API root override, e.g. a regional proxy.
    pub gemini_endpoint: Option<String>,
    pub image_encoding: ImageEncoding,
    /// Present exactly when `image_encoding` is [`ImageEncoding::Url`].
    pub storage: Option<StorageConfig>,
    pub http_timeout: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("api_version", &self.api_version)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_endpoint", &self.gemini_endpoint)
            .field("image_encoding", &self.image_encoding)
            .field("storage", &self.storage)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Meter readings API")]
pub struct Args {
    /// Host to bind to (overrides WEB_SERVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides WEB_SERVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Route prefix, e.g. `v1` (overrides API_VERSION)
    #[arg(long)]
    pub api_version: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // A missing .env file is fine; a malformed one is not.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err).context("loading .env"),
        }

        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values found through `lookup`, then defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

        let env_host = var("WEB_SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parsed(&var, "WEB_SERVER_PORT", 8000u16)?;
        let env_db =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://./data/meter_readings.db".into());
        let env_version = var("API_VERSION").unwrap_or_else(|| "v1".into());

        let jwt_expires_in = parsed(&var, "JWT_EXPIRES_IN", 300i64)?;
        if jwt_expires_in <= 0 {
            bail!("JWT_EXPIRES_IN must be positive, got {jwt_expires_in}");
        }

        let image_encoding = parsed(&var, "IMAGE_ENCODING", ImageEncoding::Base64)?;
        let storage = match image_encoding {
            ImageEncoding::Base64 => None,
            ImageEncoding::Url => Some(StorageConfig {
                name: required("STORAGE_NAME")?,
                api_key: required("STORAGE_API_KEY")?,
                api_secret: required("STORAGE_API_SECRET")?,
            }),
        };

        let api_version = args.api_version.unwrap_or(env_version);
        let api_version = api_version.trim_matches('/').to_string();
        if api_version.is_empty() || api_version.contains('/') {
            bail!("API version `{api_version}` must be a single path segment");
        }

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            api_version,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expires_in,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".into()),
            gemini_endpoint: var("GEMINI_ENDPOINT"),
            image_encoding,
            storage,
            http_timeout: Duration::from_secs(parsed(&var, "HTTP_TIMEOUT_SECS", 30u64)?),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {key} value `{value}`")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [("JWT_SECRET", "s3cret"), ("GEMINI_API_KEY", "g-key")];

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::resolve(Args::default(), lookup(&REQUIRED)).unwrap();

        assert_eq!(cfg.addr(), "0.0.0.0:8000");
        assert_eq!(cfg.database_url, "sqlite://./data/meter_readings.db");
        assert_eq!(cfg.api_version, "v1");
        assert_eq!(cfg.jwt_expires_in, 300);
        assert_eq!(cfg.gemini_model, "gemini-1.5-flash");
        assert!(cfg.gemini_endpoint.is_none());
        assert_eq!(cfg.image_encoding, ImageEncoding::Base64);
        assert!(cfg.storage.is_none());
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_args_override_env() {
        let args = Args {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            api_version: Some("/v2/".into()),
            ..Args::default()
        };
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("WEB_SERVER_HOST", "10.0.0.1"), ("WEB_SERVER_PORT", "8080")]);

        let cfg = AppConfig::resolve(args, lookup(&pairs)).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.api_version, "v2");
    }

    #[test]
    fn test_gemini_endpoint_override() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GEMINI_ENDPOINT", "https://proxy.internal/v1beta"));

        let cfg = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap();
        assert_eq!(
            cfg.gemini_endpoint.as_deref(),
            Some("https://proxy.internal/v1beta")
        );
    }

    #[test]
    fn test_missing_secret() {
        let err = AppConfig::resolve(Args::default(), lookup(&[("GEMINI_API_KEY", "k")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_invalid_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WEB_SERVER_PORT", "eighty"));

        let err = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("WEB_SERVER_PORT"));
    }

    #[test]
    fn test_url_encoding_requires_storage() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("IMAGE_ENCODING", "url"));
        let err = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("STORAGE_NAME"));

        pairs.extend([
            ("STORAGE_NAME", "demo"),
            ("STORAGE_API_KEY", "key"),
            ("STORAGE_API_SECRET", "secret"),
        ]);
        let cfg = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap();
        assert_eq!(cfg.image_encoding, ImageEncoding::Url);
        assert_eq!(cfg.storage.unwrap().name, "demo");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = AppConfig::resolve(Args::default(), lookup(&REQUIRED)).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("g-key"));
    }
}
