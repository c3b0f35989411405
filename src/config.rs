use std::env;

use thiserror::Error;

const LOCAL_JWT_SECRET: &str = "blogicum-local-development-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_BUCKET: &str = "blogicum-media";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingInProduction(&'static str),
}

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` runs the service on the in-memory store (local only).
    pub db_url: Option<String>,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // S3-compatible storage for post images (MinIO locally).
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_key: String,
    pub s3_secret: String,
    pub s3_bucket: String,
    // Runtime environment marker. Controls the local `x-user-id` bypass and log format.
    pub env: Env,
    // HMAC secret used to validate bearer tokens.
    pub jwt_secret: String,
}

/// Env
///
/// Local development versus production.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe values for tests. Never touches the environment.
    fn default() -> Self {
        Self {
            db_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_key: "admin".to_string(),
            s3_secret: "password".to_string(),
            s3_bucket: "blogicum-test".to_string(),
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingInProduction(name))
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment (call `dotenv` first).
    /// Local runs fall back to MinIO defaults and a development JWT secret;
    /// production fails fast when a secret or the database URL is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let s3_bucket = env::var("S3_BUCKET_NAME").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        match env {
            Env::Local => Ok(Self {
                env,
                db_url: env::var("DATABASE_URL").ok(),
                bind_addr,
                s3_endpoint: env::var("S3_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:9000".to_string()),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                s3_key: env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "admin".to_string()),
                s3_secret: env::var("S3_SECRET_KEY").unwrap_or_else(|_| "password".to_string()),
                s3_bucket,
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            }),
            Env::Production => Ok(Self {
                env,
                db_url: Some(required("DATABASE_URL")?),
                bind_addr,
                s3_endpoint: required("S3_ENDPOINT")?,
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                s3_key: required("S3_ACCESS_KEY")?,
                s3_secret: required("S3_SECRET_KEY")?,
                s3_bucket,
                jwt_secret: required("JWT_SECRET")?,
            }),
        }
    }
}
