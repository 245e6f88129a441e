//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. For local
//! development a `.env` file is honored via dotenvy.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Non-sensitive ---
    /// WHOOP OAuth client ID (public)
    pub whoop_client_id: String,
    /// Base URL of the WHOOP API (overridable for tests)
    pub whoop_api_base: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// SQLite database URL
    pub database_url: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// WHOOP OAuth client secret
    pub whoop_client_secret: String,
    /// Shared secret for webhook signature verification.
    /// When unset, signature checks are skipped with a warning (dev only).
    pub whoop_webhook_secret: Option<String>,
    /// 32-byte key for AES-256-GCM token encryption
    pub token_encryption_key: [u8; 32],
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            whoop_client_id: env::var("WHOOP_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("WHOOP_CLIENT_ID"))?,
            whoop_api_base: env::var("WHOOP_API_BASE")
                .unwrap_or_else(|_| "https://api.prod.whoop.com".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://journal.db?mode=rwc".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            whoop_client_secret: env::var("WHOOP_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WHOOP_CLIENT_SECRET"))?,
            whoop_webhook_secret: env::var("WHOOP_WEBHOOK_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            token_encryption_key: decode_key(
                &env::var("TOKEN_ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::Missing("TOKEN_ENCRYPTION_KEY"))?,
            )?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            whoop_client_id: "test_client_id".to_string(),
            whoop_api_base: "https://api.prod.whoop.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            database_url: "sqlite::memory:".to_string(),
            port: 8080,
            whoop_client_secret: "test_secret".to_string(),
            whoop_webhook_secret: Some("test_webhook_secret".to_string()),
            token_encryption_key: [7u8; 32],
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Decode a base64 key and require exactly 32 bytes.
fn decode_key(value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY", "not valid base64"))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY", "must decode to 32 bytes"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
