//! Service configuration.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use mystery_cafe_core::{SyncSource, Table};

use crate::sync::WebhookConfig;

/// Default offset of the cafe's local time zone (UTC+9).
pub const DEFAULT_BUSINESS_UTC_OFFSET_MINUTES: i32 = 540;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string of the hosted backend.
    pub database_url: Option<String>,

    /// Connection pool size (default: 5).
    pub database_max_connections: u32,

    /// API key required on `/v1` routes.
    pub admin_api_key: Option<String>,

    /// Outbound reservation webhook URL (optional).
    pub webhook_url: Option<String>,

    /// Bearer token for the webhook (optional).
    pub webhook_token: Option<String>,

    /// HMAC secret for the `X-Signature` header (optional).
    pub webhook_signing_secret: Option<String>,

    /// Deployment this instance runs as.
    pub sync_source: SyncSource,

    /// Tables followed in realtime.
    pub sync_tables: Vec<Table>,

    /// Offset of the cafe's local time zone, in minutes east of UTC.
    pub business_utc_offset_minutes: i32,

    /// JSON file holding the local cache the migrator copies from.
    pub local_cache_path: Option<PathBuf>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Backend secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct BackendSecrets {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
    #[serde(default)]
    webhook_token: Option<String>,
    #[serde(default)]
    webhook_signing_secret: Option<String>,
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|s| s.trim().parse().ok())
}

impl ServiceConfig {
    /// Load configuration from environment variables and the secrets file.
    #[must_use]
    pub fn from_env() -> Self {
        let secrets = load_backend_secrets();
        let defaults = Self::default();

        Self {
            listen_addr: env("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: secrets.database_url.or_else(|| env("DATABASE_URL")),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            admin_api_key: secrets.admin_api_key.or_else(|| env("ADMIN_API_KEY")),
            webhook_url: env("WEBHOOK_URL"),
            webhook_token: secrets.webhook_token.or_else(|| env("WEBHOOK_TOKEN")),
            webhook_signing_secret: secrets
                .webhook_signing_secret
                .or_else(|| env("WEBHOOK_SIGNING_SECRET")),
            sync_source: env_parse("SYNC_SOURCE").unwrap_or_default(),
            sync_tables: env("SYNC_TABLES")
                .map_or(defaults.sync_tables, |list| parse_tables(&list)),
            business_utc_offset_minutes: env_parse("BUSINESS_UTC_OFFSET_MINUTES")
                .unwrap_or(DEFAULT_BUSINESS_UTC_OFFSET_MINUTES),
            local_cache_path: env("LOCAL_CACHE_PATH").map(PathBuf::from),
            cors_origins: env("CORS_ORIGINS")
                .unwrap_or_else(|| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }

    /// The cafe's local time zone. Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn business_offset(&self) -> FixedOffset {
        let seconds = self.business_utc_offset_minutes.saturating_mul(60);
        FixedOffset::east_opt(seconds).unwrap_or_else(|| {
            tracing::warn!(
                minutes = self.business_utc_offset_minutes,
                "Invalid business UTC offset, using UTC"
            );
            Utc.fix()
        })
    }

    /// Webhook settings, if a URL is configured.
    #[must_use]
    pub fn webhook(&self) -> Option<WebhookConfig> {
        self.webhook_url.as_ref().map(|url| WebhookConfig {
            url: url.clone(),
            token: self.webhook_token.clone(),
            signing_secret: self.webhook_signing_secret.clone(),
        })
    }
}

/// Parse a comma-separated table list, dropping unknown names.
#[must_use]
pub fn parse_tables(list: &str) -> Vec<Table> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|name| match name.parse::<Table>() {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unknown sync table");
                None
            }
        })
        .collect()
}

/// Load backend secrets from file, if one is present.
fn load_backend_secrets() -> BackendSecrets {
    let secret_paths = [
        ".secrets/backend.json",
        "mystery-cafe/.secrets/backend.json",
        "../.secrets/backend.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<BackendSecrets>(path) {
            tracing::info!(path = %path, "Loaded backend secrets from file");
            return secrets;
        }
    }

    tracing::debug!("Backend secrets file not found, using environment variables");
    BackendSecrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 5,
            admin_api_key: None,
            webhook_url: None,
            webhook_token: None,
            webhook_signing_secret: None,
            sync_source: SyncSource::Admin,
            sync_tables: Table::REALTIME.to_vec(),
            business_utc_offset_minutes: DEFAULT_BUSINESS_UTC_OFFSET_MINUTES,
            local_cache_path: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_list_skips_unknown_names() {
        assert_eq!(
            parse_tables("reservations, staff,,nope"),
            vec![Table::Reservations, Table::Staff]
        );
    }

    #[test]
    fn default_offset_is_utc_plus_nine() {
        let offset = ServiceConfig::default().business_offset();
        assert_eq!(offset.local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let config = ServiceConfig {
            business_utc_offset_minutes: 100_000,
            ..ServiceConfig::default()
        };
        assert_eq!(config.business_offset().local_minus_utc(), 0);
    }

    #[test]
    fn webhook_requires_url() {
        let mut config = ServiceConfig {
            webhook_token: Some("t".into()),
            ..ServiceConfig::default()
        };
        assert!(config.webhook().is_none());
        config.webhook_url = Some("https://hooks.internal/reservations".into());
        assert_eq!(config.webhook().unwrap().token.as_deref(), Some("t"));
    }
}
