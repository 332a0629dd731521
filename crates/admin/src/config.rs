//! Admin configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ADMIN_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ADMIN_HOST` - Bind address (default: 127.0.0.1)
//! - `ADMIN_PORT` - Listen port (default: 3001)
//! - `APP_ENV` - `development` (default) or `production`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (Skydropx - enables label creation and sync)
//! - `SKYDROPX_CLIENT_ID` / `SKYDROPX_CLIENT_SECRET` - OAuth client credentials (together)
//! - `SKYDROPX_BASE_URL` - API base URL (default: <https://pro.skydropx.com>)
//! - `SKYDROPX_WEBHOOK_SECRET` - Shared secret expected on webhook deliveries
//! - `SKYDROPX_ORIGIN_NAME`, `_STREET`, `_CITY`, `_STATE`, `_POSTAL_CODE`,
//!   `_PHONE`, `_EMAIL`, `_COUNTRY` (default: MX) - Ship-from address
//!
//! ## Optional (SMTP - enables shipping notifications)
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` (together)
//! - `SMTP_PORT` - SMTP port (default: 587)
//!
//! ## Optional (Shipping tunables)
//! - `SHIPPING_RESOLUTION_WINDOW` - Legacy lookup candidate window (default: 200)
//! - `SHIPPING_LABEL_CLAIM_STALE_SECS` - Age after which a label claim may be retaken (default: 300)
//! - `SHIPPING_CODE_REVISION` - Revision stamped into `_last_write` (default: crate version)
//!
//! ## Optional (TLS)
//! - `ADMIN_TLS_CERT` - PEM-encoded certificate chain
//! - `ADMIN_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_SKYDROPX_BASE_URL: &str = "https://pro.skydropx.com";
const DEFAULT_RESOLUTION_WINDOW: i64 = 200;
const DEFAULT_LABEL_CLAIM_STALE_SECS: i64 = 300;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnvironment {
    #[default]
    Development,
    Production,
}

impl AppEnvironment {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "development" | "dev" | "test" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvVar(
                "APP_ENV".to_string(),
                format!("unknown environment '{other}'"),
            )),
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    pub environment: AppEnvironment,
    /// Skydropx API configuration (optional - provider actions fail with `config_error`)
    pub skydropx: Option<SkydropxConfig>,
    /// Shared secret expected on webhook deliveries
    pub webhook_secret: Option<SecretString>,
    /// SMTP configuration (optional - notifications are skipped)
    pub email: Option<EmailConfig>,
    pub shipping: ShippingSettings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Skydropx API configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct SkydropxConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Ship-from address used for every label.
    pub origin: OriginAddress,
}

impl std::fmt::Debug for SkydropxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkydropxConfig")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Ship-from address. Blank fields are reported by label pre-flight validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAddress {
    pub name: String,
    pub street1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
    pub email: String,
    pub country: String,
}

impl OriginAddress {
    fn from_env() -> Self {
        Self {
            name: get_env_or_default("SKYDROPX_ORIGIN_NAME", ""),
            street1: get_env_or_default("SKYDROPX_ORIGIN_STREET", ""),
            city: get_env_or_default("SKYDROPX_ORIGIN_CITY", ""),
            state: get_env_or_default("SKYDROPX_ORIGIN_STATE", ""),
            postal_code: get_env_or_default("SKYDROPX_ORIGIN_POSTAL_CODE", ""),
            phone: get_env_or_default("SKYDROPX_ORIGIN_PHONE", ""),
            email: get_env_or_default("SKYDROPX_ORIGIN_EMAIL", ""),
            country: get_env_or_default("SKYDROPX_ORIGIN_COUNTRY", "MX"),
        }
    }
}

impl SkydropxConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let client_id = get_optional_env("SKYDROPX_CLIENT_ID");
        let client_secret = get_optional_env("SKYDROPX_CLIENT_SECRET");

        match (client_id, client_secret) {
            (Some(client_id), Some(secret)) => {
                if let Err(e) = validate_secret_strength(&secret, "SKYDROPX_CLIENT_SECRET") {
                    tracing::warn!("SKYDROPX_CLIENT_SECRET validation warning: {e}");
                }
                let raw_url = get_env_or_default("SKYDROPX_BASE_URL", DEFAULT_SKYDROPX_BASE_URL);
                let base_url = Url::parse(&raw_url).map_err(|e| {
                    ConfigError::InvalidEnvVar("SKYDROPX_BASE_URL".to_string(), e.to_string())
                })?;
                Ok(Some(Self {
                    base_url,
                    client_id,
                    client_secret: SecretString::from(secret),
                    origin: OriginAddress::from_env(),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SKYDROPX_*".to_string(),
                "Both SKYDROPX_CLIENT_ID and SKYDROPX_CLIENT_SECRET must be set together"
                    .to_string(),
            )),
        }
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("SMTP_FROM");

        match (host, username, password, from) {
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                let smtp_port = get_env_or_default("SMTP_PORT", "587")
                    .parse::<u16>()
                    .map_err(|e| {
                        ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string())
                    })?;
                Ok(Some(Self {
                    smtp_host,
                    smtp_port,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SMTP_*".to_string(),
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD and SMTP_FROM must be set together"
                    .to_string(),
            )),
        }
    }
}

/// Tunables for the shipping write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingSettings {
    /// Maximum rows inspected by legacy metadata lookups.
    pub resolution_window: i64,
    /// A label claim older than this may be retaken.
    pub label_claim_stale_secs: i64,
    /// Recorded in `_last_write.revision`.
    pub code_revision: String,
}

impl Default for ShippingSettings {
    fn default() -> Self {
        Self {
            resolution_window: DEFAULT_RESOLUTION_WINDOW,
            label_claim_stale_secs: DEFAULT_LABEL_CLAIM_STALE_SECS,
            code_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ShippingSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            resolution_window: get_positive_i64(
                "SHIPPING_RESOLUTION_WINDOW",
                defaults.resolution_window,
            )?,
            label_claim_stale_secs: get_positive_i64(
                "SHIPPING_LABEL_CLAIM_STALE_SECS",
                defaults.label_claim_stale_secs,
            )?,
            code_revision: get_optional_env("SHIPPING_CODE_REVISION")
                .filter(|rev| !rev.trim().is_empty())
                .unwrap_or(defaults.code_revision),
        })
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("ADMIN_TLS_CERT");
        let key_pem = get_optional_env("ADMIN_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "ADMIN_TLS_*".to_string(),
                "Both ADMIN_TLS_CERT and ADMIN_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if a variable group is only partially set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ADMIN_DATABASE_URL")?;
        let host = get_env_or_default("ADMIN_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ADMIN_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_PORT".to_string(), e.to_string()))?;
        let environment = AppEnvironment::parse(&get_env_or_default("APP_ENV", "development"))?;

        let skydropx = SkydropxConfig::from_env()?;
        let webhook_secret = get_optional_env("SKYDROPX_WEBHOOK_SECRET")
            .filter(|secret| !secret.trim().is_empty())
            .map(SecretString::from);
        if webhook_secret.is_none() && environment.is_production() {
            tracing::warn!("SKYDROPX_WEBHOOK_SECRET is not set; webhooks will be rejected");
        }
        let email = EmailConfig::from_env()?;
        let shipping = ShippingSettings::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            skydropx,
            webhook_secret,
            email,
            shipping,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns a reference to the Skydropx configuration (if configured).
    #[must_use]
    pub const fn skydropx(&self) -> Option<&SkydropxConfig> {
        self.skydropx.as_ref()
    }

    /// Returns a reference to the SMTP configuration (if configured).
    #[must_use]
    pub const fn email(&self) -> Option<&EmailConfig> {
        self.email.as_ref()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_positive_i64(key: &str, default: i64) -> Result<i64, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        Ok(value) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be positive (got {value})"),
        )),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-skydropx-secret", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_app_environment_parse() {
        assert_eq!(AppEnvironment::parse("Production").unwrap(), AppEnvironment::Production);
        assert_eq!(AppEnvironment::parse("").unwrap(), AppEnvironment::Development);
        assert!(AppEnvironment::parse("staging-ish").is_err());
    }

    #[test]
    fn test_shipping_settings_defaults() {
        let settings = ShippingSettings::default();
        assert_eq!(settings.resolution_window, 200);
        assert_eq!(settings.label_claim_stale_secs, 300);
        assert!(!settings.code_revision.is_empty());
    }

    #[test]
    fn test_skydropx_config_debug_redacts_secrets() {
        let config = SkydropxConfig {
            base_url: Url::parse("https://pro.skydropx.com").unwrap(),
            client_id: "client_123".to_string(),
            client_secret: SecretString::from("super_secret_client_secret"),
            origin: OriginAddress::default(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("client_123"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_client_secret"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "shipping@example.com".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "noreply@example.com".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("smtp.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }
}
