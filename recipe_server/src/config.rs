//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chrono::Duration;
use recipe_auth::{
    auth::{AuthConfig, ResetDelivery, config::MIN_SECRET_LEN},
    db::DatabaseConfig,
    mail::SmtpConfig,
};
use std::net::SocketAddr;

/// Minimum pepper length when a pepper is configured
pub const MIN_PEPPER_LEN: usize = 16;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Secrets, token lifetimes and reset delivery
    pub auth: AuthConfig,
    /// SMTP relay, absent when `SMTP_HOST` is unset
    pub smtp: Option<SmtpConfig>,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
    /// Key rate limits on `x-forwarded-for` instead of the socket peer.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_proxy_headers: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a signing secret is missing, or a secret or the
    /// pepper is too short
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => {
                let raw = std::env::var("SERVER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{raw}' is not an IP:PORT address"),
                })?
            }
        };

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let session_secret = required_secret("ACCESS_TOKEN_SECRET")?;
        let reset_secret = required_secret("ACCESS_TOKEN_RESET")?;

        let password_pepper = std::env::var("PASSWORD_PEPPER").unwrap_or_default();
        if !password_pepper.is_empty() && password_pepper.len() < MIN_PEPPER_LEN {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: format!("Must be at least {MIN_PEPPER_LEN} characters"),
            });
        }

        let app_env = std::env::var("APP_ENV").ok();

        let mut auth = AuthConfig::new(session_secret, reset_secret);
        auth.password_pepper = password_pepper;
        auth.reset_delivery = ResetDelivery::for_environment(app_env.as_deref());
        auth.session_ttl = ttl_from_env("SESSION_TTL_SECS", auth.session_ttl)?;
        auth.reset_ttl = ttl_from_env("RESET_TTL_SECS", auth.reset_ttl)?;
        if let Ok(app_url) = std::env::var("APP_URL") {
            auth.reset_link_base = app_url;
        }

        let trust_proxy_headers = parse_env_or("TRUST_PROXY_HEADERS", false);

        let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(ServerConfig {
            bind,
            database,
            auth,
            smtp: SmtpConfig::from_env(),
            cors_origins,
            trust_proxy_headers,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_secret == self.auth.reset_secret {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_RESET".to_string(),
                reason: "Must differ from ACCESS_TOKEN_SECRET".to_string(),
            });
        }

        if self.auth.session_ttl <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "SESSION_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.reset_ttl <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "RESET_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auth.reset_delivery == ResetDelivery::Email && self.smtp.is_none() {
            log::warn!("SMTP_HOST is not set; reset emails will be recorded but not delivered");
        }

        self.auth.validate().map_err(|reason| ConfigError::Invalid {
            var: "auth".to_string(),
            reason,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn required_secret(var: &str) -> Result<String, ConfigError> {
    let secret = std::env::var(var).map_err(|_| ConfigError::MissingRequired {
        var: var.to_string(),
        hint: "Generate with: openssl rand -hex 32".to_string(),
    })?;

    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("Must be at least {MIN_SECRET_LEN} characters"),
        });
    }

    Ok(secret)
}

/// Token lifetime in seconds from `var`, or `default` when unset or unparsable
fn ttl_from_env(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = parse_env_or(var, default.num_seconds());
    Duration::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
        var: var.to_string(),
        reason: format!("{secs} seconds is out of range"),
    })
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "ACCESS_TOKEN_SECRET",
        "ACCESS_TOKEN_RESET",
        "PASSWORD_PEPPER",
        "APP_ENV",
        "APP_URL",
        "SERVER_BIND",
        "SESSION_TTL_SECS",
        "RESET_TTL_SECS",
        "CORS_ALLOWED_ORIGINS",
        "TRUST_PROXY_HEADERS",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: tests touching the environment run serially.
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(var: &str, value: &str) {
        // SAFETY: tests touching the environment run serially.
        unsafe { std::env::set_var(var, value) };
    }

    fn set_secrets() {
        set_env("ACCESS_TOKEN_SECRET", &"s".repeat(32));
        set_env("ACCESS_TOKEN_RESET", &"r".repeat(32));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "ACCESS_TOKEN_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ACCESS_TOKEN_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    #[serial]
    fn test_missing_session_secret() {
        clear_env();
        set_env("ACCESS_TOKEN_RESET", &"r".repeat(32));

        let err = ServerConfig::from_env(None, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref var, .. } if var == "ACCESS_TOKEN_SECRET"));
    }

    #[test]
    #[serial]
    fn test_missing_reset_secret() {
        clear_env();
        set_env("ACCESS_TOKEN_SECRET", &"s".repeat(32));

        let err = ServerConfig::from_env(None, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref var, .. } if var == "ACCESS_TOKEN_RESET"));
    }

    #[test]
    #[serial]
    fn test_short_secret_and_pepper_rejected() {
        clear_env();
        set_env("ACCESS_TOKEN_SECRET", "short");
        set_env("ACCESS_TOKEN_RESET", &"r".repeat(32));
        assert!(matches!(
            ServerConfig::from_env(None, None),
            Err(ConfigError::Invalid { .. })
        ));

        set_secrets();
        set_env("PASSWORD_PEPPER", "tiny");
        assert!(matches!(
            ServerConfig::from_env(None, None),
            Err(ConfigError::Invalid { ref var, .. }) if var == "PASSWORD_PEPPER"
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_loads_defaults_and_overrides() {
        clear_env();
        set_secrets();
        set_env("APP_ENV", "development");
        set_env("APP_URL", "https://recipes.example.com");
        set_env("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example");

        let bind: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config =
            ServerConfig::from_env(Some(bind), Some("postgres://localhost/other".to_string()))
                .unwrap();

        assert_eq!(config.bind, bind);
        assert_eq!(config.database.database_url, "postgres://localhost/other");
        assert_eq!(config.auth.reset_delivery, ResetDelivery::ReturnToken);
        assert_eq!(config.auth.reset_link_base, "https://recipes.example.com");
        assert_eq!(config.auth.session_ttl, Duration::hours(1));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(!config.trust_proxy_headers);
        assert!(config.validate().is_ok());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_validation_rejects_shared_secret() {
        clear_env();
        set_env("ACCESS_TOKEN_SECRET", &"x".repeat(32));
        set_env("ACCESS_TOKEN_RESET", &"x".repeat(32));

        let config = ServerConfig::from_env(None, None).unwrap();
        assert_eq!(config.auth.reset_delivery, ResetDelivery::Email);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_validation_rejects_zero_ttl() {
        clear_env();
        set_secrets();
        set_env("SESSION_TTL_SECS", "0");

        let config = ServerConfig::from_env(None, None).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SESSION_TTL_SECS"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_huge_ttl_is_config_error() {
        clear_env();
        set_secrets();
        set_env("SESSION_TTL_SECS", "99999999999999999");

        let err = ServerConfig::from_env(None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "SESSION_TTL_SECS"));

        set_env("SESSION_TTL_SECS", "3600");
        set_env("RESET_TTL_SECS", "999999999");
        let config = ServerConfig::from_env(None, None).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_trust_proxy_headers_opt_in() {
        clear_env();
        set_secrets();
        set_env("TRUST_PROXY_HEADERS", "true");

        let config = ServerConfig::from_env(None, None).unwrap();
        assert!(config.trust_proxy_headers);
        clear_env();
    }
}
