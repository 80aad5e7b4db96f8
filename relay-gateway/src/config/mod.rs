use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Signing secret shipped as a placeholder; refused in production.
pub const PLACEHOLDER_JWT_SECRET: &str = "change-me";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: Option<DatabaseConfig>,
    pub token: TokenConfig,
    pub admin: AdminSeedConfig,
    pub relay: RelaySettingsConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub jwt_secret: SecretString,
    pub default_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct AdminSeedConfig {
    pub email: String,
    pub password: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct RelaySettingsConfig {
    /// Base URL of the `default` upstream target.
    pub default_base_url: String,
    pub require_auth: bool,
    pub allowed_models: Vec<String>,
    pub default_provider: String,
    pub session_title: String,
    pub upstream_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    /// Key login throttling on the proxy-appended `x-forwarded-for` hop.
    pub trust_forwarded_for: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let database = match get_optional_env("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )))
            }
            None => None,
        };

        let config = GatewayConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("relay-gateway"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database,
            token: TokenConfig {
                jwt_secret: SecretString::new(get_env(
                    "ADMIN_JWT_SECRET",
                    Some(PLACEHOLDER_JWT_SECRET),
                    is_prod,
                )?),
                default_ttl_hours: parse_env("TOKEN_DEFAULT_TTL_HOURS", "24", is_prod)?,
            },
            admin: AdminSeedConfig {
                email: get_env("ADMIN_EMAIL", Some("admin@example.com"), is_prod)?,
                password: get_optional_env("ADMIN_PASSWORD").map(SecretString::new),
            },
            relay: RelaySettingsConfig {
                default_base_url: get_env("OPENCODE_BASE", Some("http://opencode:7012"), is_prod)?,
                require_auth: parse_env("RELAY_REQUIRE_AUTH", "false", is_prod)?,
                allowed_models: split_list(&get_env(
                    "RELAY_ALLOWED_MODELS",
                    Some("gpt-4.1,gpt-4o"),
                    is_prod,
                )?),
                default_provider: get_env("RELAY_DEFAULT_PROVIDER", Some("openai"), is_prod)?,
                session_title: get_env("RELAY_SESSION_TITLE", Some("Auto Session"), is_prod)?,
                upstream_timeout_seconds: parse_env(
                    "RELAY_UPSTREAM_TIMEOUT_SECONDS",
                    "30",
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env("ALLOWED_ORIGINS", Some("*"), is_prod)?),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                trust_forwarded_for: parse_env("RATE_LIMIT_TRUST_FORWARDED_FOR", "false", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.token.default_ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_DEFAULT_TTL_HOURS must be positive"
            )));
        }

        if self.relay.upstream_timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_UPSTREAM_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.relay.allowed_models.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_ALLOWED_MODELS must name at least one model"
            )));
        }

        if self.environment == Environment::Prod {
            if self.token.jwt_secret.expose_secret() == PLACEHOLDER_JWT_SECRET {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ADMIN_JWT_SECRET must be changed in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        } else if self.token.jwt_secret.expose_secret() == PLACEHOLDER_JWT_SECRET {
            tracing::warn!("ADMIN_JWT_SECRET is the placeholder value; do not use outside development");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Variables that may legitimately be absent in every environment.
fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "relay-gateway".into(),
            service_version: "test".into(),
            log_level: "info".into(),
            otlp_endpoint: None,
            database: None,
            token: TokenConfig {
                jwt_secret: SecretString::new(PLACEHOLDER_JWT_SECRET.into()),
                default_ttl_hours: 24,
            },
            admin: AdminSeedConfig {
                email: "admin@example.com".into(),
                password: None,
            },
            relay: RelaySettingsConfig {
                default_base_url: "http://opencode:7012".into(),
                require_auth: false,
                allowed_models: vec!["gpt-4.1".into()],
                default_provider: "openai".into(),
                session_title: "Auto Session".into(),
                upstream_timeout_seconds: 30,
            },
            security: SecurityConfig {
                allowed_origins: vec!["*".into()],
            },
            rate_limit: RateLimitConfig {
                login_attempts: 5,
                login_window_seconds: 900,
                trust_forwarded_for: false,
            },
        }
    }

    #[test]
    fn dev_defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn prod_rejects_placeholder_secret() {
        let mut c = config();
        c.environment = Environment::Prod;
        c.security.allowed_origins = vec!["https://admin.example.com".into()];
        assert!(c.validate().is_err());

        c.token.jwt_secret = SecretString::new("a-real-secret".into());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn prod_rejects_wildcard_cors() {
        let mut c = config();
        c.environment = Environment::Prod;
        c.token.jwt_secret = SecretString::new("a-real-secret".into());
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_empty_allow_list_and_zero_timeout() {
        let mut c = config();
        c.relay.allowed_models.clear();
        assert!(c.validate().is_err());

        let mut c = config();
        c.relay.upstream_timeout_seconds = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(split_list(" a, ,b ,"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }
}
