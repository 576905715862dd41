use secrecy::{ExposeSecret, Secret};
use std::env;

use crate::error::AuthError;

/// Engine configuration, sourced from the environment.
#[derive(Debug, Clone)]
pub struct GatehouseConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
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
    /// HS256 signing key for both token kinds. The process must not serve
    /// traffic without one.
    pub signing_key: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_hours: i64,
    /// Clock-skew tolerance applied to expiry checks.
    pub expiry_leeway_seconds: u64,
    /// How long revoked-token ledger entries outlive the token's own expiry
    /// before pruning may collect them.
    pub revoked_retention_hours: i64,
}

impl GatehouseConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AuthError::Configuration(e))?;

        let is_prod = environment == Environment::Prod;

        let config = GatehouseConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("gatehouse"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost:5432/gatehouse"),
                    is_prod,
                )?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AuthError::Configuration(e.to_string())
                    })?,
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AuthError::Configuration(e.to_string())
                    })?,
            },
            token: TokenConfig {
                signing_key: Secret::new(get_env(
                    "TOKEN_SIGNING_KEY",
                    Some("dev-signing-key-do-not-deploy"),
                    is_prod,
                )?),
                access_token_expiry_minutes: get_env(
                    "TOKEN_ACCESS_EXPIRY_MINUTES",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| AuthError::Configuration(e.to_string()))?,
                refresh_token_expiry_hours: get_env(
                    "TOKEN_REFRESH_EXPIRY_HOURS",
                    Some("24"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| AuthError::Configuration(e.to_string()))?,
                expiry_leeway_seconds: get_env("TOKEN_EXPIRY_LEEWAY_SECONDS", Some("5"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AuthError::Configuration(e.to_string())
                    })?,
                revoked_retention_hours: get_env("LEDGER_RETENTION_HOURS", Some("48"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AuthError::Configuration(e.to_string())
                    })?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        self.token.validate()?;

        if self.database.max_connections == 0 {
            return Err(AuthError::Configuration(
                "DATABASE_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AuthError::Configuration(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.signing_key.expose_secret().is_empty() {
            return Err(AuthError::Configuration(
                "TOKEN_SIGNING_KEY must not be empty".to_string(),
            ));
        }
        if self.access_token_expiry_minutes <= 0 {
            return Err(AuthError::Configuration(
                "TOKEN_ACCESS_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiry_hours <= 0 {
            return Err(AuthError::Configuration(
                "TOKEN_REFRESH_EXPIRY_HOURS must be positive".to_string(),
            ));
        }
        // An access token must always die before its paired refresh token.
        if self.access_token_expiry_minutes * 60 >= self.refresh_token_expiry_hours * 3600 {
            return Err(AuthError::Configuration(
                "access token window must be strictly shorter than the refresh window".to_string(),
            ));
        }
        if self.revoked_retention_hours < 0 {
            return Err(AuthError::Configuration(
                "LEDGER_RETENTION_HOURS must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AuthError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AuthError::Configuration(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AuthError::Configuration(format!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
