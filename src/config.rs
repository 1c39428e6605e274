use std::env;

use crate::domain::review::EmptyPagePolicy;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the binary runs the
    /// in-memory lifecycle demo instead of serving against a database.
    pub database_url: Option<String>,
    pub metrics_port: u16,
    /// Whether an empty review page is reported as an error (the
    /// default) or returned as-is.
    pub empty_page_policy: EmptyPagePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let metrics_port = match env::var("METRICS_PORT") {
            Err(_) => 9090,
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "METRICS_PORT",
                value: raw,
            })?,
        };

        let empty_page_policy = match env::var("REVIEW_EMPTY_PAGE_IS_ERROR") {
            Err(_) => EmptyPagePolicy::Error,
            Ok(raw) => match raw.parse::<bool>() {
                Ok(true) => EmptyPagePolicy::Error,
                Ok(false) => EmptyPagePolicy::Allow,
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        name: "REVIEW_EMPTY_PAGE_IS_ERROR",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            database_url,
            metrics_port,
            empty_page_policy,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            metrics_port: 9090,
            empty_page_policy: EmptyPagePolicy::Error,
        }
    }
}
