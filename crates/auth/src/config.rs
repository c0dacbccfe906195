//! Token service configuration.
//!
//! Secrets and lifetimes come from the environment:
//!
//! | variable | required | default |
//! |---|---|---|
//! | `GATEKEEP_ACCESS_SECRET` | yes | |
//! | `GATEKEEP_REFRESH_SECRET` | yes | |
//! | `GATEKEEP_ACCESS_TTL_SECS` | no | 900 (15 minutes) |
//! | `GATEKEEP_REFRESH_TTL_SECS` | no | 2592000 (30 days) |

use chrono::Duration;
use thiserror::Error;

pub const ACCESS_SECRET_VAR: &str = "GATEKEEP_ACCESS_SECRET";
pub const REFRESH_SECRET_VAR: &str = "GATEKEEP_REFRESH_SECRET";
pub const ACCESS_TTL_VAR: &str = "GATEKEEP_ACCESS_TTL_SECS";
pub const REFRESH_TTL_VAR: &str = "GATEKEEP_REFRESH_TTL_SECS";

/// Upper bound for either lifetime (10 years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{name} must be between 1 and {max} seconds, got {value:?}", max = MAX_TTL_SECS)]
    InvalidTtl { name: &'static str, value: String },

    #[error("access and refresh secrets must differ")]
    SharedSecret,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenConfig {
    pub fn default_access_ttl() -> Duration {
        Duration::minutes(15)
    }

    pub fn default_refresh_ttl() -> Duration {
        Duration::days(30)
    }

    /// Config with default lifetimes.
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Self::default_access_ttl(),
            refresh_ttl: Self::default_refresh_ttl(),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_secret = lookup(ACCESS_SECRET_VAR).ok_or(ConfigError::Missing(ACCESS_SECRET_VAR))?;
        let refresh_secret =
            lookup(REFRESH_SECRET_VAR).ok_or(ConfigError::Missing(REFRESH_SECRET_VAR))?;

        let mut config = Self::new(access_secret, refresh_secret);
        if let Some(raw) = lookup(ACCESS_TTL_VAR) {
            config.access_ttl = parse_ttl(ACCESS_TTL_VAR, &raw)?;
        }
        if let Some(raw) = lookup(REFRESH_TTL_VAR) {
            config.refresh_ttl = parse_ttl(REFRESH_TTL_VAR, &raw)?;
        }

        config.validate()?;
        if config.access_ttl > Self::default_access_ttl() {
            tracing::warn!(
                access_ttl_secs = config.access_ttl.num_seconds(),
                "access credential lifetime exceeds 15 minutes; revocation lag grows with it"
            );
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::Empty(ACCESS_SECRET_VAR));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::Empty(REFRESH_SECRET_VAR));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        for (name, ttl) in [
            (ACCESS_TTL_VAR, self.access_ttl),
            (REFRESH_TTL_VAR, self.refresh_ttl),
        ] {
            if ttl <= Duration::zero() || ttl.num_seconds() > MAX_TTL_SECS {
                return Err(ConfigError::InvalidTtl {
                    name,
                    value: ttl.num_seconds().to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_ttl(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTtl {
        name,
        value: raw.to_string(),
    };
    match raw.trim().parse::<i64>() {
        Ok(secs) if (1..=MAX_TTL_SECS).contains(&secs) => {
            Duration::try_seconds(secs).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}
