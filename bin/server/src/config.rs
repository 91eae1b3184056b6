//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested
//! fields use a double underscore, e.g. `SESSION__COOKIE_TTL_SECONDS`.
//!
//! See [`OidcConfig`](gatehouse_platform_access::OidcConfig) for
//! OIDC authentication configuration.

use gatehouse_platform_access::OidcConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory of static files served outside `/api`.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OIDC authentication configuration.
    pub oidc: OidcConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_static_dir() -> String {
    "../static".to_string()
}

/// When to set the `Secure` attribute on cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecureCookies {
    /// Follow the transport the request arrived on, as reported by the proxy.
    #[default]
    Auto,
    /// Always set `Secure`.
    Always,
    /// Never set `Secure`. Local HTTP development only.
    Never,
}

/// Where the correlators of an in-flight login are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStoreKind {
    /// Both values in browser cookies. No server-side state.
    #[default]
    Cookie,
    /// Nonce and PKCE verifier held in process memory, keyed by state.
    Memory,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of every auth cookie, in seconds.
    #[serde(default = "default_cookie_ttl_seconds")]
    pub cookie_ttl_seconds: i64,

    /// Whether to set the Secure flag on cookies.
    #[serde(default)]
    pub secure_cookies: SecureCookies,

    /// Pending-attempt store for the login round trip.
    #[serde(default)]
    pub attempt_store: AttemptStoreKind,

    /// Interval between purges of expired pending attempts, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Most attempts the memory store holds before evicting the oldest.
    #[serde(default = "default_max_pending_attempts")]
    pub max_pending_attempts: usize,
}

fn default_cookie_ttl_seconds() -> i64 {
    3600
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_max_pending_attempts() -> usize {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_ttl_seconds: default_cookie_ttl_seconds(),
            secure_cookies: SecureCookies::default(),
            attempt_store: AttemptStoreKind::default(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            max_pending_attempts: default_max_pending_attempts(),
        }
    }
}

impl SessionConfig {
    /// Rejects values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`config::ConfigError::Message`] naming the offending field.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.cookie_ttl_seconds <= 0 {
            return Err(config::ConfigError::Message(format!(
                "session.cookie_ttl_seconds must be positive, got {}",
                self.cookie_ttl_seconds
            )));
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "session.cleanup_interval_seconds must be positive".to_string(),
            ));
        }
        if self.max_pending_attempts == 0 {
            return Err(config::ConfigError::Message(
                "session.max_pending_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.session.validate()?;
        Ok(config)
    }
}
