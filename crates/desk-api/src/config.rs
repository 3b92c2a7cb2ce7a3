//! # Service Configuration
//!
//! Read once from the environment at startup. [`AppConfig::default`] is the
//! development profile used by tests: authentication and CSRF checks are
//! off so requests can be issued without ceremony.

use std::fmt;

use thiserror::Error;

use crate::middleware::rate_limit::RateLimitConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Bearer tokens are split on `:` into role, user and secret.
    #[error("AUTH_TOKEN must not contain ':'")]
    AuthTokenContainsColon,
}

/// Bearer secret whose `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Validate a configured secret. It must be usable both bare and as the
    /// last segment of `{role}:{user_id}:{secret}`.
    pub fn parse(token: impl Into<String>) -> Result<Self, ConfigError> {
        let token = token.into();
        if token.contains(':') {
            return Err(ConfigError::AuthTokenContainsColon);
        }
        Ok(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication and every
    /// caller is treated as an administrator.
    pub auth_token: Option<SecretToken>,
    /// Enforce double-submit CSRF tokens on mutating requests.
    pub csrf_enabled: bool,
    /// Record HTTP metrics and serve `/metrics`.
    pub metrics_enabled: bool,
    pub rate_limit: RateLimitConfig,
    /// Dashboard origins allowed by CORS. Empty disables the CORS layer.
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            csrf_enabled: false,
            metrics_enabled: true,
            rate_limit: RateLimitConfig::default(),
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// An `AUTH_TOKEN` containing `:` is an error, not a fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RateLimitConfig::default();
        let auth_token = get("AUTH_TOKEN")
            .filter(|t| !t.is_empty())
            .map(SecretToken::parse)
            .transpose()?;
        Ok(Self {
            port: parse_or(get("PORT"), 8080),
            auth_token,
            csrf_enabled: parse_flag(get("DESK_CSRF_ENABLED"), true),
            metrics_enabled: parse_flag(get("DESK_METRICS_ENABLED"), true),
            rate_limit: RateLimitConfig {
                max_requests: parse_or(get("DESK_RATE_LIMIT_MAX"), defaults.max_requests),
                window_secs: parse_or(get("DESK_RATE_LIMIT_WINDOW_SECS"), defaults.window_secs),
            },
            allowed_origins: get("DESK_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned()).unwrap()
    }

    #[test]
    fn empty_environment_uses_production_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_none());
        assert!(config.csrf_enabled);
        assert!(config.metrics_enabled);
        assert_eq!(config.rate_limit.max_requests, 1000);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn environment_overrides() {
        let config = config_from(&[
            ("PORT", "3000"),
            ("AUTH_TOKEN", "s3cret"),
            ("DESK_CSRF_ENABLED", "false"),
            ("DESK_RATE_LIMIT_MAX", "5"),
            ("DESK_ALLOWED_ORIGINS", "https://desk.example.com, http://localhost:3000,"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth_token.as_ref().map(SecretToken::expose), Some("s3cret"));
        assert!(!config.csrf_enabled);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("DESK_METRICS_ENABLED", "maybe")]);
        assert_eq!(config.port, 8080);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn debug_redacts_token() {
        let config = config_from(&[("AUTH_TOKEN", "hunter2")]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn default_profile_disables_auth_and_csrf() {
        let config = AppConfig::default();
        assert!(config.auth_token.is_none());
        assert!(!config.csrf_enabled);
    }

    #[test]
    fn auth_token_with_colon_is_rejected() {
        let lookup = |k: &str| (k == "AUTH_TOKEN").then(|| "team:s3cret".to_string());
        assert_eq!(
            AppConfig::from_lookup(lookup).unwrap_err(),
            ConfigError::AuthTokenContainsColon
        );
        assert!(SecretToken::parse("s3cret").is_ok());
    }
}
