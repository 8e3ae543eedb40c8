//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Secrets that ship in sample `.env` files and must never be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `PARLEY_HOST`
    /// Default: `0.0.0.0`
    pub host: String,

    /// Env: `PARLEY_PORT`
    /// Default: `3000`
    pub port: u16,

    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`
    /// Default: `parley.db`
    pub db_path: PathBuf,

    /// HMAC secret shared with the platform that issues bearer tokens.
    /// Env: `PARLEY_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// When set, notifications are POSTed here instead of being pushed over
    /// the gateway.
    /// Env: `PARLEY_NOTIFY_WEBHOOK`
    pub notify_webhook: Option<String>,

    /// How long after sending a message its sender may still edit it.
    /// Env: `PARLEY_EDIT_WINDOW_SECS`
    /// Default: `60`
    pub edit_window_secs: i64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PARLEY_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("PARLEY_PORT is not a port: {}", raw))?,
            None => 3000,
        };
        let edit_window_secs = match get("PARLEY_EDIT_WINDOW_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PARLEY_EDIT_WINDOW_SECS is not a number: {}", raw))?,
            None => 60,
        };

        Ok(Self {
            host: get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(get("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into())),
            jwt_secret: get("PARLEY_JWT_SECRET").unwrap_or_default(),
            notify_webhook: get("PARLEY_NOTIFY_WEBHOOK"),
            edit_window_secs,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    /// False when the secret is missing or still a sample value.
    pub fn has_usable_secret(&self) -> bool {
        !self.jwt_secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.edit_window_secs, 60);
        assert_eq!(cfg.db_path, PathBuf::from("parley.db"));
        assert!(cfg.notify_webhook.is_none());
        assert!(!cfg.has_usable_secret());
        assert_eq!(cfg.addr().unwrap().port(), 3000);
    }

    #[test]
    fn placeholder_secrets_are_unusable() {
        assert!(!config(&[("PARLEY_JWT_SECRET", "dev-secret-change-me")]).unwrap().has_usable_secret());
        assert!(config(&[("PARLEY_JWT_SECRET", "k8Qz1f")]).unwrap().has_usable_secret());
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("PARLEY_PORT", "http")]).is_err());
        assert!(config(&[("PARLEY_EDIT_WINDOW_SECS", "soon")]).is_err());
        assert_eq!(config(&[("PARLEY_EDIT_WINDOW_SECS", "90")]).unwrap().edit_window_secs, 90);
    }
}
