//! Configuration loading and validation
//!
//! Values come from an optional TOML file, overlaid by environment variables
//! (a `.env` file in the working directory is honoured). Validation happens
//! once in [`Config::to_runtime`]; a missing required value is fatal at startup.

use crate::auth::{Credentials, TokenEndpoint};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tribecrm.toml";

/// Token path used by the REST dialect when none is configured
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Failed to read config file {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(String, #[source] toml::de::Error),
}

/// Backend request-shaping convention
///
/// Chosen once per deployment. The two dialects are incompatible and a
/// running server only ever speaks one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    OData,
    Rest,
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "odata" => Ok(Dialect::OData),
            "rest" => Ok(Dialect::Rest),
            other => Err(ConfigError::Invalid("dialect", other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::OData => f.write_str("odata"),
            Dialect::Rest => f.write_str("rest"),
        }
    }
}

/// Raw configuration as read from file and environment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub api_url: Option<String>,
    pub auth_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub organization_id: Option<String>,
    pub dialect: Option<Dialect>,
    pub token_path: Option<String>,
    pub scope: Option<String>,
    pub server_name: Option<String>,
    pub timeout_secs: Option<u64>,
    pub insecure_ssl: Option<bool>,
}

/// Validated configuration used by the running server
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub auth_url: String,
    pub credentials: Credentials,
    pub dialect: Dialect,
    pub token_endpoint: TokenEndpoint,
    pub server_name: String,
    pub timeout: Option<Duration>,
    pub insecure_ssl: bool,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// The TOML file named by `TRIBECRM_CONFIG` is read if set, otherwise
    /// `tribecrm.toml` in the working directory if it exists. Environment
    /// variables override file values.
    pub fn load_default() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("TRIBECRM_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        Self::from_toml(&text).map_err(|e| ConfigError::Parse(path.display().to_string(), e))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("TRIBECRM_API_URL") {
            self.api_url = Some(v);
        }
        if let Some(v) = text("TRIBECRM_AUTH_URL") {
            self.auth_url = Some(v);
        }
        if let Some(v) = text("TRIBECRM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = text("TRIBECRM_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = text("TRIBECRM_ORGANIZATION_ID") {
            self.organization_id = Some(v);
        }
        if let Some(v) = text("TRIBECRM_DIALECT") {
            self.dialect = Some(v.parse()?);
        }
        if let Some(v) = text("TRIBECRM_TOKEN_PATH") {
            self.token_path = Some(v);
        }
        if let Some(v) = text("TRIBECRM_SCOPE") {
            self.scope = Some(v);
        }
        if let Some(v) = text("MCP_SERVER_NAME") {
            self.server_name = Some(v);
        }
        if let Some(v) = text("TRIBECRM_TIMEOUT_SECS") {
            let secs = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("timeout_secs", v.clone()))?;
            self.timeout_secs = Some(secs);
        }
        if let Some(v) = text("TRIBECRM_INSECURE_SSL") {
            let flag = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(ConfigError::Invalid("insecure_ssl", v)),
            };
            self.insecure_ssl = Some(flag);
        }

        Ok(())
    }

    /// Validate and convert to runtime configuration
    pub fn to_runtime(&self) -> Result<RuntimeConfig, ConfigError> {
        fn required(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|v| v.trim()).filter(|v| !v.is_empty()).map(String::from)
        }

        let api_url = required(&self.api_url);
        let auth_url = required(&self.auth_url);
        let client_id = required(&self.client_id);
        let client_secret = required(&self.client_secret);

        let (api_url, auth_url, client_id, client_secret) =
            match (api_url, auth_url, client_id, client_secret) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                (a, b, c, d) => {
                    let mut missing = Vec::new();
                    if a.is_none() {
                        missing.push("api_url (TRIBECRM_API_URL)");
                    }
                    if b.is_none() {
                        missing.push("auth_url (TRIBECRM_AUTH_URL)");
                    }
                    if c.is_none() {
                        missing.push("client_id (TRIBECRM_CLIENT_ID)");
                    }
                    if d.is_none() {
                        missing.push("client_secret (TRIBECRM_CLIENT_SECRET)");
                    }
                    return Err(ConfigError::Missing(missing));
                }
            };

        let dialect = self.dialect.unwrap_or_default();
        let token_endpoint = match dialect {
            Dialect::OData => TokenEndpoint::odata(),
            Dialect::Rest => TokenEndpoint::rest(
                &auth_url,
                self.token_path.as_deref().unwrap_or(DEFAULT_TOKEN_PATH),
                self.scope.clone(),
            ),
        };

        Ok(RuntimeConfig {
            api_url,
            auth_url,
            credentials: Credentials {
                client_id,
                client_secret,
                organization_id: required(&self.organization_id),
            },
            dialect,
            token_endpoint,
            server_name: self
                .server_name
                .clone()
                .unwrap_or_else(|| "tribecrm".to_string()),
            timeout: self.timeout_secs.map(Duration::from_secs),
            insecure_ssl: self.insecure_ssl.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TRIBECRM_API_URL", "https://api.tribecrm.nl"),
            ("TRIBECRM_AUTH_URL", "https://auth.tribecrm.nl"),
            ("TRIBECRM_CLIENT_ID", "client"),
            ("TRIBECRM_CLIENT_SECRET", "secret"),
        ]
    }

    #[test]
    fn test_env_only_defaults_to_odata() {
        let mut config = Config::default();
        config.apply_env(env(&complete_env())).unwrap();
        let runtime = config.to_runtime().unwrap();

        assert_eq!(runtime.dialect, Dialect::OData);
        assert_eq!(runtime.server_name, "tribecrm");
        assert_eq!(runtime.credentials.organization_id, None);
        assert_eq!(
            runtime.token_endpoint.url,
            "https://auth.tribecrm.nl/oauth2/token"
        );
        assert_eq!(
            runtime.token_endpoint.scope.as_deref(),
            Some("read write offline")
        );
        assert!(runtime.timeout.is_none());
    }

    #[test]
    fn test_missing_values_are_reported_together() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("TRIBECRM_API_URL", "https://api"), ("TRIBECRM_CLIENT_ID", "")]))
            .unwrap();

        match config.to_runtime() {
            Err(ConfigError::Missing(names)) => {
                assert_eq!(names.len(), 3);
                assert!(names[0].starts_with("auth_url"));
                assert!(names[1].starts_with("client_id"));
                assert!(names[2].starts_with("client_secret"));
            }
            other => panic!("expected missing config, got {:?}", other),
        }
    }

    #[test]
    fn test_rest_dialect_token_endpoint() {
        let mut pairs = complete_env();
        pairs.push(("TRIBECRM_DIALECT", "REST"));
        pairs.push(("TRIBECRM_AUTH_URL", "https://login.example.com/"));
        pairs.push(("TRIBECRM_TOKEN_PATH", "/connect/token"));
        pairs.push(("TRIBECRM_ORGANIZATION_ID", "org-1"));

        let mut config = Config::default();
        config.apply_env(env(&pairs)).unwrap();
        let runtime = config.to_runtime().unwrap();

        assert_eq!(runtime.dialect, Dialect::Rest);
        assert_eq!(
            runtime.token_endpoint.url,
            "https://login.example.com/connect/token"
        );
        assert!(runtime.token_endpoint.scope.is_none());
        assert_eq!(runtime.credentials.organization_id.as_deref(), Some("org-1"));
    }

    #[test]
    fn test_invalid_dialect() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("TRIBECRM_DIALECT", "soap")]))
            .unwrap_err();
        assert!(err.to_string().contains("dialect"));
    }

    #[test]
    fn test_env_overrides_toml() {
        let mut config = Config::from_toml(
            r#"
            api_url = "https://file.example.com"
            auth_url = "https://auth.example.com"
            client_id = "file-client"
            client_secret = "file-secret"
            dialect = "rest"
            timeout_secs = 30
            "#,
        )
        .unwrap();
        config
            .apply_env(env(&[("TRIBECRM_CLIENT_ID", "env-client")]))
            .unwrap();

        let runtime = config.to_runtime().unwrap();
        assert_eq!(runtime.api_url, "https://file.example.com");
        assert_eq!(runtime.credentials.client_id, "env-client");
        assert_eq!(runtime.dialect, Dialect::Rest);
        assert_eq!(runtime.timeout, Some(Duration::from_secs(30)));
        assert_eq!(runtime.token_endpoint.url, "https://auth.example.com/oauth/token");
    }
}
