/// Config schema types (server, database, webhook, inbox tunables, metrics).
use std::{fmt, str::FromStr};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub inbox: InboxSection,
    pub metrics: MetricsConfig,
}

/// Deployment environment. Controls how much error detail reaches clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 5000.
    pub port: u16,
    pub environment: Environment,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
            environment: Environment::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://inbox.db`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://inbox.db".into(),
            max_connections: 5,
        }
    }
}

/// Webhook authentication. Both values are optional; when the verify token
/// is unset every subscription handshake is rejected, and when the app
/// secret is unset signatures are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub verify_token: Option<Secret<String>>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_secret: Option<Secret<String>>,
}

/// Ingestion and query tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxSection {
    /// Characters of message body kept as the conversation preview.
    pub preview_chars: usize,
    /// Maximum conversations returned by the list endpoint.
    pub conversation_limit: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for InboxSection {
    fn default() -> Self {
        Self {
            preview_chars: 50,
            conversation_limit: 100,
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

impl WebhookConfig {
    /// The configured verify token, if any.
    pub fn verify_token(&self) -> Option<&str> {
        self.verify_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn app_secret(&self) -> Option<&str> {
        self.app_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted_when_serialized() {
        let config = WebhookConfig {
            verify_token: Some(Secret::new("hunter2".into())),
            app_secret: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("REDACTED"));
        assert!(!format!("{config:?}").contains("hunter2"));
        assert_eq!(config.verify_token(), Some("hunter2"));
    }

    #[test]
    fn empty_secret_counts_as_unset() {
        let config = WebhookConfig {
            verify_token: Some(Secret::new(String::new())),
            app_secret: None,
        };
        assert_eq!(config.verify_token(), None);
    }

    #[test]
    fn environment_parses_short_names() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!(" Production ".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
