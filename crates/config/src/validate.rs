//! Semantic checks on a loaded configuration.

use crate::schema::InboxConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "range", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "inbox.max_page_size"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn error(path: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        category: "range",
        path: path.into(),
        message: message.into(),
    }
}

fn warning(path: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        category: "security",
        path: path.into(),
        message: message.into(),
    }
}

/// Check value ranges and flag risky settings.
pub fn validate(config: &InboxConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let inbox = &config.inbox;

    if config.database.url.trim().is_empty() {
        diagnostics.push(error("database.url", "must not be empty"));
    }
    if config.database.max_connections == 0 {
        diagnostics.push(error("database.max_connections", "must be at least 1"));
    }
    if inbox.preview_chars == 0 {
        diagnostics.push(error("inbox.preview_chars", "must be at least 1"));
    }
    if inbox.conversation_limit == 0 {
        diagnostics.push(error("inbox.conversation_limit", "must be at least 1"));
    }
    if inbox.default_page_size == 0 {
        diagnostics.push(error("inbox.default_page_size", "must be at least 1"));
    }
    if inbox.max_page_size < inbox.default_page_size {
        diagnostics.push(error(
            "inbox.max_page_size",
            format!(
                "must be at least inbox.default_page_size ({})",
                inbox.default_page_size
            ),
        ));
    }

    if config.webhook.verify_token().is_none() {
        diagnostics.push(warning(
            "webhook.verify_token",
            "not set; webhook subscription handshakes will be rejected",
        ));
    }

    let is_localhost = matches!(config.server.bind.as_str(), "127.0.0.1" | "localhost" | "::1");
    if config.webhook.app_secret().is_none() && !is_localhost {
        diagnostics.push(warning(
            "webhook.app_secret",
            format!(
                "not set while binding to {}; webhook signatures are not verified",
                config.server.bind
            ),
        ));
    }

    diagnostics
}
