use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info, warn},
};

use crate::{
    env_subst::substitute_env_with,
    error::{Error, Result},
    schema::InboxConfig,
    validate::{Severity, validate},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["inbox.toml", "inbox.yaml", "inbox.yml", "inbox.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<InboxConfig> {
    load_config_with(path, |name| std::env::var(name).ok())
}

fn load_config_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<InboxConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env_with(&raw, lookup);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./inbox.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/inbox/inbox.{toml,yaml,yml,json}` (user-global)
///
/// Returns `InboxConfig::default()` if no config file is found or the one
/// found cannot be loaded.
pub fn discover_and_load() -> InboxConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    InboxConfig::default()
}

/// Load the effective configuration: an explicit file (which must load) or
/// the discovered one, then environment overrides, then validation.
///
/// Validation warnings are logged; errors fail the load.
pub fn resolve(explicit: Option<&Path>) -> Result<InboxConfig> {
    let mut config = match explicit {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => discover_and_load(),
    };
    apply_env_overrides(&mut config)?;

    let mut problems = Vec::new();
    for diagnostic in validate(&config) {
        match diagnostic.severity {
            Severity::Error => problems.push(diagnostic.to_string()),
            Severity::Warning => warn!(path = %diagnostic.path, "{}", diagnostic.message),
        }
    }
    if !problems.is_empty() {
        return Err(Error::Invalid { problems });
    }
    Ok(config)
}

/// Apply `INBOX_*` and `WEBHOOK_*` environment overrides on top of file
/// values.
pub fn apply_env_overrides(config: &mut InboxConfig) -> Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    config: &mut InboxConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(bind) = get("INBOX_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = get("INBOX_PORT") {
        config.server.port = port.trim().parse().map_err(|e| Error::InvalidEnv {
            var: "INBOX_PORT",
            message: format!("{e}"),
        })?;
    }
    if let Some(env) = get("INBOX_ENV") {
        config.server.environment = env.parse().map_err(|message| Error::InvalidEnv {
            var: "INBOX_ENV",
            message,
        })?;
    }
    if let Some(url) = get("INBOX_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(token) = get("WEBHOOK_VERIFY_TOKEN") {
        config.webhook.verify_token = Some(Secret::new(token));
    }
    if let Some(secret) = get("WEBHOOK_APP_SECRET") {
        config.webhook.app_secret = Some(Secret::new(secret));
    }
    Ok(())
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/inbox/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "inbox").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<InboxConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
