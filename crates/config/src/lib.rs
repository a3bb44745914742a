//! Configuration loading, env substitution, overrides and validation.
//!
//! Config files: `inbox.toml`, `inbox.yaml`, `inbox.yml` or `inbox.json`,
//! searched in `./` then `~/.config/inbox/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config, resolve},
    schema::{
        DatabaseConfig, Environment, InboxConfig, InboxSection, MetricsConfig, ServerConfig,
        WebhookConfig,
    },
    validate::{Diagnostic, Severity, validate},
};
