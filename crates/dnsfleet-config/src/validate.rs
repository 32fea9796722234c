//! Validation and parsing helpers for settings values.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BackupPolicy, SyncSettings};

pub(crate) fn parse_positive_usize(field: &'static str, raw: &str) -> ConfigResult<usize> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::invalid(field, raw, "must be an unsigned integer"))?;
    ensure_positive(field, value as u64)?;
    Ok(value)
}

pub(crate) fn parse_positive_secs(field: &'static str, raw: &str) -> ConfigResult<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, raw, "must be an unsigned integer"))?;
    ensure_positive(field, value)?;
    Ok(value)
}

pub(crate) fn parse_backup_policy(raw: &str) -> ConfigResult<BackupPolicy> {
    BackupPolicy::from_label(raw)
        .ok_or_else(|| ConfigError::invalid("backup_policy", raw, "unknown backup policy"))
}

fn ensure_positive(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, value, "must be greater than zero"));
    }
    Ok(())
}

fn ensure_absolute(field: &'static str, path: &Path) -> ConfigResult<()> {
    if !path.is_absolute() {
        return Err(ConfigError::invalid(
            field,
            path.display(),
            "must be an absolute path",
        ));
    }
    Ok(())
}

fn ensure_command(field: &'static str, command: &str) -> ConfigResult<()> {
    if command.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            value: None,
            reason: "must not be empty",
        });
    }
    Ok(())
}

/// Validate a fully resolved settings value.
pub(crate) fn validate_settings(settings: &SyncSettings) -> ConfigResult<()> {
    ensure_positive(
        "max_concurrent_sessions",
        settings.max_concurrent_sessions as u64,
    )?;
    ensure_positive("connect_timeout_secs", settings.connect_timeout_secs)?;
    ensure_positive("operation_timeout_secs", settings.operation_timeout_secs)?;
    ensure_positive("health_concurrency", settings.health_concurrency as u64)?;
    ensure_positive("health_interval_secs", settings.health_interval_secs)?;
    ensure_positive("queue_capacity", settings.queue_capacity as u64)?;
    ensure_positive("max_concurrent_jobs", settings.max_concurrent_jobs as u64)?;
    ensure_absolute("domain_set_dir", &settings.domain_set_dir)?;
    ensure_absolute("default_config_path", &settings.default_config_path)?;
    ensure_command("health_command", &settings.health_command)?;
    if let Some(reload) = &settings.reload_command {
        ensure_command("reload_command", reload)?;
    }
    Ok(())
}
