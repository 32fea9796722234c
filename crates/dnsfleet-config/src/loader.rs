//! Settings resolution: defaults, optional JSON file, environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::SyncSettings;
use crate::validate::{
    parse_backup_policy, parse_positive_secs, parse_positive_usize, validate_settings,
};

/// Environment variable naming an optional JSON settings file.
pub const CONFIG_FILE_ENV: &str = "DNSFLEET_CONFIG_FILE";

/// Resolve settings from the process environment.
///
/// # Errors
///
/// Returns an error when the settings file cannot be read or parsed, or when
/// any resolved value fails validation.
pub fn load_from_env() -> ConfigResult<SyncSettings> {
    load_with(|key| std::env::var(key).ok())
}

/// Resolve settings using the supplied variable lookup.
///
/// # Errors
///
/// Returns an error when the settings file cannot be read or parsed, or when
/// any resolved value fails validation.
pub fn load_with<F>(lookup: F) -> ConfigResult<SyncSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match lookup(CONFIG_FILE_ENV).filter(|path| !path.trim().is_empty()) {
        Some(path) => read_file(Path::new(path.trim()))?,
        None => SyncSettings::default(),
    };
    apply_env(&mut settings, &lookup)?;
    validate_settings(&settings)?;
    debug!(
        max_concurrent_sessions = settings.max_concurrent_sessions,
        backup_policy = settings.backup_policy.as_str(),
        "sync settings resolved"
    );
    Ok(settings)
}

fn read_file(path: &Path) -> ConfigResult<SyncSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env<F>(settings: &mut SyncSettings, lookup: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(raw) = var("DNSFLEET_MAX_CONCURRENT_SESSIONS") {
        settings.max_concurrent_sessions = parse_positive_usize("max_concurrent_sessions", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_CONNECT_TIMEOUT_SECS") {
        settings.connect_timeout_secs = parse_positive_secs("connect_timeout_secs", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_OPERATION_TIMEOUT_SECS") {
        settings.operation_timeout_secs = parse_positive_secs("operation_timeout_secs", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_BACKUP_POLICY") {
        settings.backup_policy = parse_backup_policy(&raw)?;
    }
    if let Some(raw) = var("DNSFLEET_DOMAIN_SET_DIR") {
        settings.domain_set_dir = PathBuf::from(raw.trim());
    }
    if let Some(raw) = var("DNSFLEET_DEFAULT_CONFIG_PATH") {
        settings.default_config_path = PathBuf::from(raw.trim());
    }
    if let Some(raw) = var("DNSFLEET_RELOAD_COMMAND") {
        settings.reload_command = Some(raw);
    }
    if let Some(raw) = var("DNSFLEET_HEALTH_COMMAND") {
        settings.health_command = raw;
    }
    if let Some(raw) = var("DNSFLEET_HEALTH_CONCURRENCY") {
        settings.health_concurrency = parse_positive_usize("health_concurrency", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_HEALTH_INTERVAL_SECS") {
        settings.health_interval_secs = parse_positive_secs("health_interval_secs", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_QUEUE_CAPACITY") {
        settings.queue_capacity = parse_positive_usize("queue_capacity", &raw)?;
    }
    if let Some(raw) = var("DNSFLEET_MAX_CONCURRENT_JOBS") {
        settings.max_concurrent_jobs = parse_positive_usize("max_concurrent_jobs", &raw)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackupPolicy;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() -> ConfigResult<()> {
        let settings = load_with(|_| None)?;
        assert_eq!(settings, SyncSettings::default());
        Ok(())
    }

    #[test]
    fn environment_overrides_file_values() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"max_concurrent_sessions": 2, "reload_command": "systemctl restart smartdns"}"#,
        )?;
        let path_str = path.display().to_string();
        let settings = load_with(lookup_from(&[
            (CONFIG_FILE_ENV, path_str.as_str()),
            ("DNSFLEET_MAX_CONCURRENT_SESSIONS", "5"),
            ("DNSFLEET_BACKUP_POLICY", "required"),
            ("DNSFLEET_MAX_CONCURRENT_JOBS", "2"),
        ]))?;
        assert_eq!(settings.max_concurrent_sessions, 5);
        assert_eq!(settings.max_concurrent_jobs, 2);
        assert_eq!(settings.backup_policy, BackupPolicy::Required);
        assert_eq!(
            settings.reload_command.as_deref(),
            Some("systemctl restart smartdns")
        );
        Ok(())
    }

    #[test]
    fn invalid_override_names_field() {
        let err = load_with(lookup_from(&[("DNSFLEET_QUEUE_CAPACITY", "0")]))
            .expect_err("zero capacity");
        assert_eq!(err.field(), Some("queue_capacity"));

        let err = load_with(lookup_from(&[("DNSFLEET_BACKUP_POLICY", "never")]))
            .expect_err("unknown policy");
        assert_eq!(err.field(), Some("backup_policy"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_with(lookup_from(&[(CONFIG_FILE_ENV, "/nonexistent/dnsfleet.json")]))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_file_keys_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"max_sessions": 2}"#)?;
        let path_str = path.display().to_string();
        let err = load_with(lookup_from(&[(CONFIG_FILE_ENV, path_str.as_str())]))
            .expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
        Ok(())
    }
}
