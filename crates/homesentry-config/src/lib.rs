//! Configuration for the homesentry daemon.
//!
//! TOML file plus `HOMESENTRY_` environment overrides (double
//! underscore for nesting, e.g. `HOMESENTRY_EMAIL__HOST`), and
//! translation to `homesentry_core::EngineConfig`.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use homesentry_core::{AdminContact, EngineConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration for the daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_presence_file")]
    pub presence_file: PathBuf,

    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,

    #[serde(default = "default_alerts_file")]
    pub alerts_file: PathBuf,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_ingest_interval")]
    pub ingest_interval_secs: u64,

    /// IPs never managed by the reconciler, beyond loopback and
    /// link-local which are always excluded.
    #[serde(default)]
    pub excluded_ips: Vec<String>,

    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    /// When true, alerts already in the feed at startup are notified
    /// instead of silently seeding the dedup set.
    #[serde(default)]
    pub notify_on_first_tick: bool,

    #[serde(default)]
    pub admins: Vec<AdminEntry>,

    #[serde(default)]
    pub email: EmailSettings,

    #[serde(default)]
    pub push: PushSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            presence_file: default_presence_file(),
            metadata_file: default_metadata_file(),
            alerts_file: default_alerts_file(),
            reconcile_interval_secs: default_reconcile_interval(),
            ingest_interval_secs: default_ingest_interval(),
            excluded_ips: Vec::new(),
            dashboard_url: default_dashboard_url(),
            notify_on_first_tick: false,
            admins: Vec::new(),
            email: EmailSettings::default(),
            push: PushSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminEntry {
    pub email: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

/// SMTP settings. Disabled or credential-less configs silently skip
/// the email channel.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmailSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub user: Option<String>,

    /// Password (plaintext TOML -- prefer the `HOMESENTRY_EMAIL__PASSWORD`
    /// env var). App passwords are often copied with spaces; they are
    /// stripped before auth.
    pub password: Option<String>,

    /// Sender address; falls back to `user`.
    pub from: Option<String>,
}

impl EmailSettings {
    /// SMTP password with copy-paste spaces removed.
    #[must_use]
    pub fn normalized_password(&self) -> Option<SecretString> {
        self.password
            .as_ref()
            .map(|p| SecretString::from(p.replace(' ', "")))
    }

    /// Resolved sender address.
    #[must_use]
    pub fn sender(&self) -> String {
        self.from
            .clone()
            .or_else(|| self.user.clone())
            .unwrap_or_else(|| "noreply@homesentry.local".into())
    }

    /// Whether the channel can actually be used.
    #[must_use]
    pub fn usable(&self) -> bool {
        self.enabled && self.user.is_some() && self.password.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-delivery HTTP timeout.
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_push_timeout(),
        }
    }
}

fn default_presence_file() -> PathBuf {
    PathBuf::from("active_devices.json")
}
fn default_metadata_file() -> PathBuf {
    PathBuf::from("devices.json")
}
fn default_alerts_file() -> PathBuf {
    PathBuf::from("alerts.json")
}
fn default_reconcile_interval() -> u64 {
    10
}
fn default_ingest_interval() -> u64 {
    2
}
fn default_dashboard_url() -> String {
    "http://localhost:8080".into()
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_push_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
#[must_use]
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "homesentry", "homesentry").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("homesentry");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load configuration from an explicit file (or the canonical path)
/// plus `HOMESENTRY_` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("HOMESENTRY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Translation to the engine config ────────────────────────────────

impl Config {
    /// Build the core [`EngineConfig`]. Fails on unparseable entries
    /// in `excluded_ips`.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut excluded = HashSet::new();
        for raw in &self.excluded_ips {
            let ip: IpAddr = raw.parse().map_err(|_| ConfigError::Validation {
                field: "excluded_ips".into(),
                reason: format!("not an IP address: {raw}"),
            })?;
            excluded.insert(ip);
        }

        Ok(EngineConfig {
            presence_file: self.presence_file.clone(),
            metadata_file: self.metadata_file.clone(),
            alerts_file: self.alerts_file.clone(),
            reconcile_interval: std::time::Duration::from_secs(self.reconcile_interval_secs),
            ingest_interval: std::time::Duration::from_secs(self.ingest_interval_secs),
            excluded_ips: excluded,
            dashboard_url: self.dashboard_url.clone(),
            admins: self
                .admins
                .iter()
                .map(|a| AdminContact {
                    email: a.email.clone(),
                    notifications_enabled: a.notifications_enabled,
                })
                .collect(),
            notify_on_first_tick: self.notify_on_first_tick,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.reconcile_interval_secs, 10);
        assert_eq!(config.ingest_interval_secs, 2);
        assert!(!config.notify_on_first_tick);
        assert!(config.push.enabled);
        assert!(!config.email.usable());
    }

    #[test]
    fn toml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "homesentry.toml",
                r#"
                    presence_file = "/var/lib/homesentry/active_devices.json"
                    excluded_ips = ["192.168.1.1"]

                    [[admins]]
                    email = "admin@example.com"

                    [email]
                    enabled = true
                    user = "sentry@example.com"
                    password = "abcd efgh ijkl"
                "#,
            )?;
            jail.set_env("HOMESENTRY_DASHBOARD_URL", "http://dash.example");
            jail.set_env("HOMESENTRY_EMAIL__PORT", "2525");

            let config = load_config(Some(Path::new("homesentry.toml"))).unwrap();
            assert_eq!(
                config.presence_file,
                PathBuf::from("/var/lib/homesentry/active_devices.json")
            );
            assert_eq!(config.dashboard_url, "http://dash.example");
            assert_eq!(config.email.port, 2525);
            assert_eq!(
                config.email.normalized_password().unwrap().expose_secret(),
                "abcdefghijkl"
            );
            assert!(config.email.usable());
            assert!(config.admins[0].notifications_enabled);
            Ok(())
        });
    }

    #[test]
    fn engine_config_translation() {
        let config = Config {
            excluded_ips: vec!["10.0.0.1".into()],
            admins: vec![AdminEntry {
                email: "a@b.c".into(),
                notifications_enabled: false,
            }],
            ..Config::default()
        };

        let engine = config.engine_config().unwrap();
        assert!(engine.is_excluded("10.0.0.1".parse().unwrap()));
        assert_eq!(engine.admins.len(), 1);
        assert_eq!(engine.notified_admins().count(), 0);
    }

    #[test]
    fn bad_excluded_ip_is_a_validation_error() {
        let config = Config {
            excluded_ips: vec!["not-an-ip".into()],
            ..Config::default()
        };
        assert!(matches!(
            config.engine_config(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/homesentry.toml"))).unwrap();
        assert_eq!(config.alerts_file, PathBuf::from("alerts.json"));
    }
}
