//! vigil.toml configuration, with environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use vigil_notify::SmtpSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub notify: NotifyConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: "noreply@vigil.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Upper bound on one alert delivery.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            sweep_interval_secs: 86_400,
        }
    }
}

impl VigilConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: VigilConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// File (or defaults), then `.env`, then process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let _ = dotenvy::dotenv();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations that would spin the sweeper or drop every alert.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.notify.timeout_secs > 0,
            "notify.timeout_secs must be at least 1"
        );
        anyhow::ensure!(
            self.retention.sweep_interval_secs > 0,
            "retention.sweep_interval_secs must be at least 1"
        );
        anyhow::ensure!(
            self.retention.max_age_days > 0,
            "retention.max_age_days must be at least 1"
        );
        Ok(())
    }

    /// Apply the SMTP environment settings on top of the file values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SMTP_HOST") {
            self.smtp.host = Some(host);
        }
        if let Some(port) = lookup("SMTP_PORT") {
            self.smtp.port = port
                .parse()
                .with_context(|| format!("SMTP_PORT must be a port number, got {port:?}"))?;
        }
        if let Some(user) = lookup("SMTP_USER") {
            self.smtp.username = Some(user);
        }
        if let Some(password) = lookup("SMTP_PASSWORD") {
            self.smtp.password = Some(password);
        }
        if let Some(from) = lookup("EMAILS_FROM") {
            self.smtp.from = from;
        }
        Ok(())
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp.host.clone(),
            port: self.smtp.port,
            username: self.smtp.username.clone(),
            password: self.smtp.password.clone(),
            from: self.smtp.from.clone(),
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_secs)
    }

    pub fn retention_max_age(&self) -> Duration {
        Duration::from_secs(self.retention.max_age_days * 24 * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: VigilConfig = toml::from_str("").unwrap();
        assert_eq!(config, VigilConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(10));
        assert_eq!(config.retention_max_age(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.sweep_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[server]
port = 9090

[smtp]
host = "mail.example.com"
username = "alerts"

[retention]
max_age_days = 3
"#;
        let config: VigilConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.data_dir, PathBuf::from("./data"));
        assert_eq!(config.smtp.host.as_deref(), Some("mail.example.com"));
        assert_eq!(config.smtp.port, 587);
        assert!(!config.smtp_settings().is_complete());
        assert_eq!(config.retention.max_age_days, 3);
        assert_eq!(config.retention.sweep_interval_secs, 86_400);
    }

    #[test]
    fn env_overrides_file() {
        let mut config: VigilConfig = toml::from_str(
            r#"
[smtp]
host = "file-host"
from = "file@vigil.local"
"#,
        )
        .unwrap();
        config
            .apply_overrides(env(&[
                ("SMTP_HOST", "env-host"),
                ("SMTP_PORT", "2525"),
                ("SMTP_USER", "u"),
                ("SMTP_PASSWORD", "p"),
            ]))
            .unwrap();

        let smtp = config.smtp_settings();
        assert_eq!(smtp.host.as_deref(), Some("env-host"));
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.from, "file@vigil.local");
        assert!(smtp.is_complete());
    }

    #[test]
    fn bad_port_override_is_an_error() {
        let mut config = VigilConfig::default();
        let err = config
            .apply_overrides(env(&[("SMTP_PORT", "smtp")]))
            .unwrap_err();
        assert!(err.to_string().contains("SMTP_PORT"));
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert!(VigilConfig::default().validate().is_ok());
        for (toml_str, field) in [
            ("[notify]\ntimeout_secs = 0", "notify.timeout_secs"),
            ("[retention]\nsweep_interval_secs = 0", "retention.sweep_interval_secs"),
            ("[retention]\nmax_age_days = 0", "retention.max_age_days"),
        ] {
            let config: VigilConfig = toml::from_str(toml_str).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{err}");
        }
    }

    #[test]
    fn load_rejects_zero_sweep_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retention]\nsweep_interval_secs = 0").unwrap();
        assert!(VigilConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[notify]\ntimeout_secs = 3").unwrap();

        let config = VigilConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VigilConfig::from_file(&dir.path().join("nope.toml")).is_err());
    }
}
