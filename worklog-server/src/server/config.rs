use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use std::{env, fs, path::Path};
use worklog_shared::auth::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub companies: Vec<CompanyConfig>,
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub holidays: Vec<HolidayConfig>,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(deserialize_with = "hhmm")]
    pub work_start_time: NaiveTime,
    #[serde(deserialize_with = "hhmm")]
    pub work_end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub company_id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayConfig {
    pub company_id: String,
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Log,
    Resend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub backend: MailBackend,
    #[serde(default = "default_from")]
    pub from: String,
    pub resend_api_key: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: MailBackend::Log,
            from: default_from(),
            resend_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Zone the daily/weekly/monthly wall-clock times are read in.
    pub timezone: String,
    pub tick_seconds: u64,
    pub auto_logout_interval_minutes: i64,
    #[serde(deserialize_with = "hhmm")]
    pub daily_at: NaiveTime,
    #[serde(deserialize_with = "hhmm")]
    pub weekly_at: NaiveTime,
    #[serde(deserialize_with = "hhmm")]
    pub monthly_at: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: default_timezone(),
            tick_seconds: 60,
            auto_logout_interval_minutes: 15,
            daily_at: NaiveTime::from_hms_opt(23, 30, 0).unwrap_or(NaiveTime::MIN),
            weekly_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            monthly_at: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_from() -> String {
    "Worklog <noreply@worklog.local>".to_string()
}

/// Accepts `HH:MM` or `HH:MM:SS`.
fn hhmm<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let s = String::deserialize(d)?;
    NaiveTime::parse_from_str(&s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .map_err(|e| serde::de::Error::custom(format!("bad time {s:?}: {e}")))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret is empty".into()));
        }
        for c in &self.companies {
            if c.timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "company {}: unknown timezone {}",
                    c.id, c.timezone
                )));
            }
        }
        let known = |id: &str| self.companies.iter().any(|c| c.id == id);
        for u in &self.users {
            if !known(&u.company_id) {
                return Err(ConfigError::Invalid(format!(
                    "user {}: unknown company {}",
                    u.username, u.company_id
                )));
            }
        }
        for h in &self.holidays {
            if !known(&h.company_id) {
                return Err(ConfigError::Invalid(format!(
                    "holiday {}: unknown company {}",
                    h.date, h.company_id
                )));
            }
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "scheduler: unknown timezone {}",
                self.scheduler.timezone
            )));
        }
        if self.scheduler.tick_seconds == 0 || self.scheduler.auto_logout_interval_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "scheduler intervals must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
jwt_secret: s3cret
companies:
  - id: acme
    name: Acme
    timezone: Europe/Warsaw
    work_start_time: "09:00"
    work_end_time: "17:30"
users:
  - id: u1
    company_id: acme
    username: ada
    display_name: Ada
    password_hash: "$2b$04$abc"
    role: admin
holidays:
  - company_id: acme
    date: 2025-12-25
    name: Christmas
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.companies[0].work_end_time, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert!(cfg.companies[0].active);
        assert_eq!(cfg.users[0].role, Role::Admin);
        assert_eq!(cfg.mail.backend, MailBackend::Log);
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.scheduler.daily_at, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        assert_eq!(cfg.holidays.len(), 1);
    }

    #[test]
    fn user_of_unknown_company_is_rejected() {
        let text = MINIMAL.replace("company_id: acme\n    username", "company_id: nope\n    username");
        assert!(matches!(AppConfig::from_yaml(&text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_time_is_a_yaml_error() {
        let text = MINIMAL.replace("\"17:30\"", "\"half past five\"");
        assert!(matches!(AppConfig::from_yaml(&text), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn shipped_example_parses() {
        let cfg = AppConfig::from_yaml(include_str!("../../../config.yaml.example")).unwrap();
        assert_eq!(cfg.users.len(), 2);
        assert_eq!(cfg.scheduler.timezone, "Europe/Warsaw");
        assert_eq!(cfg.listen_port, Some(5151));
    }
}
