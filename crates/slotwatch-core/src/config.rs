use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ErrorKind;
use crate::timezone::CourierTimeZone;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Inclusive hour-of-day range, written as `[start, end]` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self { start_hour, end_hour }
    }
}

impl From<(u32, u32)> for TimeWindow {
    fn from((start_hour, end_hour): (u32, u32)) -> Self {
        Self { start_hour, end_hour }
    }
}

impl From<TimeWindow> for (u32, u32) {
    fn from(window: TimeWindow) -> Self {
        (window.start_hour, window.end_hour)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IANA time zone of the courier; system local time when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    /// Where the cached credential is persisted
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Courier account and device identity
    pub account: AccountConfig,

    /// Scheduling provider endpoint
    #[serde(default)]
    pub api: ApiConfig,

    /// Notification webhook
    pub webhook: WebhookConfig,

    /// Poll loop settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Windows that trigger a notification
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Auto-booking policy
    #[serde(default)]
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Courier login (email)
    pub username: String,

    /// Courier password
    pub password: String,

    /// Three-letter city code, e.g. WAW
    pub city_code: String,

    /// App installation id; random when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,

    /// Dynamic session id; random when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Outbound request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.glovoapp.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Discord-compatible webhook URL
    pub url: String,

    /// Display name of the posting bot
    #[serde(default = "default_webhook_username")]
    pub username: String,
}

fn default_webhook_username() -> String {
    "Glovo".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: default_webhook_username(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between calendar checks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Error kinds that stop the loop (auth, transport, booking, notify, config, other)
    #[serde(default)]
    pub fatal_errors: Vec<String>,

    /// Write every fetched calendar to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_dump_path: Option<PathBuf>,
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fatal_errors: Vec::new(),
            calendar_dump_path: None,
        }
    }
}

impl PollingConfig {
    /// Parsed fatal error kinds; unknown names are skipped (validation reports them).
    pub fn fatal_kinds(&self) -> Vec<ErrorKind> {
        self.fatal_errors
            .iter()
            .filter_map(|name| ErrorKind::from_name(name))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_windows")]
    pub windows: Vec<TimeWindow>,
}

fn default_notify_windows() -> Vec<TimeWindow> {
    vec![TimeWindow::new(11, 20)]
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            windows: default_notify_windows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub windows: Vec<TimeWindow>,

    /// Slots must start strictly later than now + this many minutes
    #[serde(default = "default_min_lead_time_minutes")]
    pub min_lead_time_minutes: i64,

    /// Days of month (1-31) never auto-booked
    #[serde(default)]
    pub excluded_days: Vec<u32>,
}

/// Ten years of minutes
const MAX_LEAD_TIME_MINUTES: i64 = 525_600 * 10;

fn default_min_lead_time_minutes() -> i64 {
    12 * 60
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            windows: Vec::new(),
            min_lead_time_minutes: default_min_lead_time_minutes(),
            excluded_days: Vec::new(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotwatch")
}

fn default_token_path() -> PathBuf {
    default_config_dir().join("token.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_zone: None,
            token_path: default_token_path(),
            account: AccountConfig::default(),
            api: ApiConfig::default(),
            webhook: WebhookConfig::default(),
            polling: PollingConfig::default(),
            notify: NotifyConfig::default(),
            booking: BookingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (or `SLOTWATCH_CONFIG`),
    /// creating a template if it doesn't exist, then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating a template if missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::warn!("Wrote configuration template to {:?}", config_path);
        }

        let contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;

        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("SLOTWATCH_USERNAME") {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var("SLOTWATCH_PASSWORD") {
            self.account.password = password;
        }
        if let Ok(url) = std::env::var("SLOTWATCH_WEBHOOK_URL") {
            self.webhook.url = url;
        }
    }

    /// Resolved courier time zone.
    pub fn courier_time_zone(&self) -> Result<CourierTimeZone, crate::error::ConfigError> {
        CourierTimeZone::from_config(self.time_zone.as_deref())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.account.username.trim().is_empty() {
            result.add_error("account.username", "Courier username is required");
        }
        if self.account.password.is_empty() {
            result.add_error("account.password", "Courier password is required");
        }
        if self.account.city_code.trim().is_empty() {
            result.add_error("account.city_code", "City code is required");
        } else if self.account.city_code.len() != 3 {
            result.add_warning(
                "account.city_code",
                "City codes are usually three letters (e.g. WAW)",
            );
        }

        self.validate_url(&self.api.base_url, "api.base_url", &mut result);
        self.validate_url(&self.webhook.url, "webhook.url", &mut result);

        if self.api.timeout_secs == 0 {
            result.add_error("api.timeout_secs", "Timeout must be greater than 0");
        }

        if self.polling.interval_secs == 0 {
            result.add_error("polling.interval_secs", "Interval must be greater than 0");
        } else if self.polling.interval_secs < 10 {
            result.add_warning(
                "polling.interval_secs",
                "Polling more often than every 10 seconds may get the account throttled",
            );
        }

        for name in &self.polling.fatal_errors {
            if ErrorKind::from_name(name).is_none() {
                result.add_error(
                    "polling.fatal_errors",
                    format!("Unknown error kind: {}", name),
                );
            }
        }

        if self.notify.windows.is_empty() {
            result.add_warning("notify.windows", "No notify windows - nothing will be announced");
        }
        validate_windows(&self.notify.windows, "notify.windows", &mut result);
        validate_windows(&self.booking.windows, "booking.windows", &mut result);

        if self.booking.enabled && self.booking.windows.is_empty() {
            result.add_warning(
                "booking.windows",
                "Auto-booking enabled without windows - nothing will be booked",
            );
        }
        if self.booking.min_lead_time_minutes < 0 {
            result.add_error(
                "booking.min_lead_time_minutes",
                "Lead time cannot be negative",
            );
        } else if self.booking.min_lead_time_minutes > MAX_LEAD_TIME_MINUTES {
            result.add_error(
                "booking.min_lead_time_minutes",
                format!("Lead time cannot exceed {} minutes (10 years)", MAX_LEAD_TIME_MINUTES),
            );
        }
        for day in &self.booking.excluded_days {
            if !(1..=31).contains(day) {
                result.add_error(
                    "booking.excluded_days",
                    format!("Day of month out of range: {}", day),
                );
            }
        }

        if let Err(e) = self.courier_time_zone() {
            result.add_error("time_zone", e.to_string());
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> PathBuf {
        std::env::var_os("SLOTWATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_dir().join("config.toml"))
    }
}

fn validate_windows(windows: &[TimeWindow], field: &str, result: &mut ValidationResult) {
    for window in windows {
        if window.start_hour > 23 || window.end_hour > 23 {
            result.add_error(
                field,
                format!(
                    "Hours must be within 0-23, got [{}, {}]",
                    window.start_hour, window.end_hour
                ),
            );
        } else if window.start_hour > window.end_hour {
            result.add_error(
                field,
                format!(
                    "Window start {} is after end {}",
                    window.start_hour, window.end_hour
                ),
            );
        }
    }
}
