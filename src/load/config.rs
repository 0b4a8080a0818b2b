//! Runtime configuration
//!
//! Read from a TOML file whose sections all have defaults, then overridden
//! from the environment for secrets and deployment-specific values.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::lib::{
    amount::Amount,
    fetch::FetchPolicy,
    mask::MaskStyle,
    raffle::RaffleConfig,
    retry::RetryPolicy,
    window::TimeWindow,
};

pub const DEFAULT_PATH: &str = "jarraffle.toml";
pub const PATH_VAR: &str = "JARRAFFLE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to read secret {field} from {}", path.display())]
    Secret {
        field: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub monobank: MonobankConfig,
    pub fetch: FetchConfig,
    pub raffle: RaffleSection,
    pub telegram: TelegramConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonobankConfig {
    pub token: String,
    pub token_file: String,
    pub jar_id: String,
    pub base_url: String,
    pub page_limit: usize,
    pub timeout_secs: u64,
}

impl Default for MonobankConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            token_file: String::new(),
            jar_id: String::new(),
            base_url: "https://api.monobank.ua".to_string(),
            page_limit: FetchPolicy::DEFAULT_PAGE_LIMIT,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// unix seconds
    pub range_start: i64,
    /// unix seconds, `None` for "now"
    pub range_end: Option<i64>,
    pub initial_span_secs: i64,
    pub min_span_secs: i64,
    pub backoff_secs: u64,
    /// 0 for no limit
    pub max_attempts: usize,
    /// 0 for no limit
    pub max_elapsed_secs: u64,
    pub retry_client_errors: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            range_start: 1_669_845_600,
            range_end: None,
            initial_span_secs: 12 * 3600,
            min_span_secs: 1,
            backoff_secs: RetryPolicy::DEFAULT_BACKOFF.as_secs(),
            max_attempts: 0,
            max_elapsed_secs: 0,
            retry_client_errors: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaffleSection {
    /// price of one slot in minor units
    pub min_amount: i64,
    pub currency: String,
    pub mask_style: String,
    pub mask_ratio: Option<f64>,
    pub utc_offset_minutes: i32,
}

impl Default for RaffleSection {
    fn default() -> Self {
        Self {
            min_amount: 500 * 100,
            currency: "UAH".to_string(),
            mask_style: "keep-domain".to_string(),
            mask_ratio: None,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub token_file: String,
    pub api_url: String,
    pub allowed_users: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            token_file: String::new(),
            api_url: "https://api.telegram.org".to_string(),
            allowed_users: vec!["oleksm".to_string()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Read, override from the process environment, resolve secrets, validate
///
/// Without an explicit path, `$JARRAFFLE_CONFIG` then `jarraffle.toml` are
/// tried, and a missing default file simply yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let env = |key: &str| std::env::var(key).ok();
    let (path, explicit) = match (path, env(PATH_VAR)) {
        (Some(path), _) => (path.to_path_buf(), true),
        (None, Some(var)) => (PathBuf::from(var), true),
        (None, None) => (PathBuf::from(DEFAULT_PATH), false),
    };
    let config = if explicit || path.exists() {
        load_from_path(&path)?
    } else {
        Config::default()
    };
    config.finish(path.parent().unwrap_or_else(|| Path::new(".")), env)
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Comma separated list, quotes and blanks stripped
fn parse_list(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .split(',')
        .map(str::trim)
        .map(|value| value.trim_matches('"').trim_matches('\''))
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn read_secret(field: &'static str, file: &str, base: &Path) -> Result<String, ConfigError> {
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    fs::read_to_string(&path)
        .map(|raw| raw.trim().to_string())
        .map_err(|source| ConfigError::Secret { field, path, source })
}

impl Config {
    /// Override with the values found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("MONOBANK_TOKEN") {
            self.monobank.token = token;
        }
        if let Some(jar_id) = lookup("MONOBANK_JAR_ID") {
            self.monobank.jar_id = jar_id;
        }
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.token = token;
        }
        if let Some(users) = lookup("RAFFLE_ALLOWED_USERS") {
            let users = parse_list(&users);
            if !users.is_empty() {
                self.telegram.allowed_users = users;
            }
        }
        if let Some(level) = lookup("RAFFLE_LOG") {
            self.log.level = level;
        }
        if let Some(start) = lookup("RAFFLE_RANGE_START").and_then(|v| v.trim().parse().ok()) {
            self.fetch.range_start = start;
        }
    }

    /// Secrets, environment overrides and validation, in that order
    ///
    /// A token given in the environment wins over the `*_file` of the same
    /// secret, which is then not read at all.
    pub fn finish<F>(mut self, base: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("MONOBANK_TOKEN").is_some() {
            self.monobank.token_file.clear();
        }
        if lookup("TELEGRAM_TOKEN").is_some() {
            self.telegram.token_file.clear();
        }
        self.resolve_secrets(base)?;
        self.apply_env(lookup);
        self.validate()?;
        Ok(self)
    }

    /// Replace `*_file` secrets by their contents, relative to `base`
    fn resolve_secrets(&mut self, base: &Path) -> Result<(), ConfigError> {
        if !self.monobank.token_file.trim().is_empty() {
            if !self.monobank.token.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "monobank.token and monobank.token_file cannot both be set".to_string(),
                ));
            }
            self.monobank.token = read_secret("monobank.token", self.monobank.token_file.trim(), base)?;
        }
        if !self.telegram.token_file.trim().is_empty() {
            if !self.telegram.token.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "telegram.token and telegram.token_file cannot both be set".to_string(),
                ));
            }
            self.telegram.token = read_secret("telegram.token", self.telegram.token_file.trim(), base)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.monobank.page_limit == 0 {
            return invalid("monobank.page_limit must be at least 1".to_string());
        }
        if self.fetch.min_span_secs < 1 {
            return invalid("fetch.min_span_secs must be at least 1".to_string());
        }
        if self.fetch.initial_span_secs < self.fetch.min_span_secs {
            return invalid(format!(
                "fetch.initial_span_secs ({}) is smaller than fetch.min_span_secs ({})",
                self.fetch.initial_span_secs, self.fetch.min_span_secs
            ));
        }
        if self.raffle.min_amount <= 0 {
            return invalid(format!("raffle.min_amount must be positive, got {}", self.raffle.min_amount));
        }
        if MaskStyle::from_name(&self.raffle.mask_style, None).is_none() {
            return invalid(format!(
                "raffle.mask_style must be 'keep-domain' or 'local-only', got '{}'",
                self.raffle.mask_style
            ));
        }
        if let Some(ratio) = self.raffle.mask_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return invalid(format!("raffle.mask_ratio must be in (0, 1], got {}", ratio));
            }
        }
        if self.raffle.utc_offset_minutes.abs() >= 24 * 60 {
            return invalid(format!(
                "raffle.utc_offset_minutes must be within a day, got {}",
                self.raffle.utc_offset_minutes
            ));
        }
        if let Some(end) = self.fetch.range_end {
            if TimeWindow::from_unix(self.fetch.range_start, end).is_none() {
                return invalid(format!(
                    "fetch.range_end ({}) must be after fetch.range_start ({})",
                    end, self.fetch.range_start
                ));
            }
        }
        Ok(())
    }

    /// Timezone for reading and printing dates
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.raffle.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            initial_span: Duration::seconds(self.fetch.initial_span_secs),
            min_span: Duration::seconds(self.fetch.min_span_secs),
            page_limit: self.monobank.page_limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.max_attempts,
            StdDuration::from_secs(self.fetch.max_elapsed_secs),
            StdDuration::from_secs(self.fetch.backoff_secs),
        )
        .with_client_errors(self.fetch.retry_client_errors)
    }

    pub fn raffle_config(&self) -> RaffleConfig {
        RaffleConfig {
            min_amount: Amount(self.raffle.min_amount),
            mask: MaskStyle::from_name(&self.raffle.mask_style, self.raffle.mask_ratio)
                .unwrap_or_default(),
            offset: self.offset(),
        }
    }

    /// The configured range, ending `now` unless an end is set
    pub fn default_range(&self, now: DateTime<Utc>) -> Result<TimeWindow, ConfigError> {
        let end = self.fetch.range_end.unwrap_or_else(|| now.timestamp());
        TimeWindow::from_unix(self.fetch.range_start, end).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "fetch.range_start ({}) is not before the end of the range ({})",
                self.fetch.range_start, end
            ))
        })
    }

    pub fn is_allowed(&self, username: &str) -> bool {
        self.telegram.allowed_users.iter().any(|user| user == username)
    }
}
