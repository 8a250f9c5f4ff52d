//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    AdminArgs, CliArgs, Command, ContactArgs, Credentials, DeleteArgs, GlobalOverrides, ListArgs,
    MarkReadArgs, PageArg, RealtimeArgs, RealtimeCommand, ShowArgs, UploadArgs, WatchArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "happylife";
const ENV_PREFIX: &str = "HAPPYLIFE";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REALTIME_BUFFER: usize = 256;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;
const DEFAULT_CACHE_RETRY: u32 = 1;
const DEFAULT_CACHE_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_DASHBOARD_REFRESH_SECS: u64 = 30;
const DEFAULT_CAROUSEL_INTERVAL_MS: u64 = 16;
const DEFAULT_CAROUSEL_STEP: f64 = 1.0;
const DEFAULT_NOTIFICATION_CAPACITY: usize = 5;
const DEFAULT_NOTIFICATION_TTL_MS: u64 = 5000;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub offline: bool,
    pub backend: BackendSettings,
    pub realtime: RealtimeSettings,
    pub cache: CacheSettings,
    pub carousel: CarouselSettings,
    pub logging: LoggingSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Project base URL; required unless running offline.
    pub url: Option<Url>,
    pub anon_key: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Postgres connection for LISTEN/NOTIFY. Without it changes only arrive
    /// from this process.
    pub database_url: Option<String>,
    pub buffer: NonZeroUsize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            buffer: NonZeroUsize::new(DEFAULT_REALTIME_BUFFER).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: NonZeroUsize,
    pub retry: u32,
    pub retry_delay: Duration,
    pub refetch_on_focus: bool,
    pub dashboard_refresh: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: NonZeroUsize::new(DEFAULT_CACHE_MAX_ENTRIES)
                .unwrap_or(NonZeroUsize::MIN),
            retry: DEFAULT_CACHE_RETRY,
            retry_delay: Duration::from_millis(DEFAULT_CACHE_RETRY_DELAY_MS),
            refetch_on_focus: true,
            dashboard_refresh: Duration::from_secs(DEFAULT_DASHBOARD_REFRESH_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarouselSettings {
    pub interval: Duration,
    pub step: f64,
}

impl Default for CarouselSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_CAROUSEL_INTERVAL_MS),
            step: DEFAULT_CAROUSEL_STEP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub capacity: NonZeroUsize,
    pub ttl: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(DEFAULT_NOTIFICATION_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            ttl: Duration::from_millis(DEFAULT_NOTIFICATION_TTL_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    offline: Option<bool>,
    backend: RawBackendSettings,
    realtime: RawRealtimeSettings,
    cache: RawCacheSettings,
    carousel: RawCarouselSettings,
    logging: RawLoggingSettings,
    notifications: RawNotificationSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if overrides.offline {
            self.offline = Some(true);
        }
        if let Some(url) = overrides.backend_url.as_ref() {
            self.backend.url = Some(url.clone());
        }
        if let Some(key) = overrides.anon_key.as_ref() {
            self.backend.anon_key = Some(key.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.realtime.database_url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            offline,
            backend,
            realtime,
            cache,
            carousel,
            logging,
            notifications,
        } = raw;

        Ok(Self {
            offline: offline.unwrap_or(false),
            backend: build_backend_settings(backend)?,
            realtime: build_realtime_settings(realtime)?,
            cache: build_cache_settings(cache)?,
            carousel: build_carousel_settings(carousel)?,
            logging: build_logging_settings(logging)?,
            notifications: build_notification_settings(notifications)?,
        })
    }

    /// Backend URL and key, or an error naming the missing one.
    pub fn backend_endpoint(&self) -> Result<(Url, String), LoadError> {
        let url = self.backend.url.clone().ok_or_else(|| {
            LoadError::invalid("backend.url", "required unless running with --offline")
        })?;
        let key = self.backend.anon_key.clone().ok_or_else(|| {
            LoadError::invalid("backend.anon_key", "required unless running with --offline")
        })?;
        Ok((url, key))
    }
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let url = match non_blank(backend.url) {
        Some(value) => Some(
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("backend.url", format!("invalid url: {err}")))?,
        ),
        None => None,
    };

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BackendSettings {
        url,
        anon_key: non_blank(backend.anon_key),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_realtime_settings(realtime: RawRealtimeSettings) -> Result<RealtimeSettings, LoadError> {
    let buffer = non_zero_usize(
        realtime.buffer.unwrap_or(DEFAULT_REALTIME_BUFFER),
        "realtime.buffer",
    )?;
    Ok(RealtimeSettings {
        database_url: non_blank(realtime.database_url),
        buffer,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_entries = non_zero_usize(
        cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
        "cache.max_entries",
    )?;

    let dashboard_secs = cache
        .dashboard_refresh_seconds
        .unwrap_or(DEFAULT_DASHBOARD_REFRESH_SECS);
    if dashboard_secs == 0 {
        return Err(LoadError::invalid(
            "cache.dashboard_refresh_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        max_entries,
        retry: cache.retry.unwrap_or(DEFAULT_CACHE_RETRY),
        retry_delay: Duration::from_millis(
            cache.retry_delay_ms.unwrap_or(DEFAULT_CACHE_RETRY_DELAY_MS),
        ),
        refetch_on_focus: cache.refetch_on_focus.unwrap_or(true),
        dashboard_refresh: Duration::from_secs(dashboard_secs),
    })
}

fn build_carousel_settings(carousel: RawCarouselSettings) -> Result<CarouselSettings, LoadError> {
    let interval_ms = carousel
        .interval_ms
        .unwrap_or(DEFAULT_CAROUSEL_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "carousel.interval_ms",
            "must be greater than zero",
        ));
    }

    let step = carousel.step.unwrap_or(DEFAULT_CAROUSEL_STEP);
    if !step.is_finite() || step <= 0.0 {
        return Err(LoadError::invalid(
            "carousel.step",
            "must be a positive number",
        ));
    }

    Ok(CarouselSettings {
        interval: Duration::from_millis(interval_ms),
        step,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_notification_settings(
    notifications: RawNotificationSettings,
) -> Result<NotificationSettings, LoadError> {
    let capacity = non_zero_usize(
        notifications
            .capacity
            .unwrap_or(DEFAULT_NOTIFICATION_CAPACITY),
        "notifications.capacity",
    )?;
    let ttl_ms = notifications.ttl_ms.unwrap_or(DEFAULT_NOTIFICATION_TTL_MS);
    if ttl_ms == 0 {
        return Err(LoadError::invalid(
            "notifications.ttl_ms",
            "must be greater than zero",
        ));
    }

    Ok(NotificationSettings {
        capacity,
        ttl: Duration::from_millis(ttl_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    anon_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRealtimeSettings {
    database_url: Option<String>,
    buffer: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_entries: Option<usize>,
    retry: Option<u32>,
    retry_delay_ms: Option<u64>,
    refetch_on_focus: Option<bool>,
    dashboard_refresh_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCarouselSettings {
    interval_ms: Option<u64>,
    step: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    capacity: Option<usize>,
    ttl_ms: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
